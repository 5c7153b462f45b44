//! Dialect capability descriptors.
//!
//! The renderer never matches on a dialect name; it only reads these flags.
//! Every flag missing from a deserialized descriptor takes the least capable
//! value, so an incomplete descriptor can only make rendering fail, never
//! produce text the database rejects.

use serde::{Deserialize, Serialize};

/// How NULL ordering is expressed in ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullOrdering {
    /// `x ASC NULLS LAST`
    Native,
    /// `CASE WHEN x IS NULL THEN 1 ELSE 0 END, x ASC`
    CaseWhen,
}

/// How literal row sources render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuesClauseStyle {
    /// `(VALUES (?), (?)) alias`
    Values,
    /// `(SELECT ? value UNION ALL SELECT ?) alias`
    SelectUnionAll,
    /// Like `SelectUnionAll` with `FROM DUAL` after every row.
    SelectFromDualUnionAll,
}

/// Placement of the RECURSIVE keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecursiveKeyword {
    /// Once after WITH when any CTE is recursive.
    Global,
    /// Before each recursive CTE name.
    PerCte,
    /// Never emitted.
    Omitted,
}

/// How row windows (first result / max results) render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
    /// Wrapping subquery filtered on `ROW_NUMBER()`.
    RowNumber,
}

/// Placeholder style for the whole statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamStyle {
    /// `?`, bound in render order.
    Positional,
    /// `:name`, anonymous values get generated names.
    Named,
}

/// Capability flags of a target dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectCapabilities {
    pub name: String,
    pub supports_recursive_cte: bool,
    pub supports_multiple_ctes: bool,
    pub supports_limit_in_cte: bool,
    /// Top-level `INSERT/UPDATE/DELETE ... RETURNING`.
    pub supports_returning_clause: bool,
    /// A modification statement with RETURNING as a CTE body.
    pub supports_modification_cte: bool,
    pub null_ordering: NullOrdering,
    pub values_clause: ValuesClauseStyle,
    pub recursive_keyword: RecursiveKeyword,
    pub limit_style: LimitStyle,
    pub param_style: ParamStyle,
}

impl Default for DialectCapabilities {
    fn default() -> Self {
        Self {
            name: "generic".to_string(),
            supports_recursive_cte: false,
            supports_multiple_ctes: false,
            supports_limit_in_cte: false,
            supports_returning_clause: false,
            supports_modification_cte: false,
            null_ordering: NullOrdering::CaseWhen,
            values_clause: ValuesClauseStyle::SelectUnionAll,
            recursive_keyword: RecursiveKeyword::Global,
            limit_style: LimitStyle::RowNumber,
            param_style: ParamStyle::Positional,
        }
    }
}

impl DialectCapabilities {
    pub fn postgres() -> Self {
        Self {
            name: "postgres".to_string(),
            supports_recursive_cte: true,
            supports_multiple_ctes: true,
            supports_limit_in_cte: true,
            supports_returning_clause: true,
            supports_modification_cte: true,
            null_ordering: NullOrdering::Native,
            values_clause: ValuesClauseStyle::Values,
            recursive_keyword: RecursiveKeyword::Global,
            limit_style: LimitStyle::LimitOffset,
            param_style: ParamStyle::Named,
        }
    }

    pub fn mysql() -> Self {
        Self {
            name: "mysql".to_string(),
            supports_recursive_cte: true,
            supports_multiple_ctes: true,
            supports_limit_in_cte: true,
            null_ordering: NullOrdering::CaseWhen,
            values_clause: ValuesClauseStyle::SelectUnionAll,
            limit_style: LimitStyle::LimitOffset,
            param_style: ParamStyle::Named,
            ..Self::default()
        }
    }

    pub fn h2() -> Self {
        Self {
            name: "h2".to_string(),
            supports_recursive_cte: true,
            null_ordering: NullOrdering::Native,
            values_clause: ValuesClauseStyle::Values,
            limit_style: LimitStyle::LimitOffset,
            param_style: ParamStyle::Named,
            ..Self::default()
        }
    }

    pub fn oracle() -> Self {
        Self {
            name: "oracle".to_string(),
            supports_recursive_cte: true,
            supports_multiple_ctes: true,
            supports_limit_in_cte: true,
            null_ordering: NullOrdering::Native,
            values_clause: ValuesClauseStyle::SelectFromDualUnionAll,
            recursive_keyword: RecursiveKeyword::Omitted,
            limit_style: LimitStyle::RowNumber,
            param_style: ParamStyle::Named,
            ..Self::default()
        }
    }

    pub fn sql_server() -> Self {
        Self {
            name: "sql_server".to_string(),
            supports_recursive_cte: true,
            supports_multiple_ctes: true,
            supports_limit_in_cte: true,
            null_ordering: NullOrdering::CaseWhen,
            values_clause: ValuesClauseStyle::Values,
            recursive_keyword: RecursiveKeyword::Omitted,
            limit_style: LimitStyle::OffsetFetch,
            param_style: ParamStyle::Named,
            ..Self::default()
        }
    }

    pub fn sqlite() -> Self {
        Self {
            name: "sqlite".to_string(),
            supports_recursive_cte: true,
            supports_multiple_ctes: true,
            supports_limit_in_cte: true,
            supports_returning_clause: true,
            null_ordering: NullOrdering::Native,
            values_clause: ValuesClauseStyle::Values,
            limit_style: LimitStyle::LimitOffset,
            param_style: ParamStyle::Named,
            ..Self::default()
        }
    }

    pub fn db2() -> Self {
        Self {
            name: "db2".to_string(),
            supports_recursive_cte: true,
            supports_multiple_ctes: true,
            supports_limit_in_cte: true,
            null_ordering: NullOrdering::Native,
            values_clause: ValuesClauseStyle::Values,
            recursive_keyword: RecursiveKeyword::Omitted,
            limit_style: LimitStyle::OffsetFetch,
            param_style: ParamStyle::Named,
            ..Self::default()
        }
    }

    /// Look up a preset by name (case-insensitive).
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::postgres()),
            "mysql" => Some(Self::mysql()),
            "h2" => Some(Self::h2()),
            "oracle" => Some(Self::oracle()),
            "sql_server" | "sqlserver" | "mssql" => Some(Self::sql_server()),
            "sqlite" => Some(Self::sqlite()),
            "db2" => Some(Self::db2()),
            "generic" => Some(Self::default()),
            _ => None,
        }
    }

    /// Builder-style override of the placeholder style.
    pub fn with_param_style(mut self, style: ParamStyle) -> Self {
        self.param_style = style;
        self
    }
}
