//! Engine configuration loaded from TOML.
//!
//! ```toml
//! [dialect]
//! preset = "mysql"
//!
//! [dialect.overrides]
//! supports_returning_clause = false
//! param_style = "positional"
//!
//! [sql_log]
//! level = "info"
//! max_sql_length = 500
//! slow_query_ms = 250
//!
//! [ordering]
//! nulls_first = false
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::Level;

use crate::dialect::{
    DialectCapabilities, LimitStyle, NullOrdering, ParamStyle, RecursiveKeyword, ValuesClauseStyle,
};
use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub dialect: DialectConfig,
    #[serde(default)]
    pub sql_log: SqlLogConfig,
    #[serde(default)]
    pub ordering: OrderingConfig,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            QueryError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            QueryError::Config(msg) => {
                QueryError::Config(format!("failed to parse config file {}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> QueryResult<Self> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> QueryResult<()> {
        self.dialect.capabilities()?;
        self.sql_log.level()?;
        Ok(())
    }

    /// Capabilities of the configured dialect.
    pub fn capabilities(&self) -> QueryResult<DialectCapabilities> {
        self.dialect.capabilities()
    }
}

/// `[dialect]`: a preset and optional per-flag overrides.
///
/// Without a preset the conservative defaults of [`DialectCapabilities`] are
/// the base.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DialectConfig {
    pub preset: Option<String>,
    #[serde(default)]
    pub overrides: DialectOverrides,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DialectOverrides {
    pub name: Option<String>,
    pub supports_recursive_cte: Option<bool>,
    pub supports_multiple_ctes: Option<bool>,
    pub supports_limit_in_cte: Option<bool>,
    pub supports_returning_clause: Option<bool>,
    pub supports_modification_cte: Option<bool>,
    pub null_ordering: Option<NullOrdering>,
    pub values_clause: Option<ValuesClauseStyle>,
    pub recursive_keyword: Option<RecursiveKeyword>,
    pub limit_style: Option<LimitStyle>,
    pub param_style: Option<ParamStyle>,
}

impl DialectConfig {
    pub fn capabilities(&self) -> QueryResult<DialectCapabilities> {
        let mut caps = match &self.preset {
            Some(name) => DialectCapabilities::preset(name)
                .ok_or_else(|| QueryError::Config(format!("unknown dialect preset '{name}'")))?,
            None => DialectCapabilities::default(),
        };
        let o = &self.overrides;
        if let Some(name) = &o.name {
            caps.name = name.clone();
        }
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(v) = o.$field {
                        caps.$field = v;
                    }
                )*
            };
        }
        apply!(
            supports_recursive_cte,
            supports_multiple_ctes,
            supports_limit_in_cte,
            supports_returning_clause,
            supports_modification_cte,
            null_ordering,
            values_clause,
            recursive_keyword,
            limit_style,
            param_style,
        );
        Ok(caps)
    }
}

/// `[sql_log]`: how executed statements are logged.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlLogConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_max_sql_length")]
    pub max_sql_length: Option<usize>,
    #[serde(default)]
    pub slow_query_ms: Option<u64>,
}

fn default_level() -> String {
    "debug".to_string()
}

fn default_max_sql_length() -> Option<usize> {
    Some(200)
}

impl Default for SqlLogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            max_sql_length: default_max_sql_length(),
            slow_query_ms: None,
        }
    }
}

impl SqlLogConfig {
    pub fn level(&self) -> QueryResult<Level> {
        self.level
            .parse::<Level>()
            .map_err(|_| QueryError::Config(format!("invalid log level '{}'", self.level)))
    }
}

/// `[ordering]`: defaults applied by `order_by_asc`/`order_by_desc`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OrderingConfig {
    #[serde(default)]
    pub nulls_first: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_with_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            [dialect]
            preset = "postgres"

            [dialect.overrides]
            supports_returning_clause = false
            param_style = "positional"

            [sql_log]
            level = "info"
            "#,
        )
        .unwrap();
        let caps = config.capabilities().unwrap();
        assert_eq!(caps.name, "postgres");
        assert!(!caps.supports_returning_clause);
        assert!(caps.supports_modification_cte);
        assert_eq!(caps.param_style, ParamStyle::Positional);
        assert_eq!(config.sql_log.level().unwrap(), Level::INFO);
        assert_eq!(config.sql_log.max_sql_length, Some(200));
    }

    #[test]
    fn empty_config_is_conservative() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.capabilities().unwrap(), DialectCapabilities::default());
        assert!(!config.ordering.nulls_first);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for raw in [
            "[dialect]\npreset = \"foxpro\"",
            "[sql_log]\nlevel = \"loud\"",
            "[dialect.overrides]\nlimit_style = \"top\"",
        ] {
            assert!(matches!(
                EngineConfig::from_toml_str(raw),
                Err(QueryError::Config(_))
            ));
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let err = EngineConfig::load("/nonexistent/pathql.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pathql.toml"));
    }
}
