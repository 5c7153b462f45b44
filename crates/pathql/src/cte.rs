//! CTE planning.
//!
//! Builders collect bindings (`bind("name").select(...)`) into a draft. When
//! the builder ends, [`finalize`] checks that the bindings cover the CTE type,
//! fixes the column order and turns the bindings into select items.
//!
//! Inside a CTE an entity-valued binding (an alias, or a to-one relation) is
//! replaced by the path of its identifier: `e` becomes `e.id`, `e.parent`
//! becomes `e.parent.id`. INSERT and UPDATE bindings keep the association.

use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, PathExpr};
use crate::metamodel::{Cardinality, EntityMetadataProvider, TypeKind};
use crate::model::{BoundAttribute, QueryModel, SelectItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CteKind {
    Plain,
    /// Anchor `UNION ALL` recursive term.
    Recursive,
    /// Backed by an INSERT/UPDATE/DELETE with a RETURNING list.
    Returning,
}

/// A finalized common table expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CteDefinition {
    pub name: String,
    /// Column list in first-bind order, embeddable paths dotted.
    pub columns: Vec<String>,
    pub kind: CteKind,
    /// Anchor query, or the DML statement of a returning CTE.
    pub anchor: QueryModel,
    pub recursive_term: Option<QueryModel>,
}

impl CteDefinition {
    pub fn is_recursive(&self) -> bool {
        self.kind == CteKind::Recursive
    }

    pub fn is_returning(&self) -> bool {
        self.kind == CteKind::Returning
    }

    /// Whether any body of this CTE limits its rows.
    pub fn has_window(&self) -> bool {
        !self.anchor.window.is_unbounded()
            || self
                .recursive_term
                .as_ref()
                .is_some_and(|t| !t.window.is_unbounded())
    }
}

/// Bindings collected by a CTE builder, not yet validated.
#[derive(Debug, Clone)]
pub struct CteDraft {
    pub name: String,
    pub anchor: QueryModel,
    pub recursive_term: Option<QueryModel>,
}

/// Whether `attribute` is covered by one of the bound `columns`.
///
/// Binding a whole embeddable covers each of its nested attributes.
pub(crate) fn is_covered(attribute: &str, columns: &[String]) -> bool {
    columns.iter().any(|c| {
        c == attribute
            || attribute
                .strip_prefix(c.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    })
}

fn check_cte_type(meta: &dyn EntityMetadataProvider, name: &str) -> QueryResult<()> {
    let ty = meta.require_type(name)?;
    if ty.kind != TypeKind::Cte {
        return Err(QueryError::validation(format!(
            "'{name}' is not a CTE type"
        )));
    }
    Ok(())
}

/// Check bound attributes against the CTE type.
///
/// Every bound attribute must exist and every required attribute must be
/// bound. The error names every missing attribute, not just the first.
fn check_bindings(
    meta: &dyn EntityMetadataProvider,
    name: &str,
    bindings: &[BoundAttribute],
) -> QueryResult<Vec<String>> {
    let columns: Vec<String> = bindings.iter().map(|b| b.attribute.clone()).collect();
    for column in &columns {
        meta.attribute(name, column)?;
    }

    let missing: Vec<String> = meta
        .required_attributes(name)?
        .into_iter()
        .filter(|attr| !is_covered(attr, &columns))
        .collect();
    if !missing.is_empty() {
        return Err(QueryError::CteColumnMismatch {
            cte: name.to_string(),
            attributes: missing,
        });
    }
    Ok(columns)
}

/// Replace each binding of a whole embeddable by one binding per nested
/// attribute, in declaration order: `address -> e.address` becomes
/// `address.street -> e.address.street`, `address.city -> e.address.city`.
fn expand_embeddables(
    meta: &dyn EntityMetadataProvider,
    name: &str,
    bindings: Vec<BoundAttribute>,
) -> QueryResult<Vec<BoundAttribute>> {
    let mut out = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let info = meta.attribute(name, &binding.attribute)?;
        let target = match (info.cardinality, info.target) {
            (Cardinality::Embedded, Some(target)) => target,
            _ => {
                out.push(binding);
                continue;
            }
        };
        let Expr::Path(path) = binding.expr else {
            return Err(QueryError::validation(format!(
                "embeddable '{}' of '{name}' must be bound to a path",
                binding.attribute
            )));
        };
        let mut leaves = Vec::new();
        embedded_leaves(meta, &target, &mut Vec::new(), &mut leaves)?;
        for leaf in leaves {
            let mut expr = path.clone();
            expr.segments.extend(leaf.iter().cloned());
            out.push(BoundAttribute {
                attribute: format!("{}.{}", binding.attribute, leaf.join(".")),
                expr: Expr::Path(expr),
            });
        }
    }
    Ok(out)
}

fn embedded_leaves(
    meta: &dyn EntityMetadataProvider,
    type_name: &str,
    prefix: &mut Vec<String>,
    out: &mut Vec<Vec<String>>,
) -> QueryResult<()> {
    let ty = meta.require_type(type_name)?;
    for attr in &ty.attributes {
        prefix.push(attr.name.clone());
        match (attr.cardinality, &attr.target) {
            (Cardinality::ToMany, _) => {}
            (Cardinality::Embedded, Some(target)) => embedded_leaves(meta, target, prefix, out)?,
            _ => out.push(prefix.clone()),
        }
        prefix.pop();
    }
    Ok(())
}

/// Attributes bound by one side only, anchor order first.
fn symmetric_difference(anchor: &[String], term: &[BoundAttribute]) -> Vec<String> {
    let mut diff: Vec<String> = anchor
        .iter()
        .filter(|a| !term.iter().any(|b| &b.attribute == *a))
        .cloned()
        .collect();
    diff.extend(
        term.iter()
            .filter(|b| !anchor.contains(&b.attribute))
            .map(|b| b.attribute.clone()),
    );
    diff
}

/// Replace entity-valued paths by their identifier path.
fn substitute_identifier(
    meta: &dyn EntityMetadataProvider,
    model: &QueryModel,
    expr: Expr,
) -> QueryResult<Expr> {
    match expr {
        Expr::Path(path) => Ok(match model.identifier_path(meta, &path)? {
            Some(id_path) => Expr::Path(id_path),
            None => Expr::Path(path),
        }),
        other => Ok(other),
    }
}

/// Move bindings into select items following `columns`.
fn bindings_to_select(
    meta: &dyn EntityMetadataProvider,
    model: &mut QueryModel,
    columns: &[String],
) -> QueryResult<()> {
    let mut bindings = std::mem::take(&mut model.bindings);
    let mut items = Vec::with_capacity(columns.len());
    for column in columns {
        let pos = bindings
            .iter()
            .position(|b| &b.attribute == column)
            .ok_or_else(|| QueryError::validation(format!("column '{column}' is not bound")))?;
        let binding = bindings.remove(pos);
        items.push(SelectItem {
            expr: substitute_identifier(meta, model, binding.expr)?,
            alias: None,
        });
    }
    model.select = items;
    Ok(())
}

/// Validate a CTE draft and produce its definition.
pub fn finalize(meta: &dyn EntityMetadataProvider, draft: CteDraft) -> QueryResult<CteDefinition> {
    let CteDraft {
        name,
        mut anchor,
        recursive_term,
    } = draft;
    check_cte_type(meta, &name)?;

    anchor.bindings = expand_embeddables(meta, &name, std::mem::take(&mut anchor.bindings))?;
    let columns = check_bindings(meta, &name, &anchor.bindings)?;

    let recursive_term = match recursive_term {
        Some(mut term) => {
            term.bindings = expand_embeddables(meta, &name, std::mem::take(&mut term.bindings))?;
            let diff = symmetric_difference(&columns, &term.bindings);
            if !diff.is_empty() {
                return Err(QueryError::CteColumnMismatch {
                    cte: name,
                    attributes: diff,
                });
            }
            bindings_to_select(meta, &mut term, &columns)?;
            Some(term)
        }
        None => None,
    };
    bindings_to_select(meta, &mut anchor, &columns)?;

    let kind = if recursive_term.is_some() {
        CteKind::Recursive
    } else {
        CteKind::Plain
    };
    debug!(target: "pathql.cte", cte = %name, columns = ?columns, ?kind, "finalized CTE");

    Ok(CteDefinition {
        name,
        columns,
        kind,
        anchor,
        recursive_term,
    })
}

/// Validate a returning CTE backed by a modification statement.
pub fn finalize_returning(
    meta: &dyn EntityMetadataProvider,
    name: &str,
    mut statement: QueryModel,
) -> QueryResult<CteDefinition> {
    check_cte_type(meta, name)?;
    if !statement.kind.is_modification() {
        return Err(QueryError::unsupported(
            "a returning CTE must wrap an INSERT, UPDATE or DELETE",
        ));
    }
    let columns = check_bindings(meta, name, &statement.returning)?;

    let returning = std::mem::take(&mut statement.returning);
    statement.returning = returning
        .into_iter()
        .map(|b| {
            Ok(BoundAttribute {
                expr: substitute_identifier(meta, &statement, b.expr)?,
                attribute: b.attribute,
            })
        })
        .collect::<QueryResult<Vec<_>>>()?;

    debug!(target: "pathql.cte", cte = %name, columns = ?columns, "finalized returning CTE");
    Ok(CteDefinition {
        name: name.to_string(),
        columns,
        kind: CteKind::Returning,
        anchor: statement,
        recursive_term: None,
    })
}

/// Name of the CTE that emulates a top-level RETURNING clause.
pub const RETURNING_CTE: &str = "returning_result";

/// Target attributes of a top-level RETURNING list. They render unqualified.
pub(crate) fn returning_columns(columns: &[String]) -> QueryResult<Vec<BoundAttribute>> {
    if columns.is_empty() {
        return Err(QueryError::validation("RETURNING needs at least one column"));
    }
    Ok(columns
        .iter()
        .map(|c| BoundAttribute {
            attribute: c.clone(),
            expr: Expr::Path(PathExpr::unresolved(c)),
        })
        .collect())
}

/// Wrap a modification statement into the CTE used to emulate RETURNING.
///
/// The statement's own CTEs are hoisted; they are declared before the
/// returning CTE in the enclosing WITH block.
pub fn returning_emulation(
    mut statement: QueryModel,
    columns: &[String],
) -> QueryResult<(Vec<std::sync::Arc<CteDefinition>>, CteDefinition)> {
    if !statement.kind.is_modification() {
        return Err(QueryError::unsupported(
            "RETURNING requires an INSERT, UPDATE or DELETE statement",
        ));
    }
    let hoisted = std::mem::take(&mut statement.ctes);
    statement.returning = returning_columns(columns)?;
    Ok((
        hoisted,
        CteDefinition {
            name: RETURNING_CTE.to_string(),
            columns: columns.to_vec(),
            kind: CteKind::Returning,
            anchor: statement,
            recursive_term: None,
        },
    ))
}
