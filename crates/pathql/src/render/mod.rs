//! Dialect renderer.
//!
//! Rendering is a pure function of a [`QueryModel`], a
//! [`DialectCapabilities`] descriptor and a [`FunctionRegistry`]. Two renders
//! of the same model produce identical text and parameter slots.
//!
//! # Layout
//!
//! ```text
//! WITH [RECURSIVE ]Name(c1, c2) AS(
//! <anchor>
//! UNION ALL
//! <recursive term>
//! ), Next(c1) AS(
//! <body>
//! )
//! SELECT ... FROM ... WHERE ... GROUP BY ... HAVING ... ORDER BY ... <window>
//! ```
//!
//! Modification statements render as `INSERT INTO Target(c1, c2)\nSELECT ...`,
//! `UPDATE Target t SET t.a = ...` and `DELETE FROM Target t WHERE ...`.

mod clause;


use std::sync::Arc;

use tracing::trace;

use crate::cte::{self, CteDefinition, RETURNING_CTE};
use crate::dialect::{DialectCapabilities, ParamStyle};
use crate::error::{QueryError, QueryResult};
use crate::function::FunctionRegistry;
use crate::model::{QueryModel, StatementKind, Window};
use crate::value::Value;

use clause::Renderer;

/// A placeholder in rendered text, in render order.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSlot {
    /// A `:name` parameter resolved from the model's parameter map at bind time.
    Named(String),
    /// A value captured while building. `name` is the generated placeholder
    /// name used under the named style.
    Anonymous { name: String, value: Value },
}

/// Output of a render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub text: String,
    pub slots: Vec<ParamSlot>,
    pub param_style: ParamStyle,
    pub kind: StatementKind,
    /// Window of the outermost statement, already reflected in `text`.
    pub window: Window,
    /// CTEs declared in the leading WITH block, in declaration order.
    pub ctes: Vec<String>,
}

impl RenderedQuery {
    /// Distinct named parameters referenced by the text, in first-use order.
    pub fn named_parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for slot in &self.slots {
            if let ParamSlot::Named(name) = slot
                && !names.contains(&name.as_str())
            {
                names.push(name);
            }
        }
        names
    }
}

/// Render a model.
pub fn render(
    model: &QueryModel,
    caps: &DialectCapabilities,
    functions: &FunctionRegistry,
) -> QueryResult<RenderedQuery> {
    let mut renderer = Renderer::new(caps, functions, model);
    let text = renderer.statement(model, &[], false)?;
    let ctes = cte_names(model.ctes());
    Ok(finish(renderer, text, model.kind.clone(), model.window, ctes, caps))
}

/// Render a modification statement that returns `columns` of the affected rows.
///
/// Dialects with a native RETURNING clause get `... RETURNING cols`. Dialects
/// that only allow modification statements inside WITH get
/// `WITH returning_result(cols) AS(\n<dml> RETURNING cols\n)\nSELECT cols FROM returning_result`.
pub fn render_returning(
    model: &QueryModel,
    columns: &[String],
    caps: &DialectCapabilities,
    functions: &FunctionRegistry,
) -> QueryResult<RenderedQuery> {
    if !model.kind.is_modification() {
        return Err(QueryError::unsupported(format!(
            "RETURNING is not available on a {} statement",
            model.kind.name()
        )));
    }
    if caps.supports_returning_clause {
        let mut statement = model.clone();
        statement.returning = cte::returning_columns(columns)?;
        return render(&statement, caps, functions);
    }
    if !caps.supports_modification_cte {
        return Err(QueryError::unsupported_feature(&caps.name, "RETURNING clause"));
    }

    let (mut ctes, returning) = cte::returning_emulation(model.clone(), columns)?;
    ctes.push(Arc::new(returning));
    let mut renderer = Renderer::new(caps, functions, model);
    let (mut text, _) = renderer.cte_block(&ctes, &[])?;
    text.push_str(&format!(
        "SELECT {} FROM {RETURNING_CTE}",
        columns.join(", ")
    ));
    let names = cte_names(&ctes);
    Ok(finish(renderer, text, model.kind.clone(), Window::default(), names, caps))
}

fn cte_names(ctes: &[Arc<CteDefinition>]) -> Vec<String> {
    ctes.iter().map(|c| c.name.clone()).collect()
}

fn finish(
    renderer: Renderer<'_>,
    text: String,
    kind: StatementKind,
    window: Window,
    ctes: Vec<String>,
    caps: &DialectCapabilities,
) -> RenderedQuery {
    let slots = renderer.into_slots();
    trace!(
        target: "pathql.render",
        dialect = %caps.name,
        statement = kind.name(),
        slots = slots.len(),
        "rendered query"
    );
    RenderedQuery {
        text,
        slots,
        param_style: caps.param_style,
        kind,
        window,
        ctes,
    }
}
