//! Fluent criteria builders.
//!
//! Every builder owns a [`QueryModel`] and a shared [`EngineContext`]. Builder
//! methods consume `self` and return it again, so a query reads as one chain:
//!
//! ```rust,ignore
//! let cb = factory
//!     .create("TestCTE", "t")?
//!     .with_recursive("TestCTE")?
//!         .from("RecursiveEntity", "e")?
//!         .bind("id", "e.id")?
//!         .bind("name", "e.name")?
//!         .bind("level", "0")?
//!         .where_null("e.parent")?
//!     .union_all()?
//!         .from("TestCTE", "t")?
//!         .from("RecursiveEntity", "e")?
//!         .bind("id", "e.id")?
//!         .bind("name", "e.name")?
//!         .bind("level", "t.level + 1")?
//!         .where_expr("t.id", CmpOp::Eq, "e.parent.id")?
//!     .end()?
//!     .where_value("t.level", CmpOp::Lt, 2)?;
//! ```
//!
//! Errors surface at the call that caused them: unknown types and attributes
//! when a path is resolved, missing CTE columns at `end()`, dialect
//! limitations when the statement is rendered.

mod cte;
mod delete;
mod insert;
mod paginated;
mod select;
mod subquery;
mod traits;
mod update;

#[cfg(test)]
mod tests;

pub use cte::{CteBuilder, RecursiveCteBuilder, ReturningCteBuilder, ReturningStatementBuilder};
pub use delete::DeleteCriteriaBuilder;
pub use insert::InsertCriteriaBuilder;
pub use paginated::PaginatedCriteriaBuilder;
pub use select::CriteriaBuilder;
pub use subquery::SubqueryBuilder;
pub use traits::{BindBuilder, QueryBuilder, SelectBuilder, StatementBuilder, WithCtes};
pub use update::UpdateCriteriaBuilder;

use std::fmt;
use std::sync::Arc;

use crate::bind::bind;
use crate::client::{ExecutionRequest, ResultShape};
use crate::config::EngineConfig;
use crate::dialect::DialectCapabilities;
use crate::error::QueryResult;
use crate::function::{FunctionRegistry, FunctionRenderer};
use crate::metamodel::EntityMetadataProvider;
use crate::model::{QueryModel, StatementKind};
use crate::render::{RenderedQuery, render, render_returning};

/// Shared, immutable state every builder carries.
///
/// Cloning is cheap; all parts are reference counted.
#[derive(Clone)]
pub struct EngineContext {
    metamodel: Arc<dyn EntityMetadataProvider>,
    dialect: Arc<DialectCapabilities>,
    functions: Arc<FunctionRegistry>,
    nulls_first: bool,
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("dialect", &self.dialect.name)
            .field("functions", &self.functions)
            .field("nulls_first", &self.nulls_first)
            .finish()
    }
}

impl EngineContext {
    pub fn metamodel(&self) -> &dyn EntityMetadataProvider {
        &*self.metamodel
    }

    pub fn dialect(&self) -> &DialectCapabilities {
        &self.dialect
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// NULL precedence used by `order_by_asc` / `order_by_desc`.
    pub fn nulls_first(&self) -> bool {
        self.nulls_first
    }

    pub(crate) fn render(&self, model: &QueryModel) -> QueryResult<RenderedQuery> {
        render(model, &self.dialect, &self.functions)
    }

    /// Render and bind `model` into a request.
    pub(crate) fn prepare(&self, model: &QueryModel, shape: ResultShape) -> QueryResult<ExecutionRequest> {
        let rendered = self.render(model)?;
        let params = bind(&rendered, &model.all_parameters())?;
        Ok(ExecutionRequest::new(rendered, params, shape))
    }

    pub(crate) fn prepare_returning(
        &self,
        model: &QueryModel,
        columns: &[String],
    ) -> QueryResult<ExecutionRequest> {
        let rendered = render_returning(model, columns, &self.dialect, &self.functions)?;
        let params = bind(&rendered, &model.all_parameters())?;
        Ok(ExecutionRequest::new(rendered, params, ResultShape::Returning))
    }
}

/// Entry point: creates builders bound to one metamodel and dialect.
#[derive(Debug, Clone)]
pub struct CriteriaBuilderFactory {
    ctx: EngineContext,
}

impl CriteriaBuilderFactory {
    /// Factory with the dialect's built-in functions.
    pub fn new(metamodel: impl EntityMetadataProvider + 'static, dialect: DialectCapabilities) -> Self {
        let functions = FunctionRegistry::for_dialect(&dialect);
        Self::with_functions(metamodel, dialect, functions)
    }

    pub fn with_functions(
        metamodel: impl EntityMetadataProvider + 'static,
        dialect: DialectCapabilities,
        functions: FunctionRegistry,
    ) -> Self {
        Self {
            ctx: EngineContext {
                metamodel: Arc::new(metamodel),
                dialect: Arc::new(dialect),
                functions: Arc::new(functions),
                nulls_first: false,
            },
        }
    }

    /// Factory for the dialect and ordering defaults of an [`EngineConfig`].
    pub fn from_config(
        metamodel: impl EntityMetadataProvider + 'static,
        config: &EngineConfig,
    ) -> QueryResult<Self> {
        let mut factory = Self::new(metamodel, config.capabilities()?);
        factory.ctx.nulls_first = config.ordering.nulls_first;
        Ok(factory)
    }

    /// Register a function renderer. Affects builders created afterwards.
    pub fn register_function(
        &mut self,
        name: &str,
        renderer: impl FunctionRenderer + 'static,
    ) -> &mut Self {
        Arc::make_mut(&mut self.ctx.functions).register(name, renderer);
        self
    }

    /// Register a function whose call is replaced by the text `expand` returns.
    pub fn register_macro<F>(&mut self, name: &str, expand: F) -> &mut Self
    where
        F: Fn(&[String]) -> QueryResult<String> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.ctx.functions).register_macro(name, expand);
        self
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn dialect(&self) -> &DialectCapabilities {
        self.ctx.dialect()
    }

    /// SELECT with one root.
    pub fn create(&self, entity: &str, alias: &str) -> QueryResult<CriteriaBuilder> {
        CriteriaBuilder::new(self.ctx.clone()).from(entity, alias)
    }

    /// SELECT with one root aliased by the lower-cased type name.
    pub fn create_default(&self, entity: &str) -> QueryResult<CriteriaBuilder> {
        CriteriaBuilder::new(self.ctx.clone()).from_default(entity)
    }

    /// SELECT without roots; add them with `from` / `from_values`.
    pub fn select(&self) -> CriteriaBuilder {
        CriteriaBuilder::new(self.ctx.clone())
    }

    /// `INSERT INTO target(...) SELECT ...`
    pub fn insert(&self, target: &str) -> QueryResult<InsertCriteriaBuilder> {
        InsertCriteriaBuilder::new(self.ctx.clone(), target)
    }

    pub fn update(&self, target: &str, alias: &str) -> QueryResult<UpdateCriteriaBuilder> {
        UpdateCriteriaBuilder::new(self.ctx.clone(), target, alias)
    }

    pub fn delete(&self, target: &str, alias: &str) -> QueryResult<DeleteCriteriaBuilder> {
        DeleteCriteriaBuilder::new(self.ctx.clone(), target, alias)
    }
}

/// Model for a modification statement whose target is node 0.
pub(crate) fn target_model(
    ctx: &EngineContext,
    kind: StatementKind,
    target: &str,
    alias: &str,
) -> QueryResult<QueryModel> {
    let mut model = QueryModel::new(kind);
    model.add_root(ctx.metamodel(), target, Some(alias))?;
    Ok(model)
}
