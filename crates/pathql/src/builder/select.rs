use crate::error::QueryResult;
use crate::model::QueryModel;
use crate::pagination::{self, PaginationSpec};

use super::paginated::PaginatedCriteriaBuilder;
use super::traits::{QueryBuilder, SelectBuilder, StatementBuilder, WithCtes};
use super::EngineContext;

/// SELECT criteria builder.
#[derive(Debug, Clone)]
pub struct CriteriaBuilder {
    ctx: EngineContext,
    model: QueryModel,
}

impl CriteriaBuilder {
    pub(crate) fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            model: QueryModel::select_model(),
        }
    }

    /// Fetch page `page_index` (zero based) of `page_size` root entities.
    ///
    /// The builder's own first/max results are replaced by the page window.
    pub fn page(self, page_index: u64, page_size: u64) -> QueryResult<PaginatedCriteriaBuilder> {
        self.page_by(PaginationSpec::new(page_index, page_size)?)
    }

    /// Like [`page`](Self::page), with a [`PaginationSpec`] that may name the root
    /// attribute identifying an entity.
    pub fn page_by(self, spec: PaginationSpec) -> QueryResult<PaginatedCriteriaBuilder> {
        let plan = pagination::plan(self.ctx.metamodel(), &self.model, spec)?;
        Ok(PaginatedCriteriaBuilder::new(self.ctx, plan))
    }
}

impl QueryBuilder for CriteriaBuilder {
    fn context(&self) -> &EngineContext {
        &self.ctx
    }

    fn model(&self) -> &QueryModel {
        &self.model
    }

    fn model_mut(&mut self) -> &mut QueryModel {
        &mut self.model
    }

    fn into_model(self) -> QueryModel {
        self.model
    }
}

impl SelectBuilder for CriteriaBuilder {}

impl WithCtes for CriteriaBuilder {}

impl StatementBuilder for CriteriaBuilder {}
