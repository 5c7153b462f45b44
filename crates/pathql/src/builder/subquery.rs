use crate::model::{OuterAlias, QueryModel};

use super::traits::{QueryBuilder, SelectBuilder};
use super::EngineContext;

/// Builder for a subquery nested in IN or EXISTS.
///
/// Paths starting with an alias of an enclosing query resolve as outer
/// references and render verbatim, which makes the subquery correlated.
#[derive(Debug, Clone)]
pub struct SubqueryBuilder {
    ctx: EngineContext,
    model: QueryModel,
}

impl SubqueryBuilder {
    pub(crate) fn new(ctx: EngineContext, outer: Vec<OuterAlias>) -> Self {
        let mut model = QueryModel::select_model();
        model.outer = outer;
        Self { ctx, model }
    }
}

impl QueryBuilder for SubqueryBuilder {
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

impl SelectBuilder for SubqueryBuilder {}
