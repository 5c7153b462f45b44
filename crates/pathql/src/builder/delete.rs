use crate::error::QueryResult;
use crate::model::{QueryModel, StatementKind};

use super::insert::require_entity;
use super::traits::{QueryBuilder, StatementBuilder, WithCtes};
use super::{EngineContext, target_model};

/// `DELETE FROM target alias WHERE ...` builder.
#[derive(Debug, Clone)]
pub struct DeleteCriteriaBuilder {
    ctx: EngineContext,
    model: QueryModel,
}

impl DeleteCriteriaBuilder {
    pub(crate) fn new(ctx: EngineContext, target: &str, alias: &str) -> QueryResult<Self> {
        require_entity(&ctx, target)?;
        let model = target_model(
            &ctx,
            StatementKind::Delete {
                target: target.to_string(),
            },
            target,
            alias,
        )?;
        Ok(Self { ctx, model })
    }
}

impl QueryBuilder for DeleteCriteriaBuilder {
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

impl WithCtes for DeleteCriteriaBuilder {}

impl StatementBuilder for DeleteCriteriaBuilder {}
