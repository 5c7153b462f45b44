use crate::error::QueryResult;
use crate::model::{QueryModel, StatementKind};
use crate::value::Value;

use super::insert::require_entity;
use super::traits::{BindBuilder, QueryBuilder, StatementBuilder, WithCtes};
use super::{EngineContext, target_model};

/// `UPDATE target alias SET ... WHERE ...` builder.
#[derive(Debug, Clone)]
pub struct UpdateCriteriaBuilder {
    ctx: EngineContext,
    target: String,
    model: QueryModel,
}

impl UpdateCriteriaBuilder {
    pub(crate) fn new(ctx: EngineContext, target: &str, alias: &str) -> QueryResult<Self> {
        require_entity(&ctx, target)?;
        let model = target_model(
            &ctx,
            StatementKind::Update {
                target: target.to_string(),
            },
            target,
            alias,
        )?;
        Ok(Self {
            ctx,
            target: target.to_string(),
            model,
        })
    }

    /// `SET alias.attribute = expr`
    pub fn set(self, attribute: &str, expr: &str) -> QueryResult<Self> {
        self.bind(attribute, expr)
    }

    /// `SET alias.attribute = :attribute`
    pub fn set_value(self, attribute: &str, value: impl Into<Value>) -> QueryResult<Self> {
        self.bind_value(attribute, value)
    }
}

impl QueryBuilder for UpdateCriteriaBuilder {
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

impl BindBuilder for UpdateCriteriaBuilder {
    fn bind_owner(&self) -> &str {
        &self.target
    }
}

impl WithCtes for UpdateCriteriaBuilder {}

impl StatementBuilder for UpdateCriteriaBuilder {}
