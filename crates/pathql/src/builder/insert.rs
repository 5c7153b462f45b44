use crate::cte::is_covered;
use crate::error::{QueryError, QueryResult};
use crate::metamodel::TypeKind;
use crate::model::{QueryModel, StatementKind};

use super::traits::{BindBuilder, QueryBuilder, StatementBuilder, WithCtes};
use super::EngineContext;

/// `INSERT INTO target(...) SELECT ...` builder.
///
/// Columns come from `bind`; the SELECT part is built with the usual
/// `from`/`where_*` calls. Columns render in attribute name order.
#[derive(Debug, Clone)]
pub struct InsertCriteriaBuilder {
    ctx: EngineContext,
    target: String,
    model: QueryModel,
}

impl InsertCriteriaBuilder {
    pub(crate) fn new(ctx: EngineContext, target: &str) -> QueryResult<Self> {
        require_entity(&ctx, target)?;
        Ok(Self {
            ctx,
            target: target.to_string(),
            model: QueryModel::new(StatementKind::Insert {
                target: target.to_string(),
            }),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Modification targets must be entities.
pub(crate) fn require_entity(ctx: &EngineContext, target: &str) -> QueryResult<()> {
    let ty = ctx.metamodel().require_type(target)?;
    if ty.kind != TypeKind::Entity {
        return Err(QueryError::validation(format!(
            "'{target}' is not an entity and cannot be modified"
        )));
    }
    Ok(())
}

/// Every required attribute of `target` must be bound by an INSERT.
pub(crate) fn check_required(ctx: &EngineContext, target: &str, model: &QueryModel) -> QueryResult<()> {
    let bound: Vec<String> = model.bindings().iter().map(|b| b.attribute.clone()).collect();
    let missing: Vec<String> = ctx
        .metamodel()
        .required_attributes(target)?
        .into_iter()
        .filter(|attr| !is_covered(attr, &bound))
        .collect();
    if !missing.is_empty() {
        return Err(QueryError::CteColumnMismatch {
            cte: target.to_string(),
            attributes: missing,
        });
    }
    Ok(())
}

impl QueryBuilder for InsertCriteriaBuilder {
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

impl BindBuilder for InsertCriteriaBuilder {
    fn bind_owner(&self) -> &str {
        &self.target
    }
}

impl WithCtes for InsertCriteriaBuilder {}

impl StatementBuilder for InsertCriteriaBuilder {
    fn validate(&self) -> QueryResult<()> {
        check_required(&self.ctx, &self.target, &self.model)
    }
}
