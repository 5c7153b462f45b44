use std::sync::Arc;

use crate::cte::{self, CteDraft};
use crate::error::{QueryError, QueryResult};
use crate::expr::parse_expr;
use crate::model::{BoundAttribute, QueryModel, StatementKind};
use crate::value::Value;

use super::insert::{check_required, require_entity};
use super::traits::{BindBuilder, QueryBuilder};
use super::{EngineContext, target_model};

fn require_cte_type(ctx: &EngineContext, name: &str) -> QueryResult<()> {
    let ty = ctx.metamodel().require_type(name)?;
    if ty.kind != crate::metamodel::TypeKind::Cte {
        return Err(QueryError::validation(format!("'{name}' is not a CTE type")));
    }
    Ok(())
}

/// Body of a non-recursive CTE. `end()` returns to the enclosing builder.
#[derive(Debug, Clone)]
pub struct CteBuilder<P> {
    parent: P,
    name: String,
    model: QueryModel,
}

impl<P: QueryBuilder> CteBuilder<P> {
    pub(crate) fn new(parent: P, name: &str) -> QueryResult<Self> {
        require_cte_type(parent.context(), name)?;
        Ok(Self {
            parent,
            name: name.to_string(),
            model: QueryModel::select_model(),
        })
    }

    /// Validate the bindings and register the CTE on the parent.
    pub fn end(self) -> QueryResult<P> {
        let Self {
            mut parent,
            name,
            model,
        } = self;
        let definition = cte::finalize(
            parent.context().metamodel(),
            CteDraft {
                name,
                anchor: model,
                recursive_term: None,
            },
        )?;
        parent.model_mut().add_cte(Arc::new(definition))?;
        Ok(parent)
    }
}

impl<P: QueryBuilder> QueryBuilder for CteBuilder<P> {
    fn context(&self) -> &EngineContext {
        self.parent.context()
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

impl<P: QueryBuilder> BindBuilder for CteBuilder<P> {
    fn bind_owner(&self) -> &str {
        &self.name
    }
}

/// Anchor and recursive term of a recursive CTE.
///
/// Calls before `union_all()` build the anchor, calls after it the
/// recursive term. Both must bind the same attributes.
#[derive(Debug, Clone)]
pub struct RecursiveCteBuilder<P> {
    parent: P,
    name: String,
    anchor: QueryModel,
    term: Option<QueryModel>,
}

impl<P: QueryBuilder> RecursiveCteBuilder<P> {
    pub(crate) fn new(parent: P, name: &str) -> QueryResult<Self> {
        require_cte_type(parent.context(), name)?;
        Ok(Self {
            parent,
            name: name.to_string(),
            anchor: QueryModel::select_model(),
            term: None,
        })
    }

    /// Finish the anchor and start the recursive term.
    pub fn union_all(mut self) -> QueryResult<Self> {
        if self.term.is_some() {
            return Err(QueryError::validation(format!(
                "recursive CTE '{}' already has a recursive term",
                self.name
            )));
        }
        self.term = Some(QueryModel::select_model());
        Ok(self)
    }

    pub fn end(self) -> QueryResult<P> {
        let Self {
            mut parent,
            name,
            anchor,
            term,
        } = self;
        let Some(term) = term else {
            return Err(QueryError::validation(format!(
                "recursive CTE '{name}' needs union_all() before end()"
            )));
        };
        let definition = cte::finalize(
            parent.context().metamodel(),
            CteDraft {
                name,
                anchor,
                recursive_term: Some(term),
            },
        )?;
        parent.model_mut().add_cte(Arc::new(definition))?;
        Ok(parent)
    }
}

impl<P: QueryBuilder> QueryBuilder for RecursiveCteBuilder<P> {
    fn context(&self) -> &EngineContext {
        self.parent.context()
    }

    fn model(&self) -> &QueryModel {
        self.term.as_ref().unwrap_or(&self.anchor)
    }

    fn model_mut(&mut self) -> &mut QueryModel {
        match &mut self.term {
            Some(term) => term,
            None => &mut self.anchor,
        }
    }

    fn into_model(self) -> QueryModel {
        self.term.unwrap_or(self.anchor)
    }
}

impl<P: QueryBuilder> BindBuilder for RecursiveCteBuilder<P> {
    fn bind_owner(&self) -> &str {
        &self.name
    }
}

/// Chooses the modification statement behind a returning CTE.
#[derive(Debug, Clone)]
pub struct ReturningCteBuilder<P> {
    parent: P,
    name: String,
}

impl<P: QueryBuilder> ReturningCteBuilder<P> {
    pub(crate) fn new(parent: P, name: &str) -> QueryResult<Self> {
        require_cte_type(parent.context(), name)?;
        Ok(Self {
            parent,
            name: name.to_string(),
        })
    }

    pub fn insert(self, target: &str) -> QueryResult<ReturningStatementBuilder<P>> {
        require_entity(self.parent.context(), target)?;
        let model = QueryModel::new(StatementKind::Insert {
            target: target.to_string(),
        });
        Ok(self.statement(target, model))
    }

    pub fn update(self, target: &str, alias: &str) -> QueryResult<ReturningStatementBuilder<P>> {
        require_entity(self.parent.context(), target)?;
        let model = target_model(
            self.parent.context(),
            StatementKind::Update {
                target: target.to_string(),
            },
            target,
            alias,
        )?;
        Ok(self.statement(target, model))
    }

    pub fn delete(self, target: &str, alias: &str) -> QueryResult<ReturningStatementBuilder<P>> {
        require_entity(self.parent.context(), target)?;
        let model = target_model(
            self.parent.context(),
            StatementKind::Delete {
                target: target.to_string(),
            },
            target,
            alias,
        )?;
        Ok(self.statement(target, model))
    }

    fn statement(self, target: &str, model: QueryModel) -> ReturningStatementBuilder<P> {
        ReturningStatementBuilder {
            parent: self.parent,
            name: self.name,
            target: target.to_string(),
            model,
        }
    }
}

/// Modification statement inside a returning CTE.
///
/// `returning("attr", expr)` maps a CTE attribute to a value of the affected
/// row. For INSERT the expression names a target attribute; for UPDATE and
/// DELETE it is a path from the target alias.
#[derive(Debug, Clone)]
pub struct ReturningStatementBuilder<P> {
    parent: P,
    name: String,
    target: String,
    model: QueryModel,
}

impl<P: QueryBuilder> ReturningStatementBuilder<P> {
    pub fn returning(mut self, attribute: &str, expr: &str) -> QueryResult<Self> {
        if self.model.returning.iter().any(|b| b.attribute == attribute) {
            return Err(QueryError::validation(format!(
                "attribute '{attribute}' of CTE '{}' is already returned",
                self.name
            )));
        }
        let ctx = self.parent.context().clone();
        let expr = parse_expr(expr)?;
        let expr = if matches!(self.model.kind, StatementKind::Insert { .. }) {
            let path = expr
                .as_path()
                .ok_or_else(|| QueryError::validation("INSERT can only return target attributes"))?;
            ctx.metamodel()
                .attribute(&self.target, &path.segments.join("."))?;
            expr
        } else {
            self.model.resolve_expr(ctx.metamodel(), expr)?
        };
        self.model.returning.push(BoundAttribute {
            attribute: attribute.to_string(),
            expr,
        });
        Ok(self)
    }

    /// `SET alias.attribute = expr` for an UPDATE.
    pub fn set(self, attribute: &str, expr: &str) -> QueryResult<Self> {
        self.bind(attribute, expr)
    }

    pub fn set_value(self, attribute: &str, value: impl Into<Value>) -> QueryResult<Self> {
        self.bind_value(attribute, value)
    }

    /// Validate the returned attributes and register the CTE on the parent.
    pub fn end(self) -> QueryResult<P> {
        let Self {
            mut parent,
            name,
            target,
            model,
        } = self;
        if matches!(model.kind, StatementKind::Insert { .. }) {
            check_required(parent.context(), &target, &model)?;
        }
        let definition = cte::finalize_returning(parent.context().metamodel(), &name, model)?;
        parent.model_mut().add_cte(Arc::new(definition))?;
        Ok(parent)
    }
}

impl<P: QueryBuilder> QueryBuilder for ReturningStatementBuilder<P> {
    fn context(&self) -> &EngineContext {
        self.parent.context()
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

impl<P: QueryBuilder> BindBuilder for ReturningStatementBuilder<P> {
    fn bind_owner(&self) -> &str {
        &self.target
    }
}
