use crate::client::{ExecutionProvider, ResultShape, ReturningResult};
use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, parse_expr};
use crate::model::{JoinKind, OrderItem, QueryModel, SelectItem, StatementKind, ValuesSource};
use crate::predicate::{CmpOp, InRhs, Predicate};
use crate::render::RenderedQuery;
use crate::row::FromRow;
use crate::value::Value;

use super::EngineContext;
use super::cte::{CteBuilder, RecursiveCteBuilder, ReturningCteBuilder};
use super::subquery::SubqueryBuilder;

/// Clauses shared by every builder: sources, joins, restrictions, ordering
/// and parameters.
pub trait QueryBuilder: Sized {
    fn context(&self) -> &EngineContext;

    fn model(&self) -> &QueryModel;

    fn model_mut(&mut self) -> &mut QueryModel;

    /// Consume the builder and return its model.
    fn into_model(self) -> QueryModel;

    /// Add a FROM root.
    fn from(mut self, entity: &str, alias: &str) -> QueryResult<Self> {
        let ctx = self.context().clone();
        self.model_mut().add_root(ctx.metamodel(), entity, Some(alias))?;
        Ok(self)
    }

    /// Add a FROM root aliased by the lower-cased type name.
    fn from_default(mut self, entity: &str) -> QueryResult<Self> {
        let ctx = self.context().clone();
        self.model_mut().add_root(ctx.metamodel(), entity, None)?;
        Ok(self)
    }

    /// Add a FROM root backed by literal rows.
    fn from_values(mut self, alias: &str, values: ValuesSource) -> QueryResult<Self> {
        let ctx = self.context().clone();
        self.model_mut().add_values_root(ctx.metamodel(), alias, values)?;
        Ok(self)
    }

    /// Join a relation path such as `r.children`.
    fn join(mut self, path: &str, alias: &str, kind: JoinKind) -> QueryResult<Self> {
        let ctx = self.context().clone();
        self.model_mut().join_path(ctx.metamodel(), path, alias, kind)?;
        Ok(self)
    }

    fn left_join(self, path: &str, alias: &str) -> QueryResult<Self> {
        self.join(path, alias, JoinKind::Left)
    }

    fn inner_join(self, path: &str, alias: &str) -> QueryResult<Self> {
        self.join(path, alias, JoinKind::Inner)
    }

    /// Join an unrelated managed type with an explicit ON condition.
    fn join_on(mut self, entity: &str, alias: &str, kind: JoinKind, on: Predicate) -> QueryResult<Self> {
        let ctx = self.context().clone();
        self.model_mut()
            .add_entity_join(ctx.metamodel(), entity, alias, kind, on)?;
        Ok(self)
    }

    /// AND a predicate into WHERE, resolving its paths.
    fn where_(mut self, predicate: Predicate) -> QueryResult<Self> {
        let ctx = self.context().clone();
        let model = self.model_mut();
        let predicate = model.resolve_predicate(ctx.metamodel(), predicate)?;
        model.push_where(predicate);
        Ok(self)
    }

    /// `left op right`, both sides parsed as expressions.
    fn where_expr(self, left: &str, op: CmpOp, right: &str) -> QueryResult<Self> {
        self.where_(Predicate::expr(left, op, right)?)
    }

    /// `left op ?` with a captured value.
    fn where_value(self, left: &str, op: CmpOp, value: impl Into<Value>) -> QueryResult<Self> {
        self.where_(Predicate::value(left, op, value)?)
    }

    fn where_eq(self, left: &str, value: impl Into<Value>) -> QueryResult<Self> {
        self.where_(Predicate::eq(left, value)?)
    }

    fn where_null(self, expr: &str) -> QueryResult<Self> {
        self.where_(Predicate::is_null(expr)?)
    }

    fn where_not_null(self, expr: &str) -> QueryResult<Self> {
        self.where_(Predicate::is_not_null(expr)?)
    }

    fn where_between(
        self,
        expr: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> QueryResult<Self> {
        self.where_(Predicate::between(expr, low, high)?)
    }

    /// `expr IN (?, ?)`. An empty list renders as a false condition.
    fn where_in<V: Into<Value>>(
        self,
        expr: &str,
        values: impl IntoIterator<Item = V>,
    ) -> QueryResult<Self> {
        self.where_(Predicate::in_values(expr, values)?)
    }

    /// `expr IN :name` with a list-valued parameter.
    fn where_in_param(self, expr: &str, name: &str) -> QueryResult<Self> {
        self.where_(Predicate::in_param(expr, name)?)
    }

    /// `expr IN (subquery)`. Aliases of this builder are visible inside.
    fn where_in_subquery<F>(self, expr: &str, build: F) -> QueryResult<Self>
    where
        F: FnOnce(SubqueryBuilder) -> QueryResult<SubqueryBuilder>,
    {
        let sub = build(SubqueryBuilder::new(
            self.context().clone(),
            self.model().outer_scope(),
        ))?;
        self.where_(Predicate::in_subquery(expr, sub.into_model())?)
    }

    fn where_not_in_subquery<F>(self, expr: &str, build: F) -> QueryResult<Self>
    where
        F: FnOnce(SubqueryBuilder) -> QueryResult<SubqueryBuilder>,
    {
        let sub = build(SubqueryBuilder::new(
            self.context().clone(),
            self.model().outer_scope(),
        ))?;
        self.where_(Predicate::In {
            expr: parse_expr(expr)?,
            rhs: InRhs::Subquery(Box::new(sub.into_model())),
            negated: true,
        })
    }

    /// `EXISTS (subquery)`.
    fn where_exists<F>(self, build: F) -> QueryResult<Self>
    where
        F: FnOnce(SubqueryBuilder) -> QueryResult<SubqueryBuilder>,
    {
        let sub = build(SubqueryBuilder::new(
            self.context().clone(),
            self.model().outer_scope(),
        ))?;
        self.where_(Predicate::exists(sub.into_model()))
    }

    fn where_not_exists<F>(self, build: F) -> QueryResult<Self>
    where
        F: FnOnce(SubqueryBuilder) -> QueryResult<SubqueryBuilder>,
    {
        let sub = build(SubqueryBuilder::new(
            self.context().clone(),
            self.model().outer_scope(),
        ))?;
        self.where_(Predicate::exists(sub.into_model()).not())
    }

    fn order_by(mut self, expr: &str, ascending: bool, nulls_first: bool) -> QueryResult<Self> {
        let ctx = self.context().clone();
        let model = self.model_mut();
        let expr = model.resolve_expr(ctx.metamodel(), parse_expr(expr)?)?;
        model.order_by.push(OrderItem {
            expr,
            ascending,
            nulls_first,
        });
        Ok(self)
    }

    /// Ascending with the configured NULL precedence.
    fn order_by_asc(self, expr: &str) -> QueryResult<Self> {
        let nulls_first = self.context().nulls_first();
        self.order_by(expr, true, nulls_first)
    }

    fn order_by_desc(self, expr: &str) -> QueryResult<Self> {
        let nulls_first = self.context().nulls_first();
        self.order_by(expr, false, nulls_first)
    }

    fn set_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.model_mut().set_parameter(name, value);
        self
    }

    /// Skip the first `offset` rows.
    fn set_first_result(mut self, offset: u64) -> Self {
        self.model_mut().window.offset = offset;
        self
    }

    fn set_max_results(mut self, limit: u64) -> Self {
        self.model_mut().window.limit = Some(limit);
        self
    }

    /// Named parameters referenced anywhere in the statement.
    fn parameter_names(&self) -> Vec<String> {
        self.model().parameter_names()
    }
}

/// Projection, grouping and HAVING.
pub trait SelectBuilder: QueryBuilder {
    fn select(self, expr: &str) -> QueryResult<Self> {
        push_select(self, expr, None)
    }

    fn select_as(self, expr: &str, alias: &str) -> QueryResult<Self> {
        push_select(self, expr, Some(alias))
    }

    /// Select a parsed expression, e.g. one built with [`Expr::function`].
    fn select_expr(mut self, expr: Expr) -> QueryResult<Self> {
        let ctx = self.context().clone();
        let model = self.model_mut();
        let expr = model.resolve_expr(ctx.metamodel(), expr)?;
        model.select.push(SelectItem { expr, alias: None });
        Ok(self)
    }

    fn distinct(mut self) -> Self {
        self.model_mut().distinct = true;
        self
    }

    fn group_by(mut self, expr: &str) -> QueryResult<Self> {
        let ctx = self.context().clone();
        let model = self.model_mut();
        let expr = model.resolve_expr(ctx.metamodel(), parse_expr(expr)?)?;
        model.group_by.push(expr);
        Ok(self)
    }

    fn having(mut self, predicate: Predicate) -> QueryResult<Self> {
        let ctx = self.context().clone();
        let model = self.model_mut();
        let predicate = model.resolve_predicate(ctx.metamodel(), predicate)?;
        model.push_having(predicate);
        Ok(self)
    }
}

fn push_select<B: QueryBuilder>(mut builder: B, expr: &str, alias: Option<&str>) -> QueryResult<B> {
    let ctx = builder.context().clone();
    let model = builder.model_mut();
    let expr = model.resolve_expr(ctx.metamodel(), parse_expr(expr)?)?;
    model.select.push(SelectItem {
        expr,
        alias: alias.map(str::to_string),
    });
    Ok(builder)
}

/// Attribute bindings of INSERT columns, UPDATE assignments and CTE columns.
pub trait BindBuilder: QueryBuilder {
    /// Type whose attributes are bound.
    fn bind_owner(&self) -> &str;

    /// Bind `attribute` to an expression such as `e.name` or `t.level + 1`.
    fn bind(self, attribute: &str, expr: &str) -> QueryResult<Self> {
        let expr = parse_expr(expr)?;
        self.bind_expr(attribute, expr)
    }

    fn bind_expr(mut self, attribute: &str, expr: Expr) -> QueryResult<Self> {
        let ctx = self.context().clone();
        ctx.metamodel().attribute(self.bind_owner(), attribute)?;
        let model = self.model_mut();
        let expr = model.resolve_expr(ctx.metamodel(), expr)?;
        model.push_binding(attribute, expr)?;
        Ok(self)
    }

    /// Bind `attribute` to a value passed as the named parameter
    /// `:attribute` (dots become underscores).
    fn bind_value(mut self, attribute: &str, value: impl Into<Value>) -> QueryResult<Self> {
        let name = attribute.replace('.', "_");
        self.model_mut().set_parameter(name.clone(), value);
        self.bind_expr(attribute, Expr::named(name))
    }
}

/// Common table expressions attached to a top-level statement.
pub trait WithCtes: QueryBuilder {
    /// Start a non-recursive CTE of the given CTE type.
    fn with(self, cte: &str) -> QueryResult<CteBuilder<Self>> {
        CteBuilder::new(self, cte)
    }

    /// Start a recursive CTE: anchor first, then `union_all()` and the
    /// recursive term.
    fn with_recursive(self, cte: &str) -> QueryResult<RecursiveCteBuilder<Self>> {
        RecursiveCteBuilder::new(self, cte)
    }

    /// Start a CTE backed by an INSERT, UPDATE or DELETE with RETURNING.
    fn with_returning(self, cte: &str) -> QueryResult<ReturningCteBuilder<Self>> {
        ReturningCteBuilder::new(self, cte)
    }
}

/// Rendering and execution of a finished statement.
pub trait StatementBuilder: QueryBuilder + Sync {
    /// Checks that need the metamodel and cannot run at render time.
    fn validate(&self) -> QueryResult<()> {
        Ok(())
    }

    /// Render with the factory's dialect.
    fn render(&self) -> QueryResult<RenderedQuery> {
        self.validate()?;
        self.context().render(self.model())
    }

    fn query_string(&self) -> QueryResult<String> {
        Ok(self.render()?.text)
    }

    /// Run a SELECT and map every row.
    fn result_list<T>(
        &self,
        provider: &impl ExecutionProvider,
    ) -> impl std::future::Future<Output = QueryResult<Vec<T>>> + Send
    where
        T: FromRow + Send,
    {
        async move {
            require_select(self.model())?;
            self.validate()?;
            let request = self.context().prepare(self.model(), ResultShape::Rows)?;
            provider.query_as(&request).await
        }
    }

    /// Run a SELECT that must produce exactly one row.
    fn single_result<T>(
        &self,
        provider: &impl ExecutionProvider,
    ) -> impl std::future::Future<Output = QueryResult<T>> + Send
    where
        T: FromRow + Send,
    {
        async move {
            require_select(self.model())?;
            self.validate()?;
            let request = self.context().prepare(self.model(), ResultShape::Rows)?;
            let row = provider.query_one(&request).await?;
            T::from_row(&row)
        }
    }

    /// Run a modification statement and return the number of affected rows.
    fn execute_update(
        &self,
        provider: &impl ExecutionProvider,
    ) -> impl std::future::Future<Output = QueryResult<u64>> + Send {
        async move {
            require_modification(self.model())?;
            self.validate()?;
            let request = self
                .context()
                .prepare(self.model(), ResultShape::UpdateCount)?;
            provider.execute(&request).await
        }
    }

    /// Run a modification statement returning `columns` of every affected row.
    ///
    /// Uses the dialect's RETURNING clause, or a modification CTE where only
    /// that is available.
    fn execute_with_returning<T>(
        &self,
        provider: &impl ExecutionProvider,
        columns: &[&str],
    ) -> impl std::future::Future<Output = QueryResult<ReturningResult<T>>> + Send
    where
        T: FromRow + Send,
    {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        async move {
            require_modification(self.model())?;
            self.validate()?;
            let request = self.context().prepare_returning(self.model(), &columns)?;
            let rows = provider.query_as(&request).await?;
            Ok(ReturningResult::new(rows))
        }
    }
}

fn require_select(model: &QueryModel) -> QueryResult<()> {
    if model.kind != StatementKind::Select {
        return Err(QueryError::unsupported(format!(
            "cannot fetch a result list from a {} statement; use execute_update",
            model.kind.name()
        )));
    }
    Ok(())
}

fn require_modification(model: &QueryModel) -> QueryResult<()> {
    if !model.kind.is_modification() {
        return Err(QueryError::unsupported(
            "execute_update requires an INSERT, UPDATE or DELETE statement",
        ));
    }
    Ok(())
}
