use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cte::CteDefinition;
use crate::dialect::{
    DialectCapabilities, LimitStyle, NullOrdering, ParamStyle, RecursiveKeyword, ValuesClauseStyle,
};
use crate::error::{QueryError, QueryResult};
use crate::expr::{ArithOp, Expr, Param, PathExpr, PathRoot};
use crate::function::{FunctionCall, FunctionRegistry};
use crate::model::{
    JoinNode, NodeRole, NodeSource, OrderItem, QueryModel, StatementKind, ValuesSource, Window,
};
use crate::predicate::{InRhs, Predicate};
use crate::value::Value;

use super::ParamSlot;

/// Column carrying the row number under [`LimitStyle::RowNumber`].
const ROW_NUMBER_COLUMN: &str = "rownum_";

/// The model being rendered and the CTE names it may reference.
#[derive(Clone, Copy)]
struct Scope<'m> {
    model: &'m QueryModel,
    ctes: &'m [String],
}

pub(super) struct Renderer<'a> {
    caps: &'a DialectCapabilities,
    functions: &'a FunctionRegistry,
    parameters: BTreeMap<String, Value>,
    /// Caller parameter names that generated placeholder names must skip.
    reserved: BTreeSet<String>,
    slots: Vec<ParamSlot>,
    anonymous: usize,
}

impl<'a> Renderer<'a> {
    pub(super) fn new(
        caps: &'a DialectCapabilities,
        functions: &'a FunctionRegistry,
        model: &QueryModel,
    ) -> Self {
        Self {
            caps,
            functions,
            parameters: model.all_parameters(),
            reserved: model.reserved_parameter_names(),
            slots: Vec::new(),
            anonymous: 0,
        }
    }

    pub(super) fn into_slots(self) -> Vec<ParamSlot> {
        self.slots
    }

    /// Render a full statement, including its own WITH block.
    ///
    /// `outer_ctes` are the CTE names visible from the enclosing context.
    /// `in_cte` is set for the body of a returning CTE, where RETURNING is
    /// allowed regardless of native support.
    pub(super) fn statement(
        &mut self,
        model: &QueryModel,
        outer_ctes: &[String],
        in_cte: bool,
    ) -> QueryResult<String> {
        let (mut out, visible) = self.cte_block(&model.ctes, outer_ctes)?;
        let scope = Scope {
            model,
            ctes: &visible,
        };

        let body = match &model.kind {
            StatementKind::Select => self.select(scope)?,
            StatementKind::Insert { target } => self.insert(scope, target)?,
            StatementKind::Update { target } => self.update(scope, target)?,
            StatementKind::Delete { target } => self.delete(scope, target)?,
        };
        out.push_str(&body);

        if !model.returning.is_empty() {
            if !model.kind.is_modification() {
                return Err(QueryError::unsupported(
                    "RETURNING requires an INSERT, UPDATE or DELETE statement",
                ));
            }
            if !in_cte && !self.caps.supports_returning_clause {
                return Err(QueryError::unsupported_feature(
                    &self.caps.name,
                    "RETURNING clause",
                ));
            }
            let mut items = Vec::with_capacity(model.returning.len());
            for binding in &model.returning {
                items.push(self.expr(scope, &binding.expr)?);
            }
            out.push_str(" RETURNING ");
            out.push_str(&items.join(", "));
        }
        Ok(out)
    }

    /// Render a WITH block followed by a newline; empty when there are no CTEs.
    ///
    /// Returns the text and the CTE names visible to the main statement.
    pub(super) fn cte_block(
        &mut self,
        ctes: &[Arc<CteDefinition>],
        outer: &[String],
    ) -> QueryResult<(String, Vec<String>)> {
        let mut visible = outer.to_vec();
        if ctes.is_empty() {
            return Ok((String::new(), visible));
        }
        self.check_cte_capabilities(ctes)?;

        let mut out = String::from("WITH ");
        if self.caps.recursive_keyword == RecursiveKeyword::Global
            && ctes.iter().any(|c| c.is_recursive())
        {
            out.push_str("RECURSIVE ");
        }
        for (i, cte) in ctes.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if cte.is_recursive() && self.caps.recursive_keyword == RecursiveKeyword::PerCte {
                out.push_str("RECURSIVE ");
            }
            out.push_str(&cte.name);
            out.push('(');
            out.push_str(&cte.columns.join(", "));
            out.push_str(") AS(\n");
            out.push_str(&self.statement(&cte.anchor, &visible, cte.is_returning())?);
            if let Some(term) = &cte.recursive_term {
                let mut with_self = visible.clone();
                with_self.push(cte.name.clone());
                out.push_str("\nUNION ALL\n");
                out.push_str(&self.statement(term, &with_self, false)?);
            }
            out.push_str("\n)");
            visible.push(cte.name.clone());
        }
        out.push('\n');
        Ok((out, visible))
    }

    fn check_cte_capabilities(&self, ctes: &[Arc<CteDefinition>]) -> QueryResult<()> {
        let caps = self.caps;
        let unsupported = |feature: &str| Err(QueryError::unsupported_feature(&caps.name, feature));
        if ctes.iter().any(|c| c.is_recursive()) && !caps.supports_recursive_cte {
            return unsupported("recursive CTEs");
        }
        if ctes.len() > 1 && !caps.supports_multiple_ctes {
            return unsupported("multiple CTEs");
        }
        if ctes.iter().any(|c| c.has_window()) && !caps.supports_limit_in_cte {
            return unsupported("LIMIT/OFFSET inside a CTE");
        }
        if ctes.iter().any(|c| c.is_returning()) && !caps.supports_modification_cte {
            return unsupported("modification statements inside a CTE");
        }
        Ok(())
    }

    fn select(&mut self, scope: Scope<'_>) -> QueryResult<String> {
        let model = scope.model;
        let mut items = Vec::with_capacity(model.select.len());
        for item in &model.select {
            let expr = self.expr(scope, &item.expr)?;
            items.push(match &item.alias {
                Some(alias) => format!("{expr} AS {alias}"),
                None => expr,
            });
        }
        if items.is_empty() {
            let root = model
                .first_root()
                .ok_or_else(|| QueryError::validation("query has no FROM root"))?;
            items.push(model.node(root).alias.clone());
        }
        self.select_body(scope, items)
    }

    /// `SELECT items FROM ... WHERE ... ORDER BY ...` plus the window.
    fn select_body(&mut self, scope: Scope<'_>, mut items: Vec<String>) -> QueryResult<String> {
        let model = scope.model;
        let mut orders = Vec::with_capacity(model.order_by.len());
        let numbered = !model.window.is_unbounded() && self.caps.limit_style == LimitStyle::RowNumber;
        if numbered {
            // The ordering moves into the row number, which is rendered in the
            // select list ahead of FROM.
            for item in &model.order_by {
                orders.push(self.order_item(scope, item)?);
            }
            let over = if orders.is_empty() {
                "NULL".to_string()
            } else {
                orders.join(", ")
            };
            items.push(format!("ROW_NUMBER() OVER (ORDER BY {over}) {ROW_NUMBER_COLUMN}"));
        }

        let mut sql = String::from("SELECT ");
        if model.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&items.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&self.from(scope)?);

        if let Some(predicate) = &model.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicate(scope, predicate)?);
        }
        if !model.group_by.is_empty() {
            let mut groups = Vec::with_capacity(model.group_by.len());
            for expr in &model.group_by {
                groups.push(self.expr(scope, expr)?);
            }
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }
        if let Some(predicate) = &model.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.predicate(scope, predicate)?);
        }
        if !numbered {
            for item in &model.order_by {
                orders.push(self.order_item(scope, item)?);
            }
            if !orders.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&orders.join(", "));
            }
        }
        Ok(self.apply_window(sql, model.window))
    }

    fn insert(&mut self, scope: Scope<'_>, target: &str) -> QueryResult<String> {
        let model = scope.model;
        if model.bindings.is_empty() {
            return Err(QueryError::validation(format!(
                "INSERT INTO {target} binds no attributes"
            )));
        }
        if !model.window.is_unbounded() && self.caps.limit_style == LimitStyle::RowNumber {
            return Err(QueryError::unsupported_feature(
                &self.caps.name,
                "a row window on INSERT ... SELECT",
            ));
        }
        let mut bindings: Vec<_> = model.bindings.iter().collect();
        bindings.sort_by(|a, b| a.attribute.cmp(&b.attribute));

        let columns: Vec<&str> = bindings.iter().map(|b| b.attribute.as_str()).collect();
        let mut items = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            items.push(self.expr(scope, &binding.expr)?);
        }
        let body = self.select_body(scope, items)?;
        Ok(format!("INSERT INTO {target}({})\n{body}", columns.join(", ")))
    }

    fn update(&mut self, scope: Scope<'_>, target: &str) -> QueryResult<String> {
        let model = scope.model;
        let alias = self.single_target(model, "UPDATE")?;
        if model.bindings.is_empty() {
            return Err(QueryError::validation(format!(
                "UPDATE {target} sets no attributes"
            )));
        }
        let mut assignments = Vec::with_capacity(model.bindings.len());
        for binding in &model.bindings {
            let value = self.expr(scope, &binding.expr)?;
            assignments.push(format!("{alias}.{} = {value}", binding.attribute));
        }
        let mut sql = format!("UPDATE {target} {alias} SET {}", assignments.join(", "));
        if let Some(predicate) = &model.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicate(scope, predicate)?);
        }
        Ok(sql)
    }

    fn delete(&mut self, scope: Scope<'_>, target: &str) -> QueryResult<String> {
        let model = scope.model;
        let alias = self.single_target(model, "DELETE")?;
        let mut sql = format!("DELETE FROM {target} {alias}");
        if let Some(predicate) = &model.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicate(scope, predicate)?);
        }
        Ok(sql)
    }

    /// Alias of the single, join-free target of an UPDATE or DELETE.
    fn single_target(&self, model: &QueryModel, statement: &str) -> QueryResult<String> {
        if !model.window.is_unbounded() {
            return Err(QueryError::unsupported(format!(
                "{statement} statements cannot be windowed"
            )));
        }
        if !model.order_by.is_empty() {
            return Err(QueryError::unsupported(format!(
                "{statement} statements cannot be ordered"
            )));
        }
        let plan = model.join_plan();
        match plan.as_slice() {
            [single] if single.joins.is_empty() => Ok(model.node(single.root).alias.clone()),
            [] => Err(QueryError::validation(format!("{statement} has no target"))),
            _ => Err(QueryError::unsupported(format!(
                "{statement} statements cannot contain joins"
            ))),
        }
    }

    fn from(&mut self, scope: Scope<'_>) -> QueryResult<String> {
        let model = scope.model;
        let plans = model.join_plan();
        if plans.is_empty() {
            return Err(QueryError::validation("query has no FROM root"));
        }
        let mut parts = Vec::with_capacity(plans.len());
        for plan in &plans {
            let mut part = self.source(scope, model.node(plan.root))?;
            for id in &plan.joins {
                part.push(' ');
                part.push_str(&self.join(scope, model.node(*id))?);
            }
            parts.push(part);
        }
        Ok(parts.join(", "))
    }

    fn source(&mut self, scope: Scope<'_>, node: &JoinNode) -> QueryResult<String> {
        match &node.source {
            NodeSource::Entity => Ok(format!("{} {}", node.entity, node.alias)),
            NodeSource::Cte => {
                if !scope.ctes.contains(&node.entity) {
                    return Err(QueryError::UndefinedCte(node.entity.clone()));
                }
                Ok(format!("{} {}", node.entity, node.alias))
            }
            NodeSource::Values(values) => Ok(self.values(values, &node.alias)),
        }
    }

    fn join(&mut self, scope: Scope<'_>, node: &JoinNode) -> QueryResult<String> {
        match &node.role {
            NodeRole::Relation { parent, path, .. } => Ok(format!(
                "{} {}.{path} {}",
                node.kind.keyword(),
                scope.model.node(*parent).alias,
                node.alias
            )),
            NodeRole::Entity { .. } => {
                let mut sql = format!("{} {}", node.kind.keyword(), self.source(scope, node)?);
                if let Some(on) = &node.on {
                    sql.push_str(" ON ");
                    sql.push_str(&self.predicate(scope, on)?);
                }
                Ok(sql)
            }
            NodeRole::Root => Err(QueryError::validation(format!(
                "'{}' is a FROM root, not a join",
                node.alias
            ))),
        }
    }

    fn values(&mut self, values: &ValuesSource, alias: &str) -> String {
        match self.caps.values_clause {
            ValuesClauseStyle::Values => {
                let rows: Vec<String> = values
                    .rows
                    .iter()
                    .map(|row| {
                        let cells: Vec<String> = row.iter().map(|v| self.value_placeholder(v)).collect();
                        format!("({})", cells.join(","))
                    })
                    .collect();
                if values.scalar {
                    format!("(VALUES {}) {alias}", rows.join(", "))
                } else {
                    format!("{}(VALUES {}) {alias}", values.type_name, rows.join(", "))
                }
            }
            style @ (ValuesClauseStyle::SelectUnionAll | ValuesClauseStyle::SelectFromDualUnionAll) => {
                let dual = style == ValuesClauseStyle::SelectFromDualUnionAll;
                let rows: Vec<String> = values
                    .rows
                    .iter()
                    .enumerate()
                    .map(|(i, row)| {
                        let cells: Vec<String> = row
                            .iter()
                            .zip(&values.columns)
                            .map(|(v, column)| {
                                let placeholder = self.value_placeholder(v);
                                if i == 0 {
                                    format!("{placeholder} {}", column.replace('.', "_"))
                                } else {
                                    placeholder
                                }
                            })
                            .collect();
                        let mut row_sql = format!("SELECT {}", cells.join(", "));
                        if dual {
                            row_sql.push_str(" FROM DUAL");
                        }
                        row_sql
                    })
                    .collect();
                format!("({}) {alias}", rows.join(" UNION ALL "))
            }
        }
    }

    fn order_item(&mut self, scope: Scope<'_>, item: &OrderItem) -> QueryResult<String> {
        let direction = if item.ascending { "ASC" } else { "DESC" };
        match self.caps.null_ordering {
            NullOrdering::Native => {
                let expr = self.expr(scope, &item.expr)?;
                let nulls = if item.nulls_first { "FIRST" } else { "LAST" };
                Ok(format!("{expr} {direction} NULLS {nulls}"))
            }
            NullOrdering::CaseWhen => {
                // The expression appears twice, so its placeholders are recorded twice.
                let key = self.expr(scope, &item.expr)?;
                let expr = self.expr(scope, &item.expr)?;
                let (null_rank, value_rank) = if item.nulls_first { (0, 1) } else { (1, 0) };
                Ok(format!(
                    "CASE WHEN {key} IS NULL THEN {null_rank} ELSE {value_rank} END, {expr} {direction}"
                ))
            }
        }
    }

    fn apply_window(&self, mut sql: String, window: Window) -> String {
        if window.is_unbounded() {
            return sql;
        }
        match self.caps.limit_style {
            LimitStyle::LimitOffset => {
                if let Some(limit) = window.limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }
                if window.offset > 0 {
                    sql.push_str(&format!(" OFFSET {}", window.offset));
                }
                sql
            }
            LimitStyle::OffsetFetch => {
                sql.push_str(&format!(" OFFSET {} ROWS", window.offset));
                if let Some(limit) = window.limit {
                    sql.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                }
                sql
            }
            LimitStyle::RowNumber => {
                let mut wrapped = format!(
                    "SELECT * FROM ({sql}) paged_ WHERE {ROW_NUMBER_COLUMN} > {}",
                    window.offset
                );
                if let Some(limit) = window.limit {
                    wrapped.push_str(&format!(
                        " AND {ROW_NUMBER_COLUMN} <= {}",
                        window.offset.saturating_add(limit)
                    ));
                }
                wrapped.push_str(&format!(" ORDER BY {ROW_NUMBER_COLUMN}"));
                wrapped
            }
        }
    }

    fn predicate(&mut self, scope: Scope<'_>, predicate: &Predicate) -> QueryResult<String> {
        match predicate {
            Predicate::And(items) => {
                if items.is_empty() {
                    return Ok("1=1".to_string());
                }
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    let sql = self.predicate(scope, item)?;
                    parts.push(if matches!(item, Predicate::Or(_)) {
                        format!("({sql})")
                    } else {
                        sql
                    });
                }
                Ok(parts.join(" AND "))
            }
            Predicate::Or(items) => {
                if items.is_empty() {
                    return Ok("1=0".to_string());
                }
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    let sql = self.predicate(scope, item)?;
                    parts.push(if matches!(item, Predicate::And(_)) {
                        format!("({sql})")
                    } else {
                        sql
                    });
                }
                Ok(parts.join(" OR "))
            }
            Predicate::Not(inner) => Ok(format!("NOT ({})", self.predicate(scope, inner)?)),
            Predicate::Compare { left, op, right } => {
                let left = self.expr(scope, left)?;
                let right = self.expr(scope, right)?;
                Ok(format!("{left} {} {right}", op.as_str()))
            }
            Predicate::IsNull { expr, negated } => {
                let expr = self.expr(scope, expr)?;
                Ok(if *negated {
                    format!("{expr} IS NOT NULL")
                } else {
                    format!("{expr} IS NULL")
                })
            }
            Predicate::In { expr, rhs, negated } => {
                let lhs = self.expr(scope, expr)?;
                let op = if *negated { "NOT IN" } else { "IN" };
                match rhs {
                    InRhs::List(items) => {
                        if items.is_empty() {
                            return Ok(if *negated { "1=1" } else { "1=0" }.to_string());
                        }
                        let mut rendered = Vec::with_capacity(items.len());
                        for item in items {
                            rendered.push(self.expr(scope, item)?);
                        }
                        Ok(format!("{lhs} {op} ({})", rendered.join(", ")))
                    }
                    InRhs::Subquery(model) => {
                        let sub = self.statement(model, scope.ctes, false)?;
                        Ok(format!("{lhs} {op} ({sub})"))
                    }
                    InRhs::Param(name) => Ok(self.in_param(&lhs, op, name, *negated)),
                }
            }
            Predicate::Exists { subquery, negated } => {
                let sub = self.statement(subquery, scope.ctes, false)?;
                Ok(if *negated {
                    format!("NOT EXISTS ({sub})")
                } else {
                    format!("EXISTS ({sub})")
                })
            }
            Predicate::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let expr = self.expr(scope, expr)?;
                let low = self.expr(scope, low)?;
                let high = self.expr(scope, high)?;
                let op = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                Ok(format!("{expr} {op} {low} AND {high}"))
            }
        }
    }

    /// `lhs IN :name`, or an expanded positional list when the parameter is
    /// already bound to a list.
    fn in_param(&mut self, lhs: &str, op: &str, name: &str, negated: bool) -> String {
        if self.caps.param_style == ParamStyle::Named {
            return format!("{lhs} {op} {}", self.named_placeholder(name));
        }
        let items = match self.parameters.get(name) {
            Some(Value::List(items)) => Some(items.clone()),
            _ => None,
        };
        match items {
            Some(items) if items.is_empty() => (if negated { "1=1" } else { "1=0" }).to_string(),
            Some(items) => {
                let placeholders: Vec<String> = items.iter().map(|v| self.value_placeholder(v)).collect();
                format!("{lhs} {op} ({})", placeholders.join(", "))
            }
            None => format!("{lhs} {op} ({})", self.named_placeholder(name)),
        }
    }

    fn expr(&mut self, scope: Scope<'_>, expr: &Expr) -> QueryResult<String> {
        match expr {
            Expr::Path(path) => self.path(scope, path),
            Expr::Literal(literal) => Ok(literal.to_string()),
            Expr::Param(Param::Named(name)) => Ok(self.named_placeholder(name)),
            Expr::Param(Param::Value(value)) => Ok(self.value_placeholder(value)),
            Expr::Function {
                name,
                args,
                distinct,
            } => {
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    rendered.push(self.expr(scope, arg)?);
                }
                self.functions.render(&FunctionCall {
                    name,
                    args: &rendered,
                    distinct: *distinct,
                })
            }
            Expr::Arithmetic { op, left, right } => {
                let left = self.operand(scope, left, *op, false)?;
                let right = self.operand(scope, right, *op, true)?;
                Ok(format!("{left} {} {right}", op.symbol()))
            }
            Expr::Subquery(model) => Ok(format!("({})", self.statement(model, scope.ctes, false)?)),
        }
    }

    fn operand(
        &mut self,
        scope: Scope<'_>,
        child: &Expr,
        parent: ArithOp,
        right_side: bool,
    ) -> QueryResult<String> {
        let sql = self.expr(scope, child)?;
        if let Expr::Arithmetic { op, .. } = child {
            let looser = op.precedence() < parent.precedence();
            let regrouped = right_side
                && op.precedence() == parent.precedence()
                && matches!(parent, ArithOp::Sub | ArithOp::Div);
            if looser || regrouped {
                return Ok(format!("({sql})"));
            }
        }
        Ok(sql)
    }

    fn path(&self, scope: Scope<'_>, path: &PathExpr) -> QueryResult<String> {
        let mut out = match &path.root {
            PathRoot::Node(id) => scope
                .model
                .nodes
                .get(id.index())
                .map(|n| n.alias.clone())
                .ok_or_else(|| QueryError::validation(format!("dangling join node {}", id.index())))?,
            PathRoot::Outer(alias) => alias.clone(),
            PathRoot::Unresolved => String::new(),
        };
        for segment in &path.segments {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(segment);
        }
        Ok(out)
    }

    fn named_placeholder(&mut self, name: &str) -> String {
        self.slots.push(ParamSlot::Named(name.to_string()));
        match self.caps.param_style {
            ParamStyle::Named => format!(":{name}"),
            ParamStyle::Positional => "?".to_string(),
        }
    }

    fn value_placeholder(&mut self, value: &Value) -> String {
        let name = loop {
            let candidate = format!("param_{}", self.anonymous);
            self.anonymous += 1;
            if !self.reserved.contains(&candidate) {
                break candidate;
            }
        };
        let placeholder = match self.caps.param_style {
            ParamStyle::Named => format!(":{name}"),
            ParamStyle::Positional => "?".to_string(),
        };
        self.slots.push(ParamSlot::Anonymous {
            name,
            value: value.clone(),
        });
        placeholder
    }
}
