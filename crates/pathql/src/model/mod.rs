//! Query model: the mutable state behind every builder.
//!
//! A [`QueryModel`] owns its join arena, predicate trees, clause lists and
//! CTE registry. Builders mutate it; the planner and renderer only read it.

mod join;


pub use join::{JoinKind, JoinNode, JoinOrigin, NodeId, NodeRole, NodeSource, OuterAlias, RootPlan, ValuesSource};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cte::CteDefinition;
use crate::error::{QueryError, QueryResult};
use crate::expr::Expr;
use crate::predicate::Predicate;
use crate::value::Value;

/// Which statement a model renders as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    /// `INSERT INTO target(...) SELECT ...`
    Insert { target: String },
    /// `UPDATE target alias SET ...`; the target is node 0.
    Update { target: String },
    /// `DELETE FROM target alias ...`; the target is node 0.
    Delete { target: String },
}

impl StatementKind {
    pub fn is_modification(&self) -> bool {
        !matches!(self, StatementKind::Select)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert { .. } => "INSERT",
            StatementKind::Update { .. } => "UPDATE",
            StatementKind::Delete { .. } => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}

/// An attribute of the target type bound to an expression.
///
/// Used for INSERT columns, UPDATE assignments, CTE columns and the outputs
/// of a returning statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundAttribute {
    pub attribute: String,
    pub expr: Expr,
}

/// Row window: `first_result` rows are skipped, at most `max_results` kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl Window {
    pub fn is_unbounded(&self) -> bool {
        self.offset == 0 && self.limit.is_none()
    }

    /// Apply this window to an in-memory slice.
    pub fn slice<'a, T>(&self, rows: &'a [T]) -> &'a [T] {
        let start = (self.offset as usize).min(rows.len());
        let end = match self.limit {
            Some(limit) => start.saturating_add(limit as usize).min(rows.len()),
            None => rows.len(),
        };
        &rows[start..end]
    }
}

/// Mutable query state.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryModel {
    pub(crate) kind: StatementKind,
    pub(crate) nodes: Vec<JoinNode>,
    pub(crate) select: Vec<SelectItem>,
    pub(crate) distinct: bool,
    pub(crate) where_clause: Option<Predicate>,
    pub(crate) group_by: Vec<Expr>,
    pub(crate) having: Option<Predicate>,
    pub(crate) order_by: Vec<OrderItem>,
    pub(crate) bindings: Vec<BoundAttribute>,
    pub(crate) returning: Vec<BoundAttribute>,
    pub(crate) ctes: Vec<Arc<CteDefinition>>,
    pub(crate) window: Window,
    pub(crate) parameters: BTreeMap<String, Value>,
    pub(crate) outer: Vec<OuterAlias>,
}

impl QueryModel {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            nodes: Vec::new(),
            select: Vec::new(),
            distinct: false,
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            bindings: Vec::new(),
            returning: Vec::new(),
            ctes: Vec::new(),
            window: Window::default(),
            parameters: BTreeMap::new(),
            outer: Vec::new(),
        }
    }

    pub fn select_model() -> Self {
        Self::new(StatementKind::Select)
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn nodes(&self) -> &[JoinNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &JoinNode {
        &self.nodes[id.0]
    }

    pub fn node_by_alias(&self, alias: &str) -> Option<&JoinNode> {
        self.find_alias(alias).map(|id| self.node(id))
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.role, NodeRole::Root))
            .map(|(i, _)| NodeId(i))
    }

    pub fn first_root(&self) -> Option<NodeId> {
        self.roots().next()
    }

    pub fn ctes(&self) -> &[Arc<CteDefinition>] {
        &self.ctes
    }

    pub fn cte(&self, name: &str) -> Option<&Arc<CteDefinition>> {
        self.ctes.iter().find(|c| c.name == name)
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub fn bindings(&self) -> &[BoundAttribute] {
        &self.bindings
    }

    pub fn where_clause(&self) -> Option<&Predicate> {
        self.where_clause.as_ref()
    }

    pub fn order_by(&self) -> &[OrderItem] {
        &self.order_by
    }

    /// Register a CTE; names are unique per model.
    pub fn add_cte(&mut self, cte: Arc<CteDefinition>) -> QueryResult<()> {
        if self.cte(&cte.name).is_some() {
            return Err(QueryError::validation(format!(
                "CTE '{}' is declared more than once",
                cte.name
            )));
        }
        self.ctes.push(cte);
        Ok(())
    }

    /// AND a predicate into WHERE.
    pub(crate) fn push_where(&mut self, predicate: Predicate) {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }

    /// AND a predicate into HAVING.
    pub(crate) fn push_having(&mut self, predicate: Predicate) {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(name.into(), value.into());
    }

    /// Bind an attribute. A second binding of the same attribute is rejected.
    pub(crate) fn push_binding(&mut self, attribute: &str, expr: Expr) -> QueryResult<()> {
        if self.bindings.iter().any(|b| b.attribute == attribute) {
            return Err(QueryError::validation(format!(
                "attribute '{attribute}' is already bound"
            )));
        }
        self.bindings.push(BoundAttribute {
            attribute: attribute.to_string(),
            expr,
        });
        Ok(())
    }

    /// Visit every `:named` parameter reference, subqueries and CTE bodies included.
    pub fn for_each_named_param(&self, f: &mut impl FnMut(&str)) {
        let mut on_expr = |e: &Expr| e.for_each_named_param(&mut *f);
        self.select.iter().for_each(|s| on_expr(&s.expr));
        self.group_by.iter().for_each(&mut on_expr);
        self.order_by.iter().for_each(|o| on_expr(&o.expr));
        self.bindings.iter().for_each(|b| on_expr(&b.expr));
        self.returning.iter().for_each(|b| on_expr(&b.expr));

        let predicates = self
            .nodes
            .iter()
            .filter_map(|n| n.on.as_ref())
            .chain(self.where_clause.as_ref())
            .chain(self.having.as_ref());
        for predicate in predicates {
            predicate.for_each_named_param(f);
        }

        for cte in &self.ctes {
            cte.anchor.for_each_named_param(f);
            if let Some(term) = &cte.recursive_term {
                term.for_each_named_param(f);
            }
        }
    }

    /// Distinct named parameters referenced by this model, sorted.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.for_each_named_param(&mut |n| {
            if !names.iter().any(|x: &String| x == n) {
                names.push(n.to_string());
            }
        });
        names.sort();
        names
    }

    /// Every parameter name this model references or carries a value for.
    pub fn reserved_parameter_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.all_parameters().into_keys().collect();
        self.for_each_named_param(&mut |n| {
            names.insert(n.to_string());
        });
        names
    }

    /// `base`, or `base_N` with the smallest N, that no parameter of this
    /// model uses.
    pub fn fresh_parameter_name(&self, base: &str) -> String {
        let reserved = self.reserved_parameter_names();
        if !reserved.contains(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|name| !reserved.contains(name))
            .unwrap_or_else(|| base.to_string())
    }

    /// Parameter values of this model merged with those of its CTE bodies and
    /// subqueries. Values set on an enclosing model win.
    pub fn all_parameters(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        self.collect_parameters(&mut out);
        out
    }

    fn collect_parameters(&self, out: &mut BTreeMap<String, Value>) {
        for cte in &self.ctes {
            cte.anchor.collect_parameters(out);
            if let Some(term) = &cte.recursive_term {
                term.collect_parameters(out);
            }
        }
        let predicates = self
            .nodes
            .iter()
            .filter_map(|n| n.on.as_ref())
            .chain(self.where_clause.as_ref())
            .chain(self.having.as_ref());
        for predicate in predicates {
            predicate.for_each_subquery(&mut |m| m.collect_parameters(out));
        }
        self.for_each_clause_expr(&mut |e| {
            if let Expr::Subquery(m) = e {
                m.collect_parameters(out);
            }
        });
        out.extend(self.parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Visit every expression owned directly by this model (not subqueries).
    pub(crate) fn for_each_clause_expr(&self, f: &mut impl FnMut(&Expr)) {
        self.select.iter().for_each(|s| f(&s.expr));
        if let Some(p) = &self.where_clause {
            p.for_each_expr(f);
        }
        self.group_by.iter().for_each(|e| f(e));
        if let Some(p) = &self.having {
            p.for_each_expr(f);
        }
        self.order_by.iter().for_each(|o| f(&o.expr));
        self.bindings.iter().for_each(|b| f(&b.expr));
        self.returning.iter().for_each(|b| f(&b.expr));
    }
}
