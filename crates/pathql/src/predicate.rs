//! Predicate trees for WHERE, HAVING and ON clauses.
//!
//! A [`Predicate`] is immutable once attached to a model. Adding another
//! condition builds a new conjunction instead of mutating the existing tree.

use crate::error::QueryResult;
use crate::expr::{Expr, parse_expr};
use crate::model::QueryModel;
use crate::value::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Like => "LIKE",
            CmpOp::NotLike => "NOT LIKE",
        }
    }
}

/// Right-hand side of an IN predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum InRhs {
    List(Vec<Expr>),
    Subquery(Box<QueryModel>),
    /// A single list-valued named parameter, e.g. `r.id IN :ids`.
    Param(String),
}

/// Predicate node.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare {
        left: Expr,
        op: CmpOp,
        right: Expr,
    },
    IsNull {
        expr: Expr,
        negated: bool,
    },
    In {
        expr: Expr,
        rhs: InRhs,
        negated: bool,
    },
    Exists {
        subquery: Box<QueryModel>,
        negated: bool,
    },
    Between {
        expr: Expr,
        low: Expr,
        high: Expr,
        negated: bool,
    },
}

impl Predicate {
    pub fn compare(left: impl Into<Expr>, op: CmpOp, right: impl Into<Expr>) -> Self {
        Predicate::Compare {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    /// Compare two expressions given as text, e.g. `("t.level", Lt, "2")`.
    pub fn expr(left: &str, op: CmpOp, right: &str) -> QueryResult<Self> {
        Ok(Predicate::Compare {
            left: parse_expr(left)?,
            op,
            right: parse_expr(right)?,
        })
    }

    /// Compare an expression with a bound value.
    pub fn value(left: &str, op: CmpOp, value: impl Into<Value>) -> QueryResult<Self> {
        Ok(Predicate::Compare {
            left: parse_expr(left)?,
            op,
            right: Expr::value(value),
        })
    }

    pub fn eq(left: &str, value: impl Into<Value>) -> QueryResult<Self> {
        Self::value(left, CmpOp::Eq, value)
    }

    pub fn is_null(expr: &str) -> QueryResult<Self> {
        Ok(Predicate::IsNull {
            expr: parse_expr(expr)?,
            negated: false,
        })
    }

    pub fn is_not_null(expr: &str) -> QueryResult<Self> {
        Ok(Predicate::IsNull {
            expr: parse_expr(expr)?,
            negated: true,
        })
    }

    /// `expr IN (v1, v2, ...)`.
    pub fn in_values<V: Into<Value>>(
        expr: &str,
        values: impl IntoIterator<Item = V>,
    ) -> QueryResult<Self> {
        Ok(Predicate::In {
            expr: parse_expr(expr)?,
            rhs: InRhs::List(values.into_iter().map(Expr::value).collect()),
            negated: false,
        })
    }

    pub fn in_param(expr: &str, name: impl Into<String>) -> QueryResult<Self> {
        Ok(Predicate::In {
            expr: parse_expr(expr)?,
            rhs: InRhs::Param(name.into()),
            negated: false,
        })
    }

    pub fn in_subquery(expr: &str, subquery: QueryModel) -> QueryResult<Self> {
        Ok(Predicate::In {
            expr: parse_expr(expr)?,
            rhs: InRhs::Subquery(Box::new(subquery)),
            negated: false,
        })
    }

    pub fn exists(subquery: QueryModel) -> Self {
        Predicate::Exists {
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn between(expr: &str, low: impl Into<Value>, high: impl Into<Value>) -> QueryResult<Self> {
        Ok(Predicate::Between {
            expr: parse_expr(expr)?,
            low: Expr::value(low),
            high: Expr::value(high),
            negated: false,
        })
    }

    /// Conjunction; nested ANDs are flattened.
    pub fn and(self, other: Predicate) -> Predicate {
        let mut items = match self {
            Predicate::And(items) => items,
            p => vec![p],
        };
        match other {
            Predicate::And(more) => items.extend(more),
            p => items.push(p),
        }
        Predicate::And(items)
    }

    /// Disjunction; nested ORs are flattened.
    pub fn or(self, other: Predicate) -> Predicate {
        let mut items = match self {
            Predicate::Or(items) => items,
            p => vec![p],
        };
        match other {
            Predicate::Or(more) => items.extend(more),
            p => items.push(p),
        }
        Predicate::Or(items)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// Rewrite every expression of this tree (subquery models excluded).
    pub fn map_exprs<F>(self, f: &mut F) -> QueryResult<Predicate>
    where
        F: FnMut(Expr) -> QueryResult<Expr>,
    {
        Ok(match self {
            Predicate::And(items) => Predicate::And(
                items
                    .into_iter()
                    .map(|p| p.map_exprs(f))
                    .collect::<QueryResult<Vec<_>>>()?,
            ),
            Predicate::Or(items) => Predicate::Or(
                items
                    .into_iter()
                    .map(|p| p.map_exprs(f))
                    .collect::<QueryResult<Vec<_>>>()?,
            ),
            Predicate::Not(inner) => Predicate::Not(Box::new(inner.map_exprs(f)?)),
            Predicate::Compare { left, op, right } => Predicate::Compare {
                left: f(left)?,
                op,
                right: f(right)?,
            },
            Predicate::IsNull { expr, negated } => Predicate::IsNull {
                expr: f(expr)?,
                negated,
            },
            Predicate::In { expr, rhs, negated } => Predicate::In {
                expr: f(expr)?,
                rhs: match rhs {
                    InRhs::List(items) => InRhs::List(
                        items
                            .into_iter()
                            .map(&mut *f)
                            .collect::<QueryResult<Vec<_>>>()?,
                    ),
                    other => other,
                },
                negated,
            },
            exists @ Predicate::Exists { .. } => exists,
            Predicate::Between {
                expr,
                low,
                high,
                negated,
            } => Predicate::Between {
                expr: f(expr)?,
                low: f(low)?,
                high: f(high)?,
                negated,
            },
        })
    }

    /// Visit every expression of this tree (subquery models excluded).
    pub fn for_each_expr(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Predicate::And(items) | Predicate::Or(items) => {
                items.iter().for_each(|p| p.for_each_expr(f))
            }
            Predicate::Not(inner) => inner.for_each_expr(f),
            Predicate::Compare { left, right, .. } => {
                f(left);
                f(right);
            }
            Predicate::IsNull { expr, .. } => f(expr),
            Predicate::In { expr, rhs, .. } => {
                f(expr);
                if let InRhs::List(items) = rhs {
                    items.iter().for_each(|e| f(e));
                }
            }
            Predicate::Exists { .. } => {}
            Predicate::Between {
                expr, low, high, ..
            } => {
                f(expr);
                f(low);
                f(high);
            }
        }
    }

    /// Names of `:named` parameters, including those inside subqueries.
    pub fn for_each_named_param(&self, f: &mut impl FnMut(&str)) {
        self.for_each_expr(&mut |e| e.for_each_named_param(f));
        self.for_each_subquery(&mut |m| m.for_each_named_param(f));
        self.for_each_in_param(f);
    }

    fn for_each_in_param(&self, f: &mut impl FnMut(&str)) {
        match self {
            Predicate::In {
                rhs: InRhs::Param(name),
                ..
            } => f(name),
            Predicate::And(items) | Predicate::Or(items) => {
                items.iter().for_each(|p| p.for_each_in_param(f))
            }
            Predicate::Not(inner) => inner.for_each_in_param(f),
            _ => {}
        }
    }

    /// Visit subquery models directly owned by this tree.
    pub fn for_each_subquery(&self, f: &mut impl FnMut(&QueryModel)) {
        match self {
            Predicate::And(items) | Predicate::Or(items) => {
                items.iter().for_each(|p| p.for_each_subquery(f))
            }
            Predicate::Not(inner) => inner.for_each_subquery(f),
            Predicate::In {
                rhs: InRhs::Subquery(model),
                ..
            } => f(model),
            Predicate::Exists { subquery, .. } => f(subquery),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_flattens_instead_of_nesting() {
        let a = Predicate::is_null("e.parent").unwrap();
        let b = Predicate::expr("t.level", CmpOp::Lt, "2").unwrap();
        let c = Predicate::eq("e.name", "root").unwrap();
        let combined = a.clone().and(b.clone()).and(c.clone());
        assert_eq!(combined, Predicate::And(vec![a, b, c]));
    }

    #[test]
    fn double_negation_cancels() {
        let p = Predicate::is_null("e.parent").unwrap();
        assert_eq!(p.clone().not().not(), p);
    }

    #[test]
    fn named_params_are_collected_once_per_reference() {
        let p = Predicate::in_param("r.id", "ids")
            .unwrap()
            .and(Predicate::expr("r.name", CmpOp::Eq, ":name").unwrap());
        let mut names = Vec::new();
        p.for_each_named_param(&mut |n| names.push(n.to_string()));
        names.sort();
        assert_eq!(names, vec!["ids", "name"]);
    }
}
