//! Expression model.
//!
//! Expressions are plain data: a path into the object graph, a literal, a
//! parameter, a function call, arithmetic, or a subquery. Builders parse
//! caller text into [`Expr`] with every path unresolved; the owning
//! [`QueryModel`](crate::model::QueryModel) then rewrites each path to point at
//! a join node. All rewriting goes through the transformation functions in
//! this module.

mod parser;

pub use parser::parse_expr;

use std::fmt;

use crate::error::QueryResult;
use crate::model::{NodeId, QueryModel};
use crate::value::Value;

/// Where a path starts.
#[derive(Debug, Clone, PartialEq)]
pub enum PathRoot {
    /// Freshly parsed; the first segment is an alias or an attribute name.
    Unresolved,
    /// A FROM root or join node of the owning model.
    Node(NodeId),
    /// An alias of an enclosing query (correlated subquery).
    Outer(String),
}

/// A dotted path such as `e.parent.id`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub root: PathRoot,
    /// Remaining attribute segments after the root.
    pub segments: Vec<String>,
}

impl PathExpr {
    pub fn unresolved(text: &str) -> Self {
        Self {
            root: PathRoot::Unresolved,
            segments: text.split('.').map(str::to_string).collect(),
        }
    }

    pub fn node(node: NodeId, segments: Vec<String>) -> Self {
        Self {
            root: PathRoot::Node(node),
            segments,
        }
    }

    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }
}

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Parameter reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// `:name`, value supplied through the model's parameter map.
    Named(String),
    /// Anonymous value captured at build time.
    Value(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }

    pub(crate) fn precedence(self) -> u8 {
        match self {
            ArithOp::Add | ArithOp::Sub => 1,
            ArithOp::Mul | ArithOp::Div => 2,
        }
    }
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(PathExpr),
    Literal(Literal),
    Param(Param),
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    Arithmetic {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Subquery(Box<QueryModel>),
}

impl Expr {
    /// Parse expression text. Equivalent to [`parse_expr`].
    pub fn parse(input: &str) -> QueryResult<Self> {
        parse_expr(input)
    }

    pub fn path(text: &str) -> Self {
        Expr::Path(PathExpr::unresolved(text))
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Param(Param::Value(value.into()))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Expr::Param(Param::Named(name.into()))
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
            distinct: false,
        }
    }

    pub fn as_path(&self) -> Option<&PathExpr> {
        match self {
            Expr::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Rewrite every path, bottom-up. Subqueries are left alone; they were
    /// resolved against their own scope when they were built.
    pub fn map_paths<F>(self, f: &mut F) -> QueryResult<Expr>
    where
        F: FnMut(PathExpr) -> QueryResult<Expr>,
    {
        Ok(match self {
            Expr::Path(p) => f(p)?,
            Expr::Function {
                name,
                args,
                distinct,
            } => Expr::Function {
                name,
                args: args
                    .into_iter()
                    .map(|a| a.map_paths(f))
                    .collect::<QueryResult<Vec<_>>>()?,
                distinct,
            },
            Expr::Arithmetic { op, left, right } => Expr::Arithmetic {
                op,
                left: Box::new(left.map_paths(f)?),
                right: Box::new(right.map_paths(f)?),
            },
            other => other,
        })
    }

    /// Visit every path without descending into subqueries.
    pub fn for_each_path(&self, f: &mut impl FnMut(&PathExpr)) {
        match self {
            Expr::Path(p) => f(p),
            Expr::Function { args, .. } => args.iter().for_each(|a| a.for_each_path(f)),
            Expr::Arithmetic { left, right, .. } => {
                left.for_each_path(f);
                right.for_each_path(f);
            }
            Expr::Literal(_) | Expr::Param(_) | Expr::Subquery(_) => {}
        }
    }

    /// Names of all `:named` parameters, subqueries included.
    pub fn for_each_named_param(&self, f: &mut impl FnMut(&str)) {
        match self {
            Expr::Param(Param::Named(name)) => f(name),
            Expr::Function { args, .. } => args.iter().for_each(|a| a.for_each_named_param(f)),
            Expr::Arithmetic { left, right, .. } => {
                left.for_each_named_param(f);
                right.for_each_named_param(f);
            }
            Expr::Subquery(model) => model.for_each_named_param(f),
            Expr::Literal(_) | Expr::Param(_) | Expr::Path(_) => {}
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("NULL"),
            Literal::Bool(true) => f.write_str("TRUE"),
            Literal::Bool(false) => f.write_str("FALSE"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::path(s)
    }
}

impl From<Literal> for Expr {
    fn from(l: Literal) -> Self {
        Expr::Literal(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_paths_rewrites_nested_arguments() {
        let expr = parse_expr("CONCAT(p.name, p.age + 1)").unwrap();
        let mut seen = Vec::new();
        let mapped = expr
            .map_paths(&mut |p| {
                seen.push(p.segments.join("."));
                Ok(Expr::Literal(Literal::Int(0)))
            })
            .unwrap();
        assert_eq!(seen, vec!["p.name", "p.age"]);
        let mut count = 0;
        mapped.for_each_path(&mut |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn text_literals_escape_quotes() {
        assert_eq!(Literal::Text("it's".into()).to_string(), "'it''s'");
        assert_eq!(Literal::Float(1.5).to_string(), "1.5");
    }
}
