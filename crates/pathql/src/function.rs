//! Function rendering registry.
//!
//! A [`FunctionRegistry`] belongs to one factory and is handed to the renderer
//! explicitly. Functions without a registered renderer are emitted verbatim as
//! `NAME(arg1,arg2)`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dialect::DialectCapabilities;
use crate::error::{QueryError, QueryResult};

/// Name of the counting function used by pagination count queries.
pub const COUNT_TUPLE: &str = "COUNT_TUPLE";

/// A function invocation with already-rendered arguments.
#[derive(Debug, Clone, Copy)]
pub struct FunctionCall<'a> {
    pub name: &'a str,
    pub args: &'a [String],
    pub distinct: bool,
}

/// Renders a function invocation to text.
pub trait FunctionRenderer: Send + Sync {
    fn render(&self, call: &FunctionCall<'_>) -> QueryResult<String>;
}

/// `COUNT_TUPLE` for dialects with row-value support.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountTupleFunction;

impl FunctionRenderer for CountTupleFunction {
    fn render(&self, call: &FunctionCall<'_>) -> QueryResult<String> {
        match call.args {
            [] => Err(QueryError::validation("COUNT_TUPLE needs at least one argument")),
            [single] if call.distinct => Ok(format!("COUNT(DISTINCT {single})")),
            [single] => Ok(format!("COUNT({single})")),
            many if call.distinct => Ok(format!("COUNT(DISTINCT ({}))", many.join(", "))),
            many => Ok(format!(
                "COUNT(CASE WHEN {} THEN NULL ELSE 1 END)",
                many.iter()
                    .map(|a| format!("{a} IS NULL"))
                    .collect::<Vec<_>>()
                    .join(" OR ")
            )),
        }
    }
}

/// `COUNT_TUPLE` for MySQL, which counts distinct tuples without row values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlCountTupleFunction;

impl FunctionRenderer for MySqlCountTupleFunction {
    fn render(&self, call: &FunctionCall<'_>) -> QueryResult<String> {
        let mut out = String::from("count(");
        if call.distinct {
            out.push_str("distinct ");
        }
        match call.args {
            [] => return Err(QueryError::validation("COUNT_TUPLE needs at least one argument")),
            [single] => out.push_str(single),
            many if call.distinct => out.push_str(&many.join(", ")),
            many => {
                out.push_str("case when ");
                out.push_str(
                    &many
                        .iter()
                        .map(|a| format!("{a} is null"))
                        .collect::<Vec<_>>()
                        .join(" or "),
                );
                out.push_str(" then null else 1 end");
            }
        }
        out.push(')');
        Ok(out)
    }
}

/// A function that expands to arbitrary text built from its arguments.
pub struct MacroFunction<F> {
    expand: F,
}

impl<F> MacroFunction<F>
where
    F: Fn(&[String]) -> QueryResult<String> + Send + Sync,
{
    pub fn new(expand: F) -> Self {
        Self { expand }
    }
}

impl<F> FunctionRenderer for MacroFunction<F>
where
    F: Fn(&[String]) -> QueryResult<String> + Send + Sync,
{
    fn render(&self, call: &FunctionCall<'_>) -> QueryResult<String> {
        (self.expand)(call.args)
    }
}

/// Registry of function renderers keyed by case-insensitive name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn FunctionRenderer>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in functions for a dialect.
    pub fn for_dialect(caps: &DialectCapabilities) -> Self {
        let mut registry = Self::new();
        if caps.name.eq_ignore_ascii_case("mysql") {
            registry.register(COUNT_TUPLE, MySqlCountTupleFunction);
        } else {
            registry.register(COUNT_TUPLE, CountTupleFunction);
        }
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        renderer: impl FunctionRenderer + 'static,
    ) -> &mut Self {
        self.functions
            .insert(name.to_ascii_lowercase(), Arc::new(renderer));
        self
    }

    /// Register a macro expanding to text.
    pub fn register_macro<F>(&mut self, name: &str, expand: F) -> &mut Self
    where
        F: Fn(&[String]) -> QueryResult<String> + Send + Sync + 'static,
    {
        self.register(name, MacroFunction::new(expand))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_lowercase())
    }

    /// Render an invocation, falling back to `NAME(args)`.
    pub fn render(&self, call: &FunctionCall<'_>) -> QueryResult<String> {
        match self.functions.get(&call.name.to_ascii_lowercase()) {
            Some(renderer) => renderer.render(call),
            None => Ok(format!(
                "{}({}{})",
                call.name,
                if call.distinct { "DISTINCT " } else { "" },
                call.args.join(",")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call<'a>(name: &'a str, args: &'a [String], distinct: bool) -> FunctionCall<'a> {
        FunctionCall {
            name,
            args,
            distinct,
        }
    }

    #[test]
    fn mysql_count_tuple_forms() {
        let f = MySqlCountTupleFunction;
        let two = vec!["a".to_string(), "b".to_string()];
        let one = vec!["a".to_string()];
        assert_eq!(f.render(&call("count_tuple", &two, true)).unwrap(), "count(distinct a, b)");
        assert_eq!(
            f.render(&call("count_tuple", &two, false)).unwrap(),
            "count(case when a is null or b is null then null else 1 end)"
        );
        assert_eq!(f.render(&call("count_tuple", &one, false)).unwrap(), "count(a)");
    }

    #[test]
    fn standard_count_tuple_forms() {
        let f = CountTupleFunction;
        let one = vec!["r.id".to_string()];
        assert_eq!(f.render(&call("COUNT_TUPLE", &one, false)).unwrap(), "COUNT(r.id)");
        assert_eq!(f.render(&call("COUNT_TUPLE", &one, true)).unwrap(), "COUNT(DISTINCT r.id)");
        assert!(f.render(&call("COUNT_TUPLE", &[], true)).is_err());
    }

    #[test]
    fn unregistered_functions_render_verbatim() {
        let registry = FunctionRegistry::for_dialect(&DialectCapabilities::postgres());
        let args = vec!["p.name".to_string(), "'s document'".to_string()];
        assert_eq!(
            registry.render(&call("CONCAT", &args, false)).unwrap(),
            "CONCAT(p.name,'s document')"
        );
    }

    #[test]
    fn macros_expand_arguments() {
        let mut registry = FunctionRegistry::new();
        registry.register_macro("view_root", |args| match args {
            [alias] => Ok(format!("{alias}.id")),
            _ => Err(QueryError::validation("VIEW_ROOT takes one argument")),
        });
        let args = vec!["d".to_string()];
        assert_eq!(registry.render(&call("VIEW_ROOT", &args, false)).unwrap(), "d.id");
        assert!(registry.contains("View_Root"));
    }
}
