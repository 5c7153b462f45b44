//! Parameter binding.
//!
//! Turns the slots of a [`RenderedQuery`] into the values an execution
//! provider sends to the database.

use std::collections::BTreeMap;

use crate::dialect::ParamStyle;
use crate::error::{QueryError, QueryResult};
use crate::render::{ParamSlot, RenderedQuery};
use crate::value::Value;

/// Bound values in the shape the placeholder style expects.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundParameters {
    /// One value per `?`, in text order.
    Positional(Vec<Value>),
    /// One entry per distinct `:name`, in first-use order.
    Named(Vec<(String, Value)>),
}

impl BoundParameters {
    pub fn len(&self) -> usize {
        match self {
            BoundParameters::Positional(values) => values.len(),
            BoundParameters::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value bound to `name` (named style only).
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            BoundParameters::Named(values) => values.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            BoundParameters::Positional(_) => None,
        }
    }
}

/// Resolve every slot of `rendered` against `parameters`.
///
/// A named slot without a value fails with [`QueryError::UnboundParameter`].
pub fn bind(rendered: &RenderedQuery, parameters: &BTreeMap<String, Value>) -> QueryResult<BoundParameters> {
    let lookup = |name: &str| {
        parameters
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::UnboundParameter(name.to_string()))
    };

    match rendered.param_style {
        ParamStyle::Positional => rendered
            .slots
            .iter()
            .map(|slot| match slot {
                ParamSlot::Named(name) => lookup(name),
                ParamSlot::Anonymous { value, .. } => Ok(value.clone()),
            })
            .collect::<QueryResult<Vec<_>>>()
            .map(BoundParameters::Positional),
        ParamStyle::Named => {
            let mut bound: Vec<(String, Value)> = Vec::new();
            for slot in &rendered.slots {
                let (name, value) = match slot {
                    ParamSlot::Named(name) => (name, lookup(name)?),
                    ParamSlot::Anonymous { name, value } => (name, value.clone()),
                };
                if !bound.iter().any(|(n, _)| n == name) {
                    bound.push((name.clone(), value));
                }
            }
            Ok(BoundParameters::Named(bound))
        }
    }
}
