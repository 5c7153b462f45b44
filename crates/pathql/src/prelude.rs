//! Convenient imports for typical `pathql` usage.
//!
//! ```ignore
//! use pathql::prelude::*;
//! ```

pub use crate::{
    BindBuilder, CmpOp, CriteriaBuilderFactory, DialectCapabilities, ExecutionProvider, FromRow,
    JoinKind, Predicate, QueryBuilder, QueryError, QueryResult, Row, SelectBuilder,
    StaticMetamodel, StatementBuilder, Value, ValuesSource, WithCtes,
};
