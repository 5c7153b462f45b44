//! # pathql
//!
//! An object-graph query model that renders to the SQL of several dialects.
//!
//! ## Features
//!
//! - **Path expressions**: `d.owner.name` joins implicitly; `d.owner.id` does not
//! - **CTEs**: plain, recursive (`UNION ALL`) and returning (INSERT/UPDATE/DELETE)
//! - **Pagination**: count, id and object queries that never split an entity
//!   across pages
//! - **Dialects**: capability descriptors drive NULL ordering, VALUES
//!   emulation, row windows, placeholders and RETURNING emulation
//! - **No driver**: rendered statements are handed to an [`ExecutionProvider`]
//!
//! ## Example
//!
//! ```ignore
//! use pathql::prelude::*;
//!
//! let meta = StaticMetamodel::builder()
//!     .entity("Person", "id", |t| {
//!         t.basic("name").optional("age").one_to_many("documents", "Document")
//!     })
//!     .entity("Document", "id", |t| t.basic("name").many_to_one("owner", "Person"))
//!     .build();
//! let factory = CriteriaBuilderFactory::new(meta, DialectCapabilities::postgres());
//!
//! let documents = factory
//!     .create("Document", "d")?
//!     .where_eq("d.owner.name", "alice")?
//!     .order_by_asc("d.name")?
//!     .result_list::<Row>(&provider)
//!     .await?;
//!
//! let page = factory
//!     .create("Person", "p")?
//!     .left_join("p.documents", "d")?
//!     .page(0, 20)?
//!     .result_list::<Row>(&provider)
//!     .await?;
//! ```

pub mod bind;
pub mod builder;
pub mod client;
pub mod config;
pub mod cte;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod function;
pub mod metamodel;
pub mod model;
pub mod monitor;
pub mod pagination;
pub mod predicate;
pub mod prelude;
pub mod render;
pub mod row;
pub mod value;

pub use bind::{BoundParameters, bind};
pub use builder::{
    BindBuilder, CriteriaBuilder, CriteriaBuilderFactory, DeleteCriteriaBuilder, EngineContext,
    InsertCriteriaBuilder, PaginatedCriteriaBuilder, QueryBuilder, SelectBuilder,
    StatementBuilder, SubqueryBuilder, UpdateCriteriaBuilder, WithCtes,
};
pub use client::{ExecutionProvider, ExecutionRequest, ResultShape, ReturningResult};
pub use config::EngineConfig;
pub use dialect::{DialectCapabilities, LimitStyle, NullOrdering, ParamStyle, RecursiveKeyword, ValuesClauseStyle};
pub use error::{QueryError, QueryResult};
pub use expr::Expr;
pub use function::{FunctionRegistry, FunctionRenderer};
pub use metamodel::{EntityMetadataProvider, StaticMetamodel};
pub use model::{JoinKind, QueryModel, StatementKind, ValuesSource, Window};
pub use monitor::TracingProvider;
pub use pagination::{PagedList, PaginationSpec};
pub use predicate::{CmpOp, Predicate};
pub use render::{RenderedQuery, render, render_returning};
pub use row::{FromRow, Row};
pub use value::{FromValue, Value};
