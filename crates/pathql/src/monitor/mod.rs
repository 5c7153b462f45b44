//! Execution logging.
//!
//! [`TracingProvider`] wraps any [`ExecutionProvider`](crate::client::ExecutionProvider)
//! and emits a `tracing` event with the statement text before every call,
//! followed by a completion event carrying the elapsed time.
//!
//! # Example
//!
//! ```rust,ignore
//! use pathql::monitor::TracingProvider;
//! use std::time::Duration;
//!
//! let provider = TracingProvider::new(my_provider)
//!     .level(tracing::Level::INFO)
//!     .max_sql_length(500)
//!     .slow_query_threshold(Duration::from_millis(250));
//! ```

mod tracing_provider;


pub use tracing_provider::TracingProvider;

/// Longest prefix of `sql` that fits in `max_bytes` and ends on a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
