//! Execution provider trait.
//!
//! The engine never talks to a database itself. Rendered and bound statements
//! are handed to an [`ExecutionProvider`], which returns rows or an update
//! count.

use crate::bind::BoundParameters;
use crate::error::{QueryError, QueryResult};
use crate::model::{StatementKind, Window};
use crate::render::RenderedQuery;
use crate::row::{FromRow, Row};

/// What the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Any number of rows.
    Rows,
    /// Exactly one row with one column (counts).
    Scalar,
    /// No rows, only the number of affected rows.
    UpdateCount,
    /// Rows produced by a RETURNING clause or its emulation.
    Returning,
}

/// A statement ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub text: String,
    pub params: BoundParameters,
    pub shape: ResultShape,
    pub statement: StatementKind,
    /// Window already rendered into `text`.
    pub window: Window,
}

impl ExecutionRequest {
    pub fn new(rendered: RenderedQuery, params: BoundParameters, shape: ResultShape) -> Self {
        Self {
            text: rendered.text,
            params,
            shape,
            statement: rendered.kind,
            window: rendered.window,
        }
    }
}

/// Runs statements against a database.
pub trait ExecutionProvider: Send + Sync {
    /// Run a statement and return all rows.
    fn query(
        &self,
        request: &ExecutionRequest,
    ) -> impl std::future::Future<Output = QueryResult<Vec<Row>>> + Send;

    /// Run a modification statement and return the number of affected rows.
    fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> impl std::future::Future<Output = QueryResult<u64>> + Send;

    /// Run a statement and require exactly one row.
    ///
    /// Semantics:
    /// - 0 rows: returns [`QueryError::NotFound`]
    /// - 1 row: returns that row
    /// - multiple rows: returns [`QueryError::TooManyRows`]
    fn query_one(
        &self,
        request: &ExecutionRequest,
    ) -> impl std::future::Future<Output = QueryResult<Row>> + Send {
        async move {
            let mut rows = self.query(request).await?;
            match rows.len() {
                1 => rows
                    .pop()
                    .ok_or_else(|| QueryError::not_found("Expected 1 row, got 0")),
                0 => Err(QueryError::not_found("Expected 1 row, got 0")),
                got => Err(QueryError::TooManyRows { expected: 1, got }),
            }
        }
    }

    /// Run a statement and map every row.
    fn query_as<T>(
        &self,
        request: &ExecutionRequest,
    ) -> impl std::future::Future<Output = QueryResult<Vec<T>>> + Send
    where
        T: FromRow + Send,
    {
        async move {
            self.query(request)
                .await?
                .iter()
                .map(T::from_row)
                .collect()
        }
    }
}

impl<P: ExecutionProvider> ExecutionProvider for &P {
    fn query(
        &self,
        request: &ExecutionRequest,
    ) -> impl std::future::Future<Output = QueryResult<Vec<Row>>> + Send {
        (**self).query(request)
    }

    fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> impl std::future::Future<Output = QueryResult<u64>> + Send {
        (**self).execute(request)
    }
}

/// Rows returned by a modification statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturningResult<T> {
    /// Number of affected rows; equal to `rows.len()`.
    pub update_count: u64,
    pub rows: Vec<T>,
}

impl<T> ReturningResult<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self {
            update_count: rows.len() as u64,
            rows,
        }
    }

    /// The last returned row.
    pub fn last(&self) -> Option<&T> {
        self.rows.last()
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }
}
