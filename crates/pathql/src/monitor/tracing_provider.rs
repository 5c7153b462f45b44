use std::time::{Duration, Instant};

use tracing::Level;

use super::truncate_sql_bytes;
use crate::client::{ExecutionProvider, ExecutionRequest};
use crate::config::SqlLogConfig;
use crate::error::QueryResult;
use crate::row::Row;

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

/// An [`ExecutionProvider`] that logs every statement it forwards.
#[derive(Debug, Clone)]
pub struct TracingProvider<P> {
    inner: P,
    /// Tracing event level to emit at.
    level: Level,
    /// Truncate long statements (in bytes). `None` means no truncation.
    max_sql_length: Option<usize>,
    /// Calls slower than this are reported at WARN.
    slow_query_threshold: Option<Duration>,
}

impl<P> TracingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            level: Level::DEBUG,
            max_sql_length: Some(200),
            slow_query_threshold: None,
        }
    }

    /// Build from the `[sql_log]` section of an engine config.
    pub fn from_config(inner: P, config: &SqlLogConfig) -> QueryResult<Self> {
        Ok(Self {
            inner,
            level: config.level()?,
            max_sql_length: config.max_sql_length,
            slow_query_threshold: config.slow_query_ms.map(Duration::from_millis),
        })
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum statement length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }

    fn before(&self, request: &ExecutionRequest) {
        let sql = self.truncate_sql(&request.text);
        emit_at_level!(
            self.level,
            target: "pathql.sql",
            statement = request.statement.name(),
            shape = ?request.shape,
            param_count = request.params.len(),
            sql = %sql,
        );
    }

    fn after(&self, request: &ExecutionRequest, elapsed: Duration, outcome: Result<u64, &crate::error::QueryError>) {
        let statement = request.statement.name();
        match outcome {
            Ok(rows) => {
                if self.slow_query_threshold.is_some_and(|t| elapsed >= t) {
                    tracing::warn!(
                        target: "pathql.sql",
                        statement,
                        rows,
                        elapsed_ms = elapsed.as_millis() as u64,
                        sql = %self.truncate_sql(&request.text),
                        "slow query"
                    );
                } else {
                    emit_at_level!(
                        self.level,
                        target: "pathql.sql",
                        statement,
                        rows,
                        elapsed_us = elapsed.as_micros() as u64,
                        "query completed"
                    );
                }
            }
            Err(err) => tracing::warn!(
                target: "pathql.sql",
                statement,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %err,
                "query failed"
            ),
        }
    }
}

impl<P: ExecutionProvider> ExecutionProvider for TracingProvider<P> {
    fn query(
        &self,
        request: &ExecutionRequest,
    ) -> impl std::future::Future<Output = QueryResult<Vec<Row>>> + Send {
        async move {
            self.before(request);
            let start = Instant::now();
            let result = self.inner.query(request).await;
            self.after(
                request,
                start.elapsed(),
                result.as_ref().map(|rows| rows.len() as u64),
            );
            result
        }
    }

    fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> impl std::future::Future<Output = QueryResult<u64>> + Send {
        async move {
            self.before(request);
            let start = Instant::now();
            let result = self.inner.execute(request).await;
            self.after(request, start.elapsed(), result.as_ref().copied());
            result
        }
    }
}
