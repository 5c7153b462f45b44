//! Result rows and row mapping traits

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{QueryError, QueryResult};
use crate::value::{FromValue, Value};

/// A result row: column labels plus one value per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> QueryResult<Self> {
        if columns.len() != values.len() {
            return Err(QueryError::validation(format!(
                "row has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<C, V>(pairs: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: Into<String>,
        V: Into<Value>,
    {
        let (columns, values) = pairs.into_iter().map(|(c, v)| (c.into(), v.into())).unzip();
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Raw value of a column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Typed value of a column, returning `QueryError::Decode` on failure.
    pub fn try_get<T: FromValue>(&self, column: &str) -> QueryResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| QueryError::decode(column, "no such column"))?;
        T::from_value(value).ok_or_else(|| {
            QueryError::decode(
                column,
                format!("cannot convert {} to {}", value.kind(), std::any::type_name::<T>()),
            )
        })
    }

    /// Typed value by position.
    pub fn try_get_at<T: FromValue>(&self, index: usize) -> QueryResult<T> {
        let column = self
            .columns
            .get(index)
            .map(String::as_str)
            .unwrap_or("<out of range>");
        let value = self
            .values
            .get(index)
            .ok_or_else(|| QueryError::decode(column, format!("no column at index {index}")))?;
        T::from_value(value).ok_or_else(|| {
            QueryError::decode(
                column,
                format!("cannot convert {} to {}", value.kind(), std::any::type_name::<T>()),
            )
        })
    }
}

/// Trait for types that can be built from a result row
pub trait FromRow: Sized {
    /// Convert a result row into Self
    fn from_row(row: &Row) -> QueryResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> QueryResult<Self> {
        Ok(row.clone())
    }
}

// Scalar results (counts, id lists) read the first column.
macro_rules! impl_from_row_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRow for $ty {
                fn from_row(row: &Row) -> QueryResult<Self> {
                    row.try_get_at(0)
                }
            }
        )*
    };
}

impl_from_row_scalar!(Value, i64, i32, f64, bool, String, Uuid, DateTime<Utc>);

impl<T: FromValue> FromRow for Option<T> {
    fn from_row(row: &Row) -> QueryResult<Self> {
        row.try_get_at(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access_by_name_and_position() {
        let row = Row::from_pairs([("id", Value::Int(3)), ("name", Value::from("child"))]);
        assert_eq!(row.try_get::<i64>("id").unwrap(), 3);
        assert_eq!(row.try_get::<String>("name").unwrap(), "child");
        assert_eq!(i64::from_row(&row).unwrap(), 3);
    }

    #[test]
    fn conversion_failures_name_the_column() {
        let row = Row::from_pairs([("name", "child")]);
        match row.try_get::<i64>("name").unwrap_err() {
            QueryError::Decode { column, .. } => assert_eq!(column, "name"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(row.try_get::<i64>("missing").is_err());
        assert!(Row::new(vec!["a".into()], vec![]).is_err());
    }
}
