//! Query parameter values.
//!
//! Every statement GDB runs takes its values through [`DbValue`], so nothing a
//! client sends is ever spliced into SQL text.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

/// Value type for query parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Text(String),
    Boolean(bool),
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Integer(v as i64)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Integer(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<&String> for DbValue {
    fn from(v: &String) -> Self {
        DbValue::Text(v.clone())
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Boolean(v)
    }
}

impl From<wserver_protocol::RecordId> for DbValue {
    fn from(v: wserver_protocol::RecordId) -> Self {
        DbValue::Integer(v.get())
    }
}

impl From<wserver_protocol::PolygonId> for DbValue {
    fn from(v: wserver_protocol::PolygonId) -> Self {
        DbValue::Integer(v.get())
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DbValue::Null,
        }
    }
}

/// Attach `params` to `query` in order.
pub(crate) fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[DbValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            DbValue::Null => query.bind(None::<i64>),
            DbValue::Integer(v) => query.bind(*v),
            DbValue::Text(v) => query.bind(v.clone()),
            DbValue::Boolean(v) => query.bind(*v),
        };
    }
    query
}
