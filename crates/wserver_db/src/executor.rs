//! Single-statement execution with outcome capture.

use crate::error::Result;
use crate::value::{bind_all, DbValue};
use crate::Gdb;
use sqlx::sqlite::SqliteRow;
use tracing::{debug, warn};
use wserver_protocol::{RecordId, WriteOutcome};

impl Gdb {
    /// Run one mutating statement and capture what happened.
    ///
    /// Never fails: a rejected statement becomes [`WriteOutcome::Failure`]
    /// carrying the driver's message. On success the outcome carries the
    /// rowid generated by the insert.
    pub async fn try_execute(&self, command: &str, params: &[DbValue]) -> WriteOutcome {
        let query = bind_all(sqlx::query(command), params);
        match query.execute(&self.pool).await {
            Ok(done) => {
                let id = RecordId::new(done.last_insert_rowid());
                debug!(%id, rows = done.rows_affected(), "GDB command committed");
                WriteOutcome::Success(id)
            }
            Err(err) => {
                warn!(error = %err, command = %command.trim(), "GDB command failed");
                WriteOutcome::Failure(err.to_string())
            }
        }
    }

    /// Run one read statement and return every row.
    pub async fn try_execute_get(&self, command: &str, params: &[DbValue]) -> Result<Vec<SqliteRow>> {
        let query = bind_all(sqlx::query(command), params);
        Ok(query.fetch_all(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_insert_returns_generated_id() {
        let gdb = Gdb::open_memory().await.unwrap();

        let first = gdb
            .try_execute(
                "INSERT INTO trash_cats (name, polygon, active) VALUES (?, ?, ?)",
                &["Plastic".into(), DbValue::Null, true.into()],
            )
            .await;
        let second = gdb
            .try_execute(
                "INSERT INTO trash_cats (name, polygon, active) VALUES (?, ?, ?)",
                &["Glass".into(), 9i64.into(), true.into()],
            )
            .await;

        assert_eq!(first, WriteOutcome::Success(RecordId::new(1)));
        assert_eq!(second, WriteOutcome::Success(RecordId::new(2)));
    }

    #[tokio::test]
    async fn test_failure_is_captured_not_raised() {
        let gdb = Gdb::open_memory().await.unwrap();

        let outcome = gdb
            .try_execute("INSERT INTO no_such_table (x) VALUES (?)", &[1i64.into()])
            .await;

        match outcome {
            WriteOutcome::Failure(cause) => assert!(cause.contains("no_such_table")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_values_are_bound_verbatim() {
        let gdb = Gdb::open_memory().await.unwrap();
        let hostile = "x'); DROP TABLE trash_cats; --";

        let outcome = gdb
            .try_execute(
                "INSERT INTO trash_cats (name, active) VALUES (?, ?)",
                &[hostile.into(), true.into()],
            )
            .await;
        assert!(outcome.is_success());

        let rows = gdb
            .try_execute_get("SELECT name FROM trash_cats", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String, _>("name"), hostile);
    }
}
