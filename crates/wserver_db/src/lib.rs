//! GDB (global database) access for WServer.
//!
//! Every read and write the server performs goes through [`Gdb`]. Statements
//! are always parameterized; table and column names only ever come from the
//! closed enums in this crate ([`Table`], [`AddressColumn`]).
//!
//! # Usage
//!
//! ```rust,ignore
//! use wserver_db::{Gdb, NewTrashCat};
//!
//! let gdb = Gdb::connect("sqlite:gdb.sqlite3?mode=rwc").await?;
//! let outcome = gdb.set_trash_cat(&NewTrashCat { name: "Plastic".into(), polygon: None, active: true }).await;
//! ```

mod directory;
mod error;
mod executor;
mod records;
mod schema;
mod value;

pub use directory::AddressColumn;
pub use error::{DbError, Result};
pub use records::{
    normalize_act_time, NewAct, NewAuto, NewCompany, NewNote, NewOperator, NewRfid, NewTrashCat,
    NewTrashType, Table,
};
pub use value::DbValue;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

/// Handle to GDB. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Gdb {
    pool: SqlitePool,
}

impl Gdb {
    /// Connect to the database at `url` and create all tables if absent.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(url = %url, "GDB opened");

        Ok(db)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same memory store.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Get the underlying connection pool.
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_creates_database_file() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("gdb.sqlite3");
        let url = format!("sqlite:{}?mode=rwc", db_path.display());

        let gdb = Gdb::connect(&url).await.unwrap();
        assert!(db_path.exists());

        gdb.close().await;
    }

    #[tokio::test]
    async fn test_connect_is_repeatable_on_existing_schema() {
        let tmp = TempDir::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", tmp.path().join("gdb.sqlite3").display());

        Gdb::connect(&url).await.unwrap().close().await;
        let gdb = Gdb::connect(&url).await.unwrap();
        gdb.close().await;
    }
}
