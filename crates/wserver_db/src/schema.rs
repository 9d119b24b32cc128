//! GDB schema creation.
//!
//! All CREATE TABLE statements live here.

use crate::error::Result;
use crate::Gdb;
use tracing::info;

const TABLES: &[&str] = &[
    // Reference data propagated to core nodes
    r#"CREATE TABLE IF NOT EXISTS auto (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        car_number TEXT NOT NULL UNIQUE,
        id_type TEXT,
        rg_weight INTEGER,
        auto_model INTEGER,
        polygon INTEGER,
        rfid_id INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS companies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        inn TEXT,
        kpp TEXT,
        ex_id TEXT,
        polygon INTEGER,
        status INTEGER NOT NULL DEFAULT 1,
        active INTEGER NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS trash_cats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        polygon INTEGER,
        active INTEGER NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS trash_types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        category INTEGER,
        polygon INTEGER,
        active INTEGER NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS operators (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        full_name TEXT NOT NULL,
        username TEXT NOT NULL,
        password TEXT NOT NULL,
        polygon INTEGER,
        active INTEGER NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS rfid_marks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        rfid TEXT NOT NULL UNIQUE,
        owner_id INTEGER,
        rfid_type INTEGER
    )"#,
    // Weighing acts and their attachments
    r#"CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        car INTEGER NOT NULL,
        brutto INTEGER NOT NULL,
        tara INTEGER NOT NULL,
        cargo INTEGER NOT NULL,
        time_in TEXT NOT NULL,
        time_out TEXT NOT NULL,
        carrier INTEGER,
        trash_cat INTEGER,
        trash_type INTEGER,
        polygon INTEGER,
        operator INTEGER,
        ex_id INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS act_photos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record INTEGER NOT NULL,
        photo_path TEXT NOT NULL,
        photo_type INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS operator_notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record INTEGER NOT NULL,
        note TEXT NOT NULL,
        type INTEGER
    )"#,
    // Directory: polygon accounts and their broadcast roles
    r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        last_ip TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS duo_polygons (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        polygon INTEGER NOT NULL,
        duo_role INTEGER NOT NULL
    )"#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_duo_polygons_role ON duo_polygons(duo_role)",
    "CREATE INDEX IF NOT EXISTS idx_act_photos_record ON act_photos(record)",
    "CREATE INDEX IF NOT EXISTS idx_operator_notes_record ON operator_notes(record)",
];

impl Gdb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        for statement in TABLES.iter().chain(INDEXES) {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!(tables = TABLES.len(), "GDB schema verified");
        Ok(())
    }
}
