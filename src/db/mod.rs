//! Database module for the SQLite-backed filled-order audit log

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use crate::error::{TradingError, TradingResult};

pub mod filled;

pub use filled::{AuditLog, FilledOrder, FilledOrderStore};

/// Shared SQLite connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file, creating parent directories
    pub fn new<P: AsRef<Path>>(path: P) -> TradingResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path.as_ref())
            .map_err(|e| TradingError::DatabaseConnection(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> TradingResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TradingError::DatabaseConnection(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> TradingResult<Self> {
        // WAL keeps report inserts from blocking the `report` command
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations to set up or update the schema
    pub fn run_migrations(&self) -> TradingResult<()> {
        let conn = self.conn.lock();
        let migration_sql = include_str!("migrations/V1__filled_orders.sql");
        conn.execute_batch(migration_sql)
            .map_err(|e| TradingError::DatabaseMigration(e.to_string()))
    }

    /// Get a reference to the connection (for custom queries)
    pub fn get_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Check database health
    pub fn health_check(&self) -> TradingResult<bool> {
        let conn = self.conn.lock();
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(result == 1)
    }
}
