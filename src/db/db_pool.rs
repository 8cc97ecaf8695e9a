use duckdb::{AccessMode, Config, Connection};
use r2d2::{ManageConnection, Pool};
use std::sync::Mutex;
use tracing::debug;

pub type DuckPool = Pool<DuckDBConnectionManager>;

/// Hands out clones of one open database so every pooled connection shares
/// the same DuckDB instance (and its write lock).
pub struct DuckDBConnectionManager {
    connection_string: String,
    base: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: String) -> Result<Self, duckdb::Error> {
        let base = Connection::open(&connection_string)?;
        Ok(Self {
            connection_string,
            base: Mutex::new(base),
        })
    }

    /// Connections refuse writes; used for model-generated SQL.
    pub fn read_only(connection_string: String) -> Result<Self, duckdb::Error> {
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let base = Connection::open_with_flags(&connection_string, config)?;
        Ok(Self {
            connection_string,
            base: Mutex::new(base),
        })
    }

    pub fn into_pool(self, max_size: u32) -> Result<DuckPool, r2d2::Error> {
        Pool::builder().max_size(max_size.max(1)).build(self)
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        debug!("Opening pooled connection to {}", self.connection_string);
        let base = self
            .base
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        base.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
