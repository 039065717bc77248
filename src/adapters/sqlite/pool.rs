use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::types::error::Result;

use super::schema;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Open (or create) the database at `db_path` and initialize the schema.
pub fn create_pool(db_path: &Path) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path);

    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;",
    )?;
    drop(conn);

    schema::init_schema(&pool)?;

    Ok(pool)
}

/// In-memory database for tests. Pool size is pinned to one connection so
/// every caller sees the same in-memory database.
pub fn in_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    drop(conn);

    schema::init_schema(&pool)?;

    Ok(pool)
}
