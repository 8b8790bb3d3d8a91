//! civicdb: cache-fronted persistence for civic registry services.
//!
//! - [`query`] turns entities deriving [`QueryEntity`] into `SELECT` and
//!   `UPDATE` statements with named parameters.
//! - [`repository`] reads through a Redis hash cache into Postgres and writes
//!   behind a topic publisher.
//! - [`lock`] takes all-or-nothing distributed locks over sets of record ids.

extern crate self as civicdb;

pub mod cache;
pub mod config;
pub mod errors;
pub mod id;
pub mod keys;
pub mod lock;
pub mod publish;
pub mod query;
pub mod repository;
pub mod runtime;
pub mod types;

pub use cache::{EntityCache, RedisHashCache};
pub use civicdb_macros::QueryEntity;
pub use config::Settings;
pub use errors::*;
pub use lock::{LockBackend, LockManager, LockSetKey, RedisLockBackend};
pub use publish::{RedisStreamPublisher, TopicPublisher};
pub use query::{BuiltQuery, NamedParams, QueryBuilder, SchemaResolver, SelectQueryBuilder, UpdateQueryBuilder};
pub use repository::{Enqueued, GenericRepository, RepositoryOptions, SearchPage, SearchResponse};
pub use runtime::{FromRowMapper, JsonRowMapper, PgExecutor, RowMapper, SqlExecutor};
pub use types::{FieldValue, QueryEntity, QueryField, SqlValue};

pub use redis;
pub use redis::aio::ConnectionManager;

/// Delete all keys matching a pattern.
///
/// SCAN + DEL in batches so Redis is never blocked on one large `KEYS`.
pub async fn cleanup_pattern(conn: &mut ConnectionManager, pattern: &str) -> Result<u64, RepoError> {
    const SCAN_COUNT: usize = 1000;
    let mut cursor: u64 = 0;
    let mut total_deleted: u64 = 0;

    loop {
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT)
            .query_async(conn)
            .await?;

        if !keys.is_empty() {
            let deleted: u64 = redis::cmd("DEL").arg(&keys).query_async(conn).await?;
            total_deleted += deleted;
        }

        cursor = next_cursor;
        if cursor == 0 {
            break;
        }
    }

    Ok(total_deleted)
}
