//! Write-through cache of serialized entities, one Redis hash per table.
//!
//! Each table maps to a hash whose fields are entity ids and whose values are
//! the entity's JSON. Every write refreshes the expiry of the whole hash, so a
//! table that stops receiving writes disappears after one time-to-live.

use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::{errors::RepoError, keys::KeyContext};

#[allow(async_fn_in_trait)]
pub trait EntityCache {
    /// Cached JSON for each id, aligned with `ids`; `None` where absent.
    async fn get_many(&self, table: &str, ids: &[String]) -> Result<Vec<Option<String>>, RepoError>;

    /// Store `(id, json)` pairs and reset the table's expiry. Later pairs win on duplicate ids.
    async fn put_many(&self, table: &str, entries: &[(String, String)], ttl: Duration) -> Result<(), RepoError>;

    /// Every `(id, json)` pair currently cached for `table`.
    async fn get_all(&self, table: &str) -> Result<Vec<(String, String)>, RepoError>;

    /// Drop the whole table hash; returns whether anything was removed.
    async fn evict(&self, table: &str) -> Result<bool, RepoError>;

    /// Remaining lifetime of the table hash, `None` when it does not exist.
    async fn time_to_live(&self, table: &str) -> Result<Option<Duration>, RepoError>;
}

/// [`EntityCache`] over Redis hashes.
#[derive(Clone)]
pub struct RedisHashCache {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisHashCache {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> Result<Self, RepoError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, prefix))
    }

    fn table_key(&self, table: &str) -> String {
        KeyContext::new(&self.prefix).cache_table(table)
    }
}

impl EntityCache for RedisHashCache {
    async fn get_many(&self, table: &str, ids: &[String]) -> Result<Vec<Option<String>>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(self.table_key(table))
            .arg(ids)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn put_many(&self, table: &str, entries: &[(String, String)], ttl: Duration) -> Result<(), RepoError> {
        if entries.is_empty() {
            return Ok(());
        }
        let key = self.table_key(table);
        let mut hset = redis::cmd("HSET");
        hset.arg(&key);
        for (id, json) in entries {
            hset.arg(id).arg(json);
        }
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .add_command(hset)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl.as_secs().max(1))
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_all(&self, table: &str) -> Result<Vec<(String, String)>, RepoError> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, String)> = redis::cmd("HGETALL")
            .arg(self.table_key(table))
            .query_async(&mut conn)
            .await?;
        Ok(entries)
    }

    async fn evict(&self, table: &str) -> Result<bool, RepoError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(self.table_key(table)).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn time_to_live(&self, table: &str) -> Result<Option<Duration>, RepoError> {
        let mut conn = self.conn.clone();
        let millis: i64 = redis::cmd("PTTL").arg(self.table_key(table)).query_async(&mut conn).await?;
        // -2: no such key, -1: no expiry
        Ok(match millis {
            -2 => None,
            -1 => Some(Duration::MAX),
            ms => Some(Duration::from_millis(ms.max(0) as u64)),
        })
    }
}
