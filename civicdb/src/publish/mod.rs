//! Topic publishing for write-behind persistence.
//!
//! Repositories never write rows themselves. A save hands the serialized batch
//! to a topic, and whatever consumes that topic persists it.

use redis::aio::ConnectionManager;

use crate::errors::RepoError;

/// Stream field carrying the JSON payload.
pub const PAYLOAD_FIELD: &str = "payload";

#[allow(async_fn_in_trait)]
pub trait TopicPublisher {
    /// Append one message carrying `payload` to `topic`.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), RepoError>;
}

/// Publishes to Redis Streams with `XADD`, one stream per topic.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: ConnectionManager,
    max_len: Option<usize>,
}

impl RedisStreamPublisher {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, max_len: None }
    }

    /// Trim each stream to roughly `max_len` entries on every append.
    pub fn with_max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }
}

impl TopicPublisher for RedisStreamPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), RepoError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(topic);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*").arg(PAYLOAD_FIELD).arg(payload);

        let mut conn = self.conn.clone();
        let _id: String = cmd.query_async(&mut conn).await?;
        Ok(())
    }
}
