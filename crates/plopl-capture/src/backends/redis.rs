use crate::capture::ExchangeReady;
use crate::store::{ExchangeStore, Snapshot};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use redis::{Commands, Connection};

/// Simple connection manager for Redis
struct RedisConnectionManager {
    client: redis::Client,
}

impl RedisConnectionManager {
    fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

impl r2d2::ManageConnection for RedisConnectionManager {
    type Connection = Mutex<Connection>;
    type Error = redis::RedisError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let conn = self.client.get_connection()?;
        Ok(Mutex::new(conn))
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        redis::cmd("PING").query(conn.get_mut())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Redis implementation of ExchangeStore using the synchronous client
///
/// The snapshot is one JSON string under `<prefix>snapshot`; undelivered
/// events are a list under `<prefix>undelivered`, one JSON document per
/// element.
pub struct RedisExchangeStore {
    pool: r2d2::Pool<RedisConnectionManager>,
    key_prefix: String,
}

impl RedisExchangeStore {
    /// Create a new Redis exchange store
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g. "redis://localhost:6379")
    /// * `pool_size` - Connection pool size
    /// * `key_prefix` - Prefix for all keys (e.g. "plopl:")
    pub fn new(url: &str, pool_size: usize, key_prefix: String) -> Result<Self> {
        let client = redis::Client::open(url).context("Failed to parse Redis URL")?;

        let manager = RedisConnectionManager::new(client);

        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1) as u32)
            .connection_timeout(std::time::Duration::from_secs(5))
            .build(manager)
            .context("Failed to create Redis connection pool")?;

        // Test connection with PING
        {
            let conn = pool.get().context("Failed to get connection from pool")?;
            let _: String = redis::cmd("PING")
                .query(&mut *conn.lock())
                .context("Failed to PING Redis")?;
        }

        tracing::info!(
            "Connected to Redis with prefix={}, pool_size={}",
            key_prefix,
            pool_size
        );

        Ok(Self { pool, key_prefix })
    }

    fn snapshot_key(&self) -> String {
        format!("{}snapshot", self.key_prefix)
    }

    fn undelivered_key(&self) -> String {
        format!("{}undelivered", self.key_prefix)
    }
}

impl ExchangeStore for RedisExchangeStore {
    fn load(&self) -> Result<Snapshot> {
        let conn = self
            .pool
            .get()
            .context("Failed to get Redis connection from pool")?;

        let value: Option<String> = conn
            .lock()
            .get(self.snapshot_key())
            .context("Redis GET failed")?;

        match value {
            Some(json) => serde_json::from_str(&json).context("Failed to parse snapshot from Redis"),
            None => Ok(Snapshot::new()),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        let conn = self
            .pool
            .get()
            .context("Failed to get Redis connection from pool")?;

        let _: () = conn
            .lock()
            .set(self.snapshot_key(), json)
            .context("Redis SET failed")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .context("Failed to get Redis connection from pool")?;

        let _: () = conn
            .lock()
            .del(vec![self.snapshot_key(), self.undelivered_key()])
            .context("Redis DEL failed")?;
        Ok(())
    }

    fn put_undelivered(&self, ready: &ExchangeReady) -> Result<()> {
        let json = serde_json::to_string(ready)?;
        let conn = self
            .pool
            .get()
            .context("Failed to get Redis connection from pool")?;

        let _: () = conn
            .lock()
            .rpush(self.undelivered_key(), json)
            .context("Redis RPUSH failed")?;
        Ok(())
    }

    fn take_undelivered(&self) -> Result<Vec<ExchangeReady>> {
        let key = self.undelivered_key();
        let conn = self
            .pool
            .get()
            .context("Failed to get Redis connection from pool")?;

        let (items, _): (Vec<String>, i64) = redis::pipe()
            .atomic()
            .lrange(&key, 0, -1)
            .del(&key)
            .query(&mut *conn.lock())
            .context("Redis LRANGE/DEL failed")?;

        items
            .iter()
            .map(|json| {
                serde_json::from_str(json).context("Failed to parse undelivered exchange from Redis")
            })
            .collect()
    }
}
