use parking_lot::Mutex;
use redis::{Client, Commands, Connection, RedisResult};

use crate::{CounterStore, ProviderError};

/// A [`CounterStore`] on a Redis server, using `INCRBY` and `SET NX`.
///
/// Holds one lazily opened connection. A failed command drops it so the next
/// call reconnects.
pub struct RedisCounterStore {
    client: Client,
    conn: Mutex<Option<Connection>>,
}

impl RedisCounterStore {
    /// Creates a store for `url` (e.g. `redis://127.0.0.1/`). No connection
    /// is made until the first command.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Store`] if `url` is malformed.
    pub fn open(url: &str) -> Result<Self, ProviderError> {
        Client::open(url)
            .map(Self::from_client)
            .map_err(ProviderError::store)
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            conn: Mutex::new(None),
        }
    }

    fn with_connection<R>(
        &self,
        command: impl FnOnce(&mut Connection) -> RedisResult<R>,
    ) -> Result<R, ProviderError> {
        let mut slot = self.conn.lock();
        let conn = match &mut *slot {
            Some(conn) => conn,
            empty => empty.insert(self.client.get_connection().map_err(ProviderError::store)?),
        };

        command(conn).map_err(|e| {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "redis command failed, dropping connection");
            *slot = None;
            ProviderError::store(e)
        })
    }
}

impl CounterStore for RedisCounterStore {
    fn incr_by(&self, key: &str, delta: i64) -> Result<i64, ProviderError> {
        self.with_connection(|conn| conn.incr::<_, _, i64>(key, delta))
    }

    fn set_if_absent(&self, key: &str, value: i64) -> Result<bool, ProviderError> {
        self.with_connection(|conn| conn.set_nx::<_, _, bool>(key, value))
    }
}

impl core::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("connected", &self.conn.lock().is_some())
            .finish_non_exhaustive()
    }
}
