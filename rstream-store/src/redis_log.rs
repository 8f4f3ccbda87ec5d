//! Redis Streams implementation
//!
//! One multiplexed connection per database, cloned per command. Maps the
//! port onto `XADD`, `XGROUP CREATE … MKSTREAM`, `XREADGROUP`, and a
//! pipelined `XACK` + `XDEL`.

use crate::error::StoreError;
use crate::repository::{AckOutcome, ReadCursor, StreamLog};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::IntoConnectionInfo;
use rstream_domain::{EntryFields, RawEntry};
use tracing::debug;

/// Error code Redis returns when `XGROUP CREATE` finds the group already there
const BUSYGROUP: &str = "BUSYGROUP";

/// Error code Redis returns for reads against a missing group or key
const NOGROUP: &str = "NOGROUP";

/// `XREADGROUP` reply: `[[key, [[id, [field, value, …]], …]], …]` or nil
type ReadGroupReply = Option<Vec<(String, Vec<(String, Option<Vec<String>>)>)>>;

/// Stream log backed by a Redis server
#[derive(Clone)]
pub struct RedisStreamLog {
    connection: MultiplexedConnection,
    database: i64,
}

impl RedisStreamLog {
    /// Open a multiplexed connection and select `database`.
    ///
    /// # Errors
    /// `StoreError::Config` for an unparsable connection string,
    /// `StoreError::Connection` if the server cannot be reached.
    pub async fn connect(connection_string: &str, database: i64) -> Result<Self, StoreError> {
        let mut info = connection_string
            .into_connection_info()
            .map_err(|e| StoreError::Config(format!("Invalid connection string: {}", e)))?;
        info.redis.db = database;

        let client = redis::Client::open(info)
            .map_err(|e| StoreError::Config(format!("Invalid connection settings: {}", e)))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!(database, "Connected to Redis");
        Ok(Self { connection, database })
    }

    /// Selected database index
    pub fn database(&self) -> i64 {
        self.database
    }

    fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

/// Split a flat `[field, value, …]` list into pairs.
fn pairs(flat: Vec<String>) -> Result<Vec<(String, String)>, StoreError> {
    if flat.len() % 2 != 0 {
        return Err(StoreError::Protocol(format!("odd field list of length {}", flat.len())));
    }
    let mut values = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        values.push((field, value));
    }
    Ok(values)
}

#[async_trait]
impl StreamLog for RedisStreamLog {
    async fn append(&self, key: &str, fields: &EntryFields) -> Result<String, StoreError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(key).arg("*");
        for (field, value) in fields.to_pairs() {
            cmd.arg(field).arg(value);
        }

        let id: String = cmd.query_async(&mut self.connection()).await?;
        Ok(id)
    }

    async fn create_group(&self, key: &str, group: &str) -> Result<(), StoreError> {
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(key)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut self.connection())
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some(BUSYGROUP) => Err(StoreError::group_exists(key, group)),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        count: usize,
    ) -> Result<Vec<RawEntry>, StoreError> {
        let result: redis::RedisResult<ReadGroupReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(key)
            .arg(cursor.as_id())
            .query_async(&mut self.connection())
            .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) if e.code() == Some(NOGROUP) => return Err(StoreError::no_group(key, group)),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (_, records) in reply.unwrap_or_default() {
            for (id, flat) in records {
                // Pending entries deleted from the log come back without fields.
                let Some(flat) = flat else {
                    continue;
                };
                entries.push(RawEntry::new(id, pairs(flat)?));
            }
        }
        Ok(entries)
    }

    async fn ack_and_delete(&self, key: &str, group: &str, ids: &[String]) -> Result<AckOutcome, StoreError> {
        if ids.is_empty() {
            return Ok(AckOutcome::default());
        }

        let (acknowledged, deleted): (usize, usize) = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(key)
            .arg(group)
            .arg(ids)
            .cmd("XDEL")
            .arg(key)
            .arg(ids)
            .query_async(&mut self.connection())
            .await?;

        Ok(AckOutcome { acknowledged, deleted })
    }

    async fn pending_count(&self, key: &str, group: &str) -> Result<usize, StoreError> {
        let result: redis::RedisResult<(usize, Option<String>, Option<String>, redis::Value)> = redis::cmd("XPENDING")
            .arg(key)
            .arg(group)
            .query_async(&mut self.connection())
            .await;

        match result {
            Ok((count, _, _, _)) => Ok(count),
            Err(e) if e.code() == Some(NOGROUP) => Err(StoreError::no_group(key, group)),
            Err(e) => Err(e.into()),
        }
    }

    async fn log_len(&self, key: &str) -> Result<usize, StoreError> {
        let len: usize = redis::cmd("XLEN").arg(key).query_async(&mut self.connection()).await?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_splits_flat_list() {
        let flat = vec!["a".to_string(), "1".to_string(), "b".to_string(), "2".to_string()];
        assert_eq!(
            pairs(flat).unwrap(),
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_pairs_rejects_odd_list() {
        assert!(matches!(pairs(vec!["a".to_string()]), Err(StoreError::Protocol(_))));
    }

    #[test]
    fn test_cursor_ids() {
        assert_eq!(ReadCursor::Backlog.as_id(), "0");
        assert_eq!(ReadCursor::NewOnly.as_id(), ">");
    }
}
