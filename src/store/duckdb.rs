use crate::codec::BucketId;
use crate::error::{Error, Result};
use crate::store::{PointStore, StoreEntry};
use async_trait::async_trait;
use bytes::Bytes;
use duckdb::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;

/// DuckDB-backed point store.
///
/// Entries live in one `kv_store` table keyed by `(bucket, key)`.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Open a database file, or an in-memory database for `:memory:`.
    pub fn open(connection: &str) -> Result<Self> {
        let conn = if connection.is_empty() || connection == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(connection)
        }
        .map_err(|e| Error::Storage(format!("Failed to open '{}': {}", connection, e)))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                bucket BIGINT NOT NULL,
                key BLOB NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (bucket, key)
            );",
        )
        .map_err(|e| Error::Storage(format!("Failed to create kv_store table: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

#[async_trait]
impl PointStore for DuckDbStore {
    async fn get(&self, bucket: BucketId, key: &[u8]) -> Result<Option<Bytes>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT value FROM kv_store WHERE bucket = ?1 AND key = ?2")
            .map_err(|e| Error::Storage(format!("Failed to prepare lookup: {}", e)))?;

        let mut rows = stmt
            .query(params![bucket.0 as i64, key.to_vec()])
            .map_err(|e| Error::Storage(format!("Lookup failed: {}", e)))?;

        match rows.next()? {
            Some(row) => {
                let value: Vec<u8> = row.get(0)?;
                Ok(Some(Bytes::from(value)))
            }
            None => Ok(None),
        }
    }

    async fn put_batch(&self, entries: Vec<StoreEntry>) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Failed to start transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare("INSERT OR REPLACE INTO kv_store (bucket, key, value) VALUES (?1, ?2, ?3)")
                .map_err(|e| Error::Storage(format!("Failed to prepare statement: {}", e)))?;

            for entry in entries {
                stmt.execute(params![entry.bucket.0 as i64, entry.key.to_vec(), entry.value.to_vec()])
                    .map_err(|e| Error::Storage(format!("Failed to insert entry: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit transaction: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_upsert() {
        let store = DuckDbStore::open_in_memory().unwrap();
        assert!(store.get(BucketId(3), b"missing").await.unwrap().is_none());

        store
            .put_batch(vec![
                StoreEntry {
                    bucket: BucketId(3),
                    key: Bytes::from_static(&[0, 1, 2]),
                    value: Bytes::from_static(&[9, 9]),
                },
                StoreEntry {
                    bucket: BucketId(4),
                    key: Bytes::from_static(&[0, 1, 2]),
                    value: Bytes::from_static(&[7]),
                },
            ])
            .await
            .unwrap();
        store
            .put(BucketId(3), Bytes::from_static(&[0, 1, 2]), Bytes::from_static(&[8]))
            .await
            .unwrap();

        assert_eq!(
            store.get(BucketId(3), &[0, 1, 2]).await.unwrap(),
            Some(Bytes::from_static(&[8]))
        );
        assert_eq!(
            store.get(BucketId(4), &[0, 1, 2]).await.unwrap(),
            Some(Bytes::from_static(&[7]))
        );
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.duckdb");
        let path = path.to_str().unwrap();

        {
            let store = DuckDbStore::open(path).unwrap();
            store
                .put(BucketId(1), Bytes::from_static(b"key"), Bytes::from_static(b"value"))
                .await
                .unwrap();
        }

        let store = DuckDbStore::open(path).unwrap();
        assert_eq!(
            store.get(BucketId(1), b"key").await.unwrap(),
            Some(Bytes::from_static(b"value"))
        );
    }
}
