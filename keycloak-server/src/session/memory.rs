use super::{SessionBackend, SessionError};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    data: String,
    ttl: Duration,
    stored_at: Instant,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

fn decode<T: DeserializeOwned>(entry: &Entry) -> Result<T, SessionError> {
    serde_json::from_str(&entry.data).map_err(|e| SessionError::Deserialization(e.to_string()))
}

/// Expires each entry after the TTL it was stored with
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct InMemorySessionStore {
    cache: MokaCache<String, Entry>,
}

impl InMemorySessionStore {
    /// Initialize a new in-memory session store bounded to `capacity_mib`
    pub fn new(capacity_mib: usize) -> Result<Self, String> {
        if capacity_mib == 0 {
            return Err("In-memory session store capacity must be positive".to_string());
        }
        let max_capacity_bytes = (capacity_mib as u64).saturating_mul(1024 * 1024);

        let cache = MokaCache::builder()
            .expire_after(EntryExpiry)
            .weigher(|key: &String, value: &Entry| -> u32 {
                (key.len() + value.data.len()).try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(max_capacity_bytes)
            .build();

        Ok(Self { cache })
    }
}

#[async_trait]
impl SessionBackend for InMemorySessionStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let data = serde_json::to_string(value)?;
        let entry = Entry {
            data,
            ttl,
            stored_at: Instant::now(),
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        match self.cache.get(key).await {
            Some(entry) => decode(&entry).map(Some),
            None => Ok(None),
        }
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        // `remove` may hand back an entry that expired but was not evicted yet
        match self.cache.remove(key).await {
            Some(entry) if entry.is_live() => decode(&entry).map(Some),
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.cache.remove(key).await;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        field: String,
    }

    #[tokio::test]
    async fn test_store_operations() {
        let store = InMemorySessionStore::new(1).unwrap();
        let data = TestData {
            field: "test".to_string(),
        };

        store.set("key", &data, Duration::from_secs(60)).await.unwrap();
        let retrieved: TestData = store.get("key").await.unwrap().unwrap();
        assert_eq!(data, retrieved);

        store.delete("key").await.unwrap();
        assert!(store.get::<TestData>("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_expire_independently() {
        let store = InMemorySessionStore::new(1).unwrap();
        store.set("short", &"a", Duration::from_secs(1)).await.unwrap();
        store.set("long", &"b", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(store.get::<String>("short").await.unwrap().is_none());
        assert_eq!(store.get::<String>("long").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_wrong_type_is_a_deserialization_error() {
        let store = InMemorySessionStore::new(1).unwrap();
        store.set("key", &"text", Duration::from_secs(60)).await.unwrap();
        assert!(matches!(
            store.get::<TestData>("key").await,
            Err(SessionError::Deserialization(_))
        ));
    }

    #[tokio::test]
    async fn test_take_removes_entry() {
        let store = InMemorySessionStore::new(1).unwrap();
        store.set("key", &"once", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.take::<String>("key").await.unwrap().as_deref(), Some("once"));
        assert!(store.take::<String>("key").await.unwrap().is_none());
        assert!(store.get::<String>("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_ignores_expired_entry() {
        let store = InMemorySessionStore::new(1).unwrap();
        store.set("key", &"stale", Duration::from_secs(1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(store.take::<String>("key").await.unwrap().is_none());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(InMemorySessionStore::new(0).is_err());
    }
}
