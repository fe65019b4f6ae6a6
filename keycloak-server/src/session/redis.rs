use super::{SessionBackend, SessionError};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const KEY_PREFIX: &str = "keycloak-bridge:";

#[derive(Clone)]
pub struct RedisSessionStore {
    conn_manager: ConnectionManager,
}

impl RedisSessionStore {
    /// Connect to Redis and verify the connection with a PING
    pub async fn new(redis_url: &str) -> Result<Self, String> {
        let client = Client::open(redis_url)
            .map_err(|err| format!("Failed to connect to Redis: {}", err))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|err| format!("Failed to create Redis connection manager: {}", err))?;

        let mut conn = conn_manager.clone();
        if let Err(err) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            return Err(format!("Failed to ping Redis: {}", err));
        }

        Ok(Self { conn_manager })
    }

    fn key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl SessionBackend for RedisSessionStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();

        // SET EX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(Self::key(key), serialized, seconds)
            .await
            .map_err(|err| {
                error!("Redis error while setting key {}: {}", key, err);
                SessionError::Redis(err.to_string())
            })
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = conn.get(Self::key(key)).await.map_err(|err| {
            error!("Redis error while getting key {}: {}", key, err);
            SessionError::Redis(err.to_string())
        })?;

        match result {
            Some(value) => serde_json::from_str(&value)
                .map_err(|e| SessionError::Deserialization(e.to_string()))
                .map(Some),
            None => Ok(None),
        }
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        let mut conn = self.conn_manager.clone();

        let result: Option<String> = conn.get_del(Self::key(key)).await.map_err(|err| {
            error!("Redis error while taking key {}: {}", key, err);
            SessionError::Redis(err.to_string())
        })?;

        result
            .map(|value| {
                serde_json::from_str(&value).map_err(|e| SessionError::Deserialization(e.to_string()))
            })
            .transpose()
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(Self::key(key)).await.map_err(|err| {
            error!("Redis error while deleting key {}: {}", key, err);
            SessionError::Redis(err.to_string())
        })
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }
}
