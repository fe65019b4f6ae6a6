use crate::config::{SessionConfig, SessionStoreKind};
use async_trait::async_trait;
use keycloak_identity::store::{LocalUser, UserId};
use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub mod cookie;
pub mod memory;
pub mod redis;

/// Lifetime of the `state` issued when a login starts
pub const LOGIN_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Errors that can occur during session store operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Key-value storage behind login sessions.
///
/// Every entry carries its own TTL: login states live for minutes while
/// sessions live for weeks.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), SessionError>;

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError>;

    /// Atomically read and remove `key`; only one caller observes the value
    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError>;

    async fn delete(&self, key: &str) -> Result<(), SessionError>;

    /// Returns Ok(()) if healthy, or Err with a descriptive message if unhealthy
    async fn health_check(&self) -> Result<(), String>;
}

/// Session store selected from configuration at start-up
#[derive(Clone)]
pub enum SessionStore {
    /// In-memory store using Moka
    InMemory(memory::InMemorySessionStore),
    /// Redis-based store, shared between replicas
    Redis(redis::RedisSessionStore),
}

#[async_trait]
impl SessionBackend for SessionStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        match self {
            Self::InMemory(store) => store.set(key, value, ttl).await,
            Self::Redis(store) => store.set(key, value, ttl).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        match self {
            Self::InMemory(store) => store.get(key).await,
            Self::Redis(store) => store.get(key).await,
        }
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        match self {
            Self::InMemory(store) => store.take(key).await,
            Self::Redis(store) => store.take(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        match self {
            Self::InMemory(store) => store.delete(key).await,
            Self::Redis(store) => store.delete(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

/// Creates the session store configured in `config`
pub async fn create_session_store(config: &SessionConfig) -> Result<SessionStore, SessionError> {
    match config.store {
        SessionStoreKind::InMemory => {
            let store = memory::InMemorySessionStore::new(config.memory_capacity)
                .map_err(SessionError::Config)?;
            Ok(SessionStore::InMemory(store))
        }
        SessionStoreKind::Redis => {
            if config.redis_url.is_empty() {
                return Err(SessionError::Config(
                    "Redis URL is required for the Redis session store".to_string(),
                ));
            }
            let store = redis::RedisSessionStore::new(&config.redis_url)
                .await
                .map_err(SessionError::Config)?;
            Ok(SessionStore::Redis(store))
        }
    }
}

/// An authenticated browser session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    /// Unix timestamp of the login
    pub created_at: u64,
}

/// Pending login, keyed by the OAuth `state` parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginState {
    pub next: String,
}

/// Session lifecycle on top of the configured store
#[derive(Clone)]
pub struct Sessions {
    store: SessionStore,
    ttl: Duration,
}

impl Sessions {
    pub fn new(store: SessionStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a session for `user` and return its id
    pub async fn create(&self, user: &LocalUser) -> Result<String, SessionError> {
        let session_id = cookie::generate_token();
        let session = Session {
            user_id: user.id,
            username: user.username.clone(),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };
        self.store
            .set(&session_key(&session_id), &session, self.ttl)
            .await?;
        info!("Started session for '{}'", user.username);
        Ok(session_id)
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<Session>, SessionError> {
        self.store.get(&session_key(session_id)).await
    }

    pub async fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        self.store.delete(&session_key(session_id)).await?;
        debug!("Session terminated");
        Ok(())
    }

    /// Remember where to send the user once the login identified by `state` completes
    pub async fn save_login_state(&self, state: &str, next: &str) -> Result<(), SessionError> {
        let login = LoginState {
            next: next.to_string(),
        };
        self.store
            .set(&login_state_key(state), &login, LOGIN_STATE_TTL)
            .await
    }

    /// Consume a login state; a state can be used only once
    pub async fn take_login_state(&self, state: &str) -> Result<Option<LoginState>, SessionError> {
        self.store.take(&login_state_key(state)).await
    }

    pub async fn health_check(&self) -> Result<(), String> {
        self.store.health_check().await
    }
}

fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

fn login_state_key(state: &str) -> String {
    format!("login-state:{state}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use keycloak_identity::store::{ExtraData, SocialLink};

    pub(crate) fn memory_sessions() -> Sessions {
        let store = memory::InMemorySessionStore::new(1).expect("Failed to create session store");
        Sessions::new(SessionStore::InMemory(store), Duration::from_secs(60))
    }

    fn user() -> LocalUser {
        LocalUser {
            id: UserId(7),
            username: "alice".to_string(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            full_name: String::new(),
            is_superuser: false,
            is_staff: false,
            social: SocialLink {
                provider: "keycloak".to_string(),
                uid: "alice".to_string(),
                extra_data: ExtraData::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let sessions = memory_sessions();
        let id = sessions.create(&user()).await.unwrap();

        let session = sessions.load(&id).await.unwrap().unwrap();
        assert_eq!(session.user_id, UserId(7));
        assert_eq!(session.username, "alice");

        sessions.destroy(&id).await.unwrap();
        assert!(sessions.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_state_is_single_use() {
        let sessions = memory_sessions();
        sessions.save_login_state("xyz", "/workspace").await.unwrap();

        let login = sessions.take_login_state("xyz").await.unwrap();
        assert_eq!(login.map(|l| l.next).as_deref(), Some("/workspace"));
        assert!(sessions.take_login_state("xyz").await.unwrap().is_none());
        assert!(sessions.take_login_state("unknown").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callbacks_share_one_login_state() {
        let sessions = memory_sessions();
        sessions.save_login_state("xyz", "/workspace").await.unwrap();
        let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(8));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sessions = sessions.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                sessions.take_login_state("xyz").await.unwrap()
            }));
        }

        let mut taken = Vec::new();
        for handle in handles {
            taken.extend(handle.await.unwrap());
        }
        assert_eq!(
            taken,
            vec![LoginState {
                next: "/workspace".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_redis_store_requires_url() {
        let config = SessionConfig {
            store: SessionStoreKind::Redis,
            ..Default::default()
        };
        assert!(matches!(
            create_session_store(&config).await,
            Err(SessionError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_default_store_is_in_memory() {
        let store = create_session_store(&SessionConfig::default()).await.unwrap();
        assert!(matches!(store, SessionStore::InMemory(_)));
        assert!(store.health_check().await.is_ok());
    }
}
