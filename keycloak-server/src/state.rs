use crate::config::BridgeConfig;
use crate::session::{create_session_store, SessionError, Sessions};
use keycloak_identity::{
    Authenticator, BackendError, IdentityStore, InMemoryIdentityStore, KeycloakBackend,
};
use log::warn;
use moka::future::Cache as MokaCache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How long rendered discovery documents are cached (one week)
pub const DISCOVERY_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to configure Keycloak backend: {0}")]
    Backend(#[from] BackendError),
    #[error("Failed to create session store: {0}")]
    Session(#[from] SessionError),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub authenticator: Arc<Authenticator>,
    pub identity_store: Arc<dyn IdentityStore>,
    pub sessions: Arc<Sessions>,
    /// Rendered discovery documents keyed by version hash and base URL
    pub discovery_cache: MokaCache<String, String>,
    pub allowed_origins: Arc<Vec<String>>,
    pub version_hash: Arc<str>,
}

impl AppState {
    pub async fn new(config: &BridgeConfig) -> Result<Self, StateError> {
        let store = create_session_store(&config.session).await?;
        let sessions = Sessions::new(store, Duration::from_secs(config.session.ttl));
        Self::with_sessions(config, sessions)
    }

    /// Build the state around an existing session store
    pub fn with_sessions(config: &BridgeConfig, sessions: Sessions) -> Result<Self, StateError> {
        let backend = KeycloakBackend::new(&config.keycloak.backend_settings())?;
        let identity_store: Arc<dyn IdentityStore> = Arc::new(InMemoryIdentityStore::new());
        let authenticator = Authenticator::new(
            Arc::new(backend),
            identity_store.clone(),
            config.keycloak.sync_scope(),
        );

        Ok(Self {
            config: Arc::new(config.clone()),
            authenticator: Arc::new(authenticator),
            identity_store,
            sessions: Arc::new(sessions),
            discovery_cache: MokaCache::builder()
                .time_to_live(DISCOVERY_CACHE_TTL)
                .max_capacity(64)
                .build(),
            allowed_origins: Arc::new(config.keycloak.get_allowed_origins()),
            version_hash: version_hash().into(),
        })
    }

    pub fn backend(&self) -> &KeycloakBackend {
        self.authenticator.backend()
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> bool {
        let mut healthy = true;
        if let Err(e) = self.identity_store.health_check().await {
            warn!("Identity store is unhealthy: {}", e);
            healthy = false;
        }
        if let Err(e) = self.sessions.health_check().await {
            warn!("Session store is unhealthy: {}", e);
            healthy = false;
        }
        healthy
    }
}

/// Hash identifying the running build, part of every discovery cache key
pub fn version_hash() -> String {
    let digest = Sha256::digest(concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION")));
    format!("{:x}", digest)[..16].to_string()
}
