use confique::Config;
use serde::Deserialize;

/// Specifies which session store implementation to use
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStoreKind {
    #[default]
    InMemory,
    Redis,
}

/// Configuration of login sessions
#[derive(Debug, Config, Clone)]
pub struct SessionConfig {
    /// Session store type: "in-memory" (default) or "redis"
    #[config(env = "KEYCLOAK_BRIDGE_SESSION_STORE", default = "in-memory")]
    pub store: SessionStoreKind,

    /// Session lifetime in seconds (default: 2 weeks)
    #[config(env = "KEYCLOAK_BRIDGE_SESSION_TTL", default = 1209600)]
    pub ttl: u64,

    /// In-memory store capacity in MiB (default: 64 MiB)
    #[config(env = "KEYCLOAK_BRIDGE_SESSION_MEMORY_CAPACITY", default = 64)]
    pub memory_capacity: usize,

    /// Redis connection string, required for the redis store
    #[config(env = "KEYCLOAK_BRIDGE_SESSION_REDIS_URL", default = "")]
    pub redis_url: String,

    /// Session cookie name (default: sessionid)
    #[config(env = "KEYCLOAK_BRIDGE_SESSION_COOKIE_NAME", default = "sessionid")]
    pub cookie_name: String,

    /// Add the Secure flag to the session cookie (default: false)
    #[config(env = "KEYCLOAK_BRIDGE_SESSION_COOKIE_SECURE", default = false)]
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: SessionStoreKind::InMemory,
            ttl: 1_209_600,
            memory_capacity: 64,
            redis_url: String::new(),
            cookie_name: "sessionid".to_string(),
            cookie_secure: false,
        }
    }
}
