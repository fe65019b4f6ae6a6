pub(crate) use crate::config::keycloak::KeycloakConfig;
pub(crate) use crate::config::session::{SessionConfig, SessionStoreKind};
use confique::Config;

pub mod keycloak;
pub mod session;

/// Optional configuration file, overridden by environment variables
pub const CONFIG_FILE: &str = "keycloak-bridge.toml";

/// Main configuration structure for the bridge server
#[derive(Debug, Config, Clone)]
pub struct BridgeConfig {
    /// The port the server will listen to (default: 8000)
    #[config(env = "KEYCLOAK_BRIDGE_PORT", default = 8000)]
    pub port: u16,

    /// Keycloak realm and client configuration
    #[config(nested)]
    pub keycloak: KeycloakConfig,

    /// Session configuration
    #[config(nested)]
    pub session: SessionConfig,
}

impl BridgeConfig {
    /// Loads the configuration from the environment and the optional config file
    pub fn new() -> Result<Self, confique::Error> {
        Self::builder().env().file(CONFIG_FILE).load()
    }

    #[cfg(test)]
    pub fn for_test_with_mocks(keycloak_mock: &wiremock::MockServer, public_key: &str) -> Self {
        Self {
            port: 0, // Let the OS choose a port
            keycloak: KeycloakConfig {
                server: format!("{}/", keycloak_mock.uri()),
                realm: "demo".to_string(),
                key: public_key.to_string(),
                client_id: "wirecloud".to_string(),
                client_secret: "test_secret".to_string(),
                global_role: true,
                audience: "account".to_string(),
                leeway: 0,
                sync_all_groups: false,
                allowed_origins: "https://portal.example.com".to_string(),
                client_timeout: 5,
            },
            session: SessionConfig::default(),
        }
    }
}
