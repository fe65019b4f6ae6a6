use confique::Config;
use keycloak_identity::{BackendSettings, SyncScope};

/// Configuration of the Keycloak realm and OAuth client
#[derive(Debug, Config, Clone, Default)]
pub struct KeycloakConfig {
    /// Keycloak base URL (required)
    #[config(env = "KEYCLOAK_SERVER")]
    pub server: String,

    /// Realm name (required)
    #[config(env = "KEYCLOAK_REALM")]
    pub realm: String,

    /// Realm public key, raw base64 as shown by Keycloak or PEM (required)
    #[config(env = "KEYCLOAK_KEY")]
    pub key: String,

    /// OAuth client id (required)
    #[config(env = "KEYCLOAK_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret (default: empty)
    #[config(env = "KEYCLOAK_CLIENT_SECRET", default = "")]
    pub client_secret: String,

    /// Read realm roles instead of the client's roles (default: false)
    #[config(env = "KEYCLOAK_GLOBAL_ROLE", default = false)]
    pub global_role: bool,

    /// Audience access tokens must carry (default: account)
    #[config(env = "KEYCLOAK_AUDIENCE", default = "account")]
    pub audience: String,

    /// Tolerated clock skew for token expiry in seconds (default: 0)
    #[config(env = "KEYCLOAK_LEEWAY", default = 0)]
    pub leeway: u64,

    /// Clear every group membership on sync, manual ones included (default: false)
    #[config(env = "KEYCLOAK_SYNC_ALL_GROUPS", default = false)]
    pub sync_all_groups: bool,

    /// Origins allowed to log users out cross-origin, comma-separated (default: empty)
    #[config(env = "KEYCLOAK_ALLOWED_ORIGINS", default = "")]
    pub allowed_origins: String,

    /// Timeout for token endpoint requests in seconds (default: 10)
    #[config(env = "KEYCLOAK_CLIENT_TIMEOUT", default = 10)]
    pub client_timeout: u64,
}

impl KeycloakConfig {
    /// Allowed logout origins as a list
    pub fn get_allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            server: self.server.clone(),
            realm: self.realm.clone(),
            public_key: self.key.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            global_role: self.global_role,
            audience: self.audience.clone(),
            leeway_secs: self.leeway,
            client_timeout_secs: self.client_timeout,
        }
    }

    pub fn sync_scope(&self) -> SyncScope {
        SyncScope::from_settings(self.sync_all_groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_allowed_origins() {
        let config = KeycloakConfig {
            allowed_origins: "https://portal.example.com, https://other.example.com/,,".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.get_allowed_origins(),
            vec!["https://portal.example.com", "https://other.example.com"]
        );
    }

    #[test]
    fn test_empty_allowed_origins() {
        assert!(KeycloakConfig::default().get_allowed_origins().is_empty());
    }

    #[test]
    fn test_sync_scope() {
        let mut config = KeycloakConfig::default();
        assert_eq!(config.sync_scope(), SyncScope::RoleDerived);
        config.sync_all_groups = true;
        assert_eq!(config.sync_scope(), SyncScope::AllGroups);
    }
}
