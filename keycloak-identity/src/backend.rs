//! Keycloak OAuth2 backend: endpoint URLs, client credentials and the
//! authorization-code exchange.

use crate::claims::{ClaimsMapper, DecodedClaims, NormalizedIdentity, RoleScope};
use crate::error::{AuthError, BackendError};
use crate::resolver::TokenSet;
use crate::verifier::TokenVerifier;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use log::{debug, error};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const AUTHORIZATION_ENDPOINT: &str = "auth/realms/{realm}/protocol/openid-connect/auth";
const ACCESS_TOKEN_ENDPOINT: &str = "auth/realms/{realm}/protocol/openid-connect/token";

/// Everything needed to talk to one Keycloak realm.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL of the Keycloak server
    pub server: String,
    pub realm: String,
    /// Realm public key, bare base64 or PEM
    pub public_key: String,
    pub client_id: String,
    pub client_secret: String,
    /// Read realm roles instead of the client's roles
    pub global_role: bool,
    pub audience: String,
    pub leeway_secs: u64,
    pub client_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Keycloak OAuth2 strategy, built once from configuration at start-up.
#[derive(Debug, Clone)]
pub struct KeycloakBackend {
    authorization_url: Url,
    access_token_url: Url,
    client_id: String,
    client_secret: String,
    verifier: TokenVerifier,
    mapper: ClaimsMapper,
    http: Client,
}

impl KeycloakBackend {
    /// Provider name used for social links
    pub const NAME: &'static str = "keycloak";

    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        if settings.realm.is_empty() {
            return Err(BackendError::InvalidConfiguration(
                "realm must not be empty".to_string(),
            ));
        }
        if settings.client_id.is_empty() {
            return Err(BackendError::InvalidConfiguration(
                "client id must not be empty".to_string(),
            ));
        }

        let server = Url::parse(&settings.server)?;
        let authorization_url =
            server.join(&AUTHORIZATION_ENDPOINT.replace("{realm}", &settings.realm))?;
        let access_token_url =
            server.join(&ACCESS_TOKEN_ENDPOINT.replace("{realm}", &settings.realm))?;

        let verifier = TokenVerifier::new(
            &settings.public_key,
            &settings.audience,
            settings.leeway_secs,
        )?;
        let mapper = ClaimsMapper::new(RoleScope::from_settings(
            settings.global_role,
            &settings.client_id,
        ));

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.client_timeout_secs))
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            authorization_url,
            access_token_url,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            verifier,
            mapper,
            http,
        })
    }

    pub fn authorization_url(&self) -> &Url {
        &self.authorization_url
    }

    pub fn access_token_url(&self) -> &Url {
        &self.access_token_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// `Authorization` header value for the token endpoint.
    pub fn auth_header(&self) -> String {
        let credentials = URL_SAFE.encode(format!("{}:{}", self.client_id, self.client_secret));
        format!("Basic {credentials}")
    }

    /// Authorization endpoint URL starting the code flow.
    pub fn authorization_redirect(&self, redirect_uri: &str, state: &str) -> Url {
        let mut url = self.authorization_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        url
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, BackendError> {
        debug!("Exchanging authorization code at {}", self.access_token_url);
        let response = self
            .http
            .post(self.access_token_url.clone())
            .header(AUTHORIZATION, self.auth_header())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Token endpoint rejected code exchange with status {}", status);
            return Err(BackendError::TokenEndpoint(status.as_u16(), body));
        }

        let tokens: TokenEndpointResponse = response.json().await?;
        Ok(TokenSet {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
        })
    }

    /// Verify an access token and return its claims.
    pub fn user_data(&self, access_token: &str) -> Result<DecodedClaims, AuthError> {
        self.verifier.verify(access_token)
    }

    /// Map verified claims to the identity used for local users.
    pub fn user_details(&self, claims: &DecodedClaims) -> NormalizedIdentity {
        self.mapper.map_claims(claims)
    }
}
