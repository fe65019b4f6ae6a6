use crate::api::{base_url, DEFAULT_REDIRECT_PATH};
use crate::errors::ApiError;
use crate::headers::CachePolicy;
use crate::openapi::OAUTH_TAG;
use crate::state::{AppState, DISCOVERY_CACHE_TTL};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use log::debug;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub(crate) const OAUTH_FLOWS: [&str; 2] = [
    "Authorization Code Grant",
    "Resource Owner Password Credentials Grant",
];

/// OAuth2 metadata advertised to clients.
///
/// Fields are declared in key order so the rendered JSON keys are sorted.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub(crate) struct OAuthDiscovery {
    auth_endpoint: String,
    default_redirect_uri: String,
    flows: Vec<String>,
    token_endpoint: String,
    version: String,
}

impl OAuthDiscovery {
    fn for_request(state: &AppState, base_url: &str) -> Self {
        let backend = state.backend();
        Self {
            auth_endpoint: backend.authorization_url().to_string(),
            default_redirect_uri: format!("{base_url}{DEFAULT_REDIRECT_PATH}"),
            flows: OAUTH_FLOWS.iter().map(|f| f.to_string()).collect(),
            token_endpoint: backend.access_token_url().to_string(),
            version: "2.0".to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/.well-known/oauth",
    tag = OAUTH_TAG,
    responses(
        (status = 200, description = "OAuth2 discovery document", body = OAuthDiscovery,
            content_type = "application/json; charset=UTF-8"),
        (status = 405, description = "Method not allowed")
    )
)]
pub(crate) async fn oauth_discovery(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let base_url = base_url(&headers);
    let key = format!("well-known-oauth-{}:{}", state.version_hash, base_url);

    let body = match state.discovery_cache.get(&key).await {
        Some(body) => body,
        None => {
            let discovery = OAuthDiscovery::for_request(&state, &base_url);
            let body = match serde_json::to_string(&discovery) {
                Ok(body) => body,
                Err(e) => return ApiError::internal(e).into_response(),
            };
            debug!("Rendered discovery document for {}", base_url);
            state.discovery_cache.insert(key, body.clone()).await;
            body
        }
    };

    let mut response = ([(CONTENT_TYPE, "application/json; charset=UTF-8")], body).into_response();
    CachePolicy::Public(DISCOVERY_CACHE_TTL).apply(&mut response);
    response
}

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/.well-known/oauth", get(oauth_discovery))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;
    use http::header::{CACHE_CONTROL, EXPIRES};
    use http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_discovery_document() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/.well-known/oauth").await;

        response.assert_ok();
        assert_eq!(
            response.headers[CONTENT_TYPE],
            "application/json; charset=UTF-8"
        );
        assert_eq!(
            response.json,
            json!({
                "auth_endpoint": format!(
                    "{}/auth/realms/demo/protocol/openid-connect/auth",
                    fixture.keycloak_mock.uri()
                ),
                "default_redirect_uri": "http://bridge.example.com/oauth2/default_redirect_uri",
                "flows": ["Authorization Code Grant", "Resource Owner Password Credentials Grant"],
                "token_endpoint": format!(
                    "{}/auth/realms/demo/protocol/openid-connect/token",
                    fixture.keycloak_mock.uri()
                ),
                "version": "2.0",
            })
        );
    }

    #[tokio::test]
    async fn test_discovery_keys_are_sorted_and_stable() {
        let fixture = TestFixture::new().await;
        let first = fixture.get("/.well-known/oauth").await;
        let second = fixture.get("/.well-known/oauth").await;

        assert_eq!(first.body, second.body);
        let positions: Vec<usize> = [
            "\"auth_endpoint\"",
            "\"default_redirect_uri\"",
            "\"flows\"",
            "\"token_endpoint\"",
            "\"version\"",
        ]
        .iter()
        .map(|key| first.body.find(key).expect("key present"))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_discovery_cache_headers() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/.well-known/oauth").await;

        assert_eq!(response.headers[CACHE_CONTROL], "public, max-age=604800");
        assert!(response.headers.contains_key(EXPIRES));
    }

    #[tokio::test]
    async fn test_discovery_cached_per_host() {
        let fixture = TestFixture::new().await;
        fixture.get("/.well-known/oauth").await.assert_ok();
        let other = fixture
            .get_with_headers("/.well-known/oauth", &[("Host", "other.example.com")])
            .await;

        assert_eq!(
            other.json["default_redirect_uri"],
            "http://other.example.com/oauth2/default_redirect_uri"
        );
        fixture.state.discovery_cache.run_pending_tasks().await;
        assert_eq!(fixture.state.discovery_cache.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_discovery_rejects_other_methods() {
        let fixture = TestFixture::new().await;
        let response = fixture.request(Method::POST, "/.well-known/oauth", &[]).await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }
}
