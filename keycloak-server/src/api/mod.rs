mod authn_middleware;
pub(crate) mod context;
pub(crate) mod discovery;
pub(crate) mod health;
pub(crate) mod login;
pub(crate) mod logout;

use crate::api::authn_middleware::authentication_middleware;
use crate::session::{cookie, Session};
use crate::state::AppState;
use axum::{middleware, Router};
use http::header::HOST;
use http::HeaderMap;
use log::warn;

pub(crate) const SOCIAL_BEGIN_PATH: &str = "/oauth/login/keycloak";
pub(crate) const SOCIAL_COMPLETE_PATH: &str = "/oauth/complete/keycloak";
pub(crate) const DEFAULT_REDIRECT_PATH: &str = "/oauth2/default_redirect_uri";

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(discovery::router())
        .merge(login::router())
        .merge(logout::router())
        .merge(protected_routes(state))
}

/// Creates a router for routes that require bearer authentication
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(context::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authentication_middleware,
        ))
}

/// Host the request was addressed to, as sent in the `Host` header
pub(crate) fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Absolute base URL of this service for the current request
pub(crate) fn base_url(headers: &HeaderMap) -> String {
    let scheme = match headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
    {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    };
    format!("{}://{}", scheme, request_host(headers))
}

/// Redirect target taken from a `next` parameter. Only local paths are
/// accepted; anything else falls back to `/`.
pub(crate) fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

/// Session referenced by the request's session cookie, if still alive
pub(crate) async fn current_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Option<(String, Session)> {
    let session_id = cookie::extract_cookie(headers, &state.config.session.cookie_name)?;
    match state.sessions.load(&session_id).await {
        Ok(Some(session)) => Some((session_id, session)),
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to load session: {}", e);
            None
        }
    }
}
