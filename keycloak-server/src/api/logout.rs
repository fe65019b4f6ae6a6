use crate::api::{current_session, request_host, safe_next};
use crate::headers::{allow_credentialed_origin, set_cookie, CachePolicy};
use crate::openapi::AUTH_TAG;
use crate::session::cookie;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use http::header::ORIGIN;
use http::{HeaderMap, StatusCode};
use log::{info, warn};
use serde::Deserialize;
use url::Url;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct LogoutQuery {
    /// Local path to continue to after a same-origin logout
    next: Option<String>,
}

/// `Origin` header of a cross-origin request, exactly as sent. `None` for
/// same-origin requests or requests without an `Origin` header.
fn cross_origin(headers: &HeaderMap) -> Option<String> {
    let origin = headers.get(ORIGIN)?.to_str().ok()?.trim();
    if origin.is_empty() || origin == "null" {
        return None;
    }
    if is_request_host(origin, &request_host(headers)) {
        None
    } else {
        Some(origin.to_string())
    }
}

/// Whether `origin` names `host`, with default ports made explicit on both
/// sides. A `Host` without a port takes the default of the origin's scheme.
fn is_request_host(origin: &str, host: &str) -> bool {
    let Ok(origin) = Url::parse(origin) else {
        return false;
    };
    let Ok(target) = Url::parse(&format!("{}://{}", origin.scheme(), host)) else {
        return false;
    };
    origin.host_str().is_some()
        && origin.host_str() == target.host_str()
        && origin.port_or_known_default() == target.port_or_known_default()
}

/// Whether `origin` is on the allow-list, ignoring a trailing slash
fn is_allowed(allowed_origins: &[String], origin: &str) -> bool {
    let origin = origin.trim_end_matches('/');
    allowed_origins.iter().any(|allowed| allowed == origin)
}

/// Terminate the browser session.
///
/// Same-origin requests are redirected to `next`. Cross-origin requests from
/// an allowed origin get a credentialed CORS response; any other origin is
/// refused without touching the session.
#[utoipa::path(
    get,
    path = "/logout",
    tag = AUTH_TAG,
    params(LogoutQuery),
    responses(
        (status = 200, description = "Logged out (allowed cross-origin request)"),
        (status = 303, description = "Logged out, redirect to `next`"),
        (status = 403, description = "Cross-origin request from an origin that is not allowed")
    )
)]
pub(crate) async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LogoutQuery>,
) -> Response {
    let origin = cross_origin(&headers);
    if let Some(origin) = &origin {
        if !is_allowed(&state.allowed_origins, origin) {
            warn!("Refused cross-origin logout from {}", origin);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    if let Some((session_id, session)) = current_session(&state, &headers).await {
        match state.sessions.destroy(&session_id).await {
            Ok(()) => info!("User '{}' logged out", session.username),
            Err(e) => warn!("Failed to destroy session: {}", e),
        }
    }

    let session_config = &state.config.session;
    let clear = cookie::clear_session_cookie(&session_config.cookie_name, session_config.cookie_secure);

    let mut response = match &origin {
        Some(_) => StatusCode::OK.into_response(),
        None => Redirect::to(&safe_next(params.next.as_deref())).into_response(),
    };
    set_cookie(&mut response, &clear);
    CachePolicy::NoStore.apply(&mut response);
    if let Some(origin) = origin {
        allow_credentialed_origin(&mut response, &origin);
    }
    response
}

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/logout", get(logout))
}
