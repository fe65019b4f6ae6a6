use crate::errors::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::HeaderMap;
use keycloak_identity::AuthenticationError;
use log::{debug, warn};

/// Authenticates `Authorization: Bearer <token>` requests and stores the
/// resulting `AuthenticatedUser` in the request extensions.
pub(super) async fn authentication_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        warn!("Missing or malformed bearer Authorization header");
        return ApiError::unauthorized().into_response();
    };

    match state.authenticator.authenticate_bearer(&token).await {
        Ok(user) => {
            debug!("Authenticated bearer request for '{}'", user.user.username);
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => {
            if let AuthenticationError::Identity(inner) = &err {
                warn!("Failed to resolve bearer identity: {}", inner);
            }
            ApiError::from(err).into_response()
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
