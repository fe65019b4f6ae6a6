use crate::api::{
    base_url, current_session, safe_next, DEFAULT_REDIRECT_PATH, SOCIAL_BEGIN_PATH,
    SOCIAL_COMPLETE_PATH,
};
use crate::errors::ApiError;
use crate::headers::{set_cookie, CachePolicy};
use crate::openapi::OAUTH_TAG;
use crate::session::cookie;
use crate::state::AppState;
use axum::{
    extract::{Query, RawQuery, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use http::{HeaderMap, StatusCode};
use log::{error, info, warn};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct NextQuery {
    /// Local path to continue to
    next: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct CompleteQuery {
    /// Authorization code issued by Keycloak
    code: Option<String>,
    /// State issued when the login started
    state: Option<String>,
    /// Error reported by Keycloak instead of a code
    error: Option<String>,
}

/// Login entry point: continue to `next` when already logged in, otherwise
/// start the Keycloak login keeping the original query string.
#[utoipa::path(
    get,
    path = "/login",
    tag = OAUTH_TAG,
    params(NextQuery),
    responses(
        (status = 303, description = "Redirect to `next` or to the Keycloak login")
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<NextQuery>,
) -> Response {
    if current_session(&state, &headers).await.is_some() {
        return Redirect::to(&safe_next(params.next.as_deref())).into_response();
    }

    let target = match raw_query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{SOCIAL_BEGIN_PATH}?{query}"),
        None => SOCIAL_BEGIN_PATH.to_string(),
    };
    Redirect::to(&target).into_response()
}

/// Start the authorization code flow
#[utoipa::path(
    get,
    path = "/oauth/login/keycloak",
    tag = OAUTH_TAG,
    params(NextQuery),
    responses(
        (status = 303, description = "Redirect to the Keycloak authorization endpoint"),
        (status = 500, description = "Login state could not be stored")
    )
)]
pub(crate) async fn social_begin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<NextQuery>,
) -> Result<Response, ApiError> {
    let login_state = cookie::generate_token();
    let next = safe_next(params.next.as_deref());
    state
        .sessions
        .save_login_state(&login_state, &next)
        .await
        .map_err(|e| {
            error!("Failed to store login state: {}", e);
            ApiError::internal("Failed to start login")
        })?;

    let redirect_uri = format!("{}{}", base_url(&headers), SOCIAL_COMPLETE_PATH);
    let url = state
        .backend()
        .authorization_redirect(&redirect_uri, &login_state);
    Ok(Redirect::to(url.as_str()).into_response())
}

/// Finish the authorization code flow and open a session
#[utoipa::path(
    get,
    path = "/oauth/complete/keycloak",
    tag = OAUTH_TAG,
    params(CompleteQuery),
    responses(
        (status = 303, description = "Logged in, redirect to the stored `next`"),
        (status = 400, description = "Missing, unknown or expired login state"),
        (status = 401, description = "Tokens returned by Keycloak did not verify"),
        (status = 403, description = "Keycloak reported an error"),
        (status = 502, description = "Token exchange failed")
    )
)]
pub(crate) async fn social_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CompleteQuery>,
) -> Result<Response, ApiError> {
    if let Some(err) = params.error {
        warn!("Keycloak returned an authorization error: {}", err);
        return Err(ApiError::new(
            "Login was rejected by the identity provider",
            StatusCode::FORBIDDEN,
        ));
    }
    let (Some(code), Some(login_state)) = (params.code, params.state) else {
        return Err(ApiError::bad_request("Missing code or state"));
    };

    let pending = state
        .sessions
        .take_login_state(&login_state)
        .await
        .map_err(|e| {
            error!("Failed to read login state: {}", e);
            ApiError::internal("Failed to complete login")
        })?
        .ok_or_else(|| {
            warn!("Login completed with an unknown or expired state");
            ApiError::bad_request("Invalid or expired login state")
        })?;

    let redirect_uri = format!("{}{}", base_url(&headers), SOCIAL_COMPLETE_PATH);
    let tokens = state.backend().exchange_code(&code, &redirect_uri).await?;
    let authenticated = state.authenticator.complete_login(&tokens).await?;

    let session_config = &state.config.session;
    if let Some(previous) = cookie::extract_cookie(&headers, &session_config.cookie_name) {
        if let Err(e) = state.sessions.destroy(&previous).await {
            warn!("Failed to drop previous session: {}", e);
        }
    }
    let session_id = state
        .sessions
        .create(&authenticated.user)
        .await
        .map_err(|e| {
            error!("Failed to create session: {}", e);
            ApiError::internal("Failed to complete login")
        })?;
    info!("User '{}' logged in", authenticated.user.username);

    let session_cookie = cookie::session_cookie(
        &session_config.cookie_name,
        &session_id,
        state.sessions.ttl().as_secs(),
        session_config.cookie_secure,
    );
    let mut response = Redirect::to(&pending.next).into_response();
    set_cookie(&mut response, &session_cookie);
    CachePolicy::NoStore.apply(&mut response);
    Ok(response)
}

/// Landing page for clients registered with the default redirect URI
#[utoipa::path(
    get,
    path = "/oauth2/default_redirect_uri",
    tag = OAUTH_TAG,
    responses(
        (status = 200, description = "Landing page", content_type = "text/html")
    )
)]
pub(crate) async fn default_redirect_uri() -> Html<&'static str> {
    Html(concat!(
        "<!DOCTYPE html>\n",
        "<html><head><meta charset=\"utf-8\"><title>Authorization complete</title></head>\n",
        "<body><p>Authorization complete. You can close this window.</p></body></html>\n",
    ))
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route(SOCIAL_BEGIN_PATH, get(social_begin))
        .route(SOCIAL_COMPLETE_PATH, get(social_complete))
        .route(DEFAULT_REDIRECT_PATH, get(default_redirect_uri))
}
