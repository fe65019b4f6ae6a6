use crate::errors::ApiError;
use crate::openapi::API_TAG;
use crate::state::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use keycloak_identity::{AuthenticatedUser, KeycloakBackend};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identity of the caller as seen by the platform
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct UserContext {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    /// Names of every group the user belongs to, sorted
    pub groups: Vec<String>,
    /// Base URL of the Keycloak server
    pub idm_server: String,
    /// Whether a Keycloak access token is stored for the user
    pub idm_token_available: bool,
}

#[utoipa::path(
    get,
    path = "/api/context",
    tag = API_TAG,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Authenticated user context", body = UserContext),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
pub(crate) async fn user_context(
    State(state): State<AppState>,
    Extension(authenticated): Extension<AuthenticatedUser>,
) -> Result<Json<UserContext>, ApiError> {
    let user = authenticated.user;
    let mut groups: Vec<String> = state
        .identity_store
        .memberships(user.id)
        .await
        .map_err(|e| {
            error!("Failed to list groups of '{}': {}", user.username, e);
            ApiError::internal("Failed to load user groups")
        })?
        .into_iter()
        .map(|membership| membership.group.name)
        .collect();
    groups.sort();

    let idm_token_available =
        user.social.provider == KeycloakBackend::NAME && user.social.extra_data.access_token.is_some();

    Ok(Json(UserContext {
        username: user.username,
        email: user.email,
        full_name: user.full_name,
        first_name: user.first_name,
        last_name: user.last_name,
        is_superuser: user.is_superuser,
        is_staff: user.is_staff,
        groups,
        idm_server: state.config.keycloak.server.clone(),
        idm_token_available,
    }))
}

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/api/context", get(user_context))
}
