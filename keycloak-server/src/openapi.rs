use crate::state::AppState;
use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::OpenApi as OpenApiDoc;
use utoipa::{Modify, OpenApi};

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const OAUTH_TAG: &str = "OAuth API";
pub(crate) const AUTH_TAG: &str = "Session API";
pub(crate) const API_TAG: &str = "Platform API";

/// Registers the bearer scheme used by the protected routes
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut OpenApiDoc) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::health_check,
        crate::api::health::ready_check,
        crate::api::discovery::oauth_discovery,
        crate::api::login::login,
        crate::api::login::social_begin,
        crate::api::login::social_complete,
        crate::api::login::default_redirect_uri,
        crate::api::logout::logout,
        crate::api::context::user_context,
    ),
    components(schemas(
        crate::api::health::Health,
        crate::api::discovery::OAuthDiscovery,
        crate::api::context::UserContext,
    )),
    modifiers(&BearerSecurity),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = OAUTH_TAG, description = "OAuth2 discovery and Keycloak login flow"),
        (name = AUTH_TAG, description = "Browser session endpoints"),
        (name = API_TAG, description = "Bearer-protected platform endpoints"),
    ),
    info(
        title = "Keycloak Bridge API",
        description = "Keycloak bearer authentication and role synchronization",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

/// Creates a router serving the OpenAPI document
pub(crate) fn router(doc: OpenApiDoc) -> Router<AppState> {
    Router::new().route(
        "/openapi.json",
        get(move || {
            let doc = doc.clone();
            async move { Json(doc) }
        }),
    )
}
