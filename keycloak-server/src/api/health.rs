use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Health report. Component statuses are flattened next to `status` as
/// `<component>_status` keys.
#[derive(Debug, Serialize, ToSchema)]
pub struct Health {
    status: &'static str,
    #[serde(flatten)]
    components: BTreeMap<String, String>,
}

impl Health {
    fn ok() -> Self {
        Self {
            status: "ok",
            components: BTreeMap::new(),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn component(&mut self, name: &str, result: Result<(), String>) {
        let status = match result {
            Ok(()) => "healthy".to_string(),
            Err(e) => {
                warn!("{} is not ready: {}", name, e);
                self.status = "error";
                format!("unhealthy: {e}")
            }
        };
        self.components.insert(format!("{name}_status"), status);
    }
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        let status_code = if self.is_ok() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status_code, Json(self)).into_response()
    }
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is alive", body = Health)
    )
)]
pub(crate) async fn health_check() -> Health {
    Health::ok()
}

/// Readiness check covering the identity and session stores
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is ready", body = Health),
        (status = 503, description = "A backing store is unavailable", body = Health)
    )
)]
pub(crate) async fn ready_check(State(state): State<AppState>) -> Health {
    let mut health = Health::ok();
    health.component("identity_store", state.identity_store.health_check().await);
    health.component("session_store", state.sessions.health_check().await);
    health
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
}
