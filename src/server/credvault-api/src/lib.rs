//! # Credvault API
//!
//! REST layer over the credential store.
//!
//! ## Endpoints
//!
//! - `GET    /api/credentials` - list credential metadata
//! - `POST   /api/credentials` - store a credential
//! - `GET    /api/credentials/{credential_id}` - credential metadata
//! - `DELETE /api/credentials/{credential_id}` - delete a credential
//! - `POST   /api/credentials/check-agent` - credentials an agent requires
//! - `GET    /api/health` - liveness
//!
//! Secret values are accepted on write and never returned.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credentials;
pub mod error;
pub mod state;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

pub use credentials::register_routes;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    register_routes(Router::new())
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
