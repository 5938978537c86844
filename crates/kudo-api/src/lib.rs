//! The verification web surface. A shared link lands here: one click
//! flips the matching job to verified, anything after that is a no-op.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use kudo_db::Database;
use kudo_types::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
}

const VERIFY_OK: &str = "✅ Verification successful. Bot will now process your like.";
const VERIFY_FAIL: &str = "❌ Link expired or already used.";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/verify/{code}", get(verify))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /verify/{code}: no auth, no body; the response is a human-readable
/// string either way.
async fn verify(State(state): State<AppState>, Path(code): Path<String>) -> &'static str {
    match state
        .db
        .confirm_job(&code, Utc::now(), state.config.enforce_link_expiry)
    {
        Ok(true) => {
            info!("verification code confirmed");
            VERIFY_OK
        }
        Ok(false) => VERIFY_FAIL,
        Err(e) => {
            warn!("verification lookup failed: {e:#}");
            VERIFY_FAIL
        }
    }
}

async fn health() -> &'static str {
    "ok"
}
