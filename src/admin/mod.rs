//! Admin API.
//!
//! # Responsibilities
//! - Expose relay stats, presence and per-client details over HTTP
//! - Let operators broadcast, raise emergencies and pause the relay
//!
//! # Design Decisions
//! - Every handler goes through the [`RelayHandle`], so the engine stays
//!   the only writer
//! - A single bearer token guards every route
//! - Bound to loopback by default and disabled unless configured

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::AdminConfig;
use crate::relay::RelayHandle;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub relay: RelayHandle,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/presence", get(get_presence))
        .route("/admin/clients/{id}", get(get_client))
        .route("/admin/broadcast", post(post_broadcast))
        .route("/admin/emergency", post(post_emergency))
        .route("/admin/pause", post(post_pause).delete(delete_pause))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API on an already-bound listener until shutdown.
pub async fn serve(
    listener: TcpListener,
    config: &AdminConfig,
    relay: RelayHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let state = AdminState {
        relay,
        api_key: Arc::from(config.api_key.as_str()),
    };
    let app = setup_admin_router(state);

    tracing::info!(address = %listener.local_addr()?, "Admin API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
