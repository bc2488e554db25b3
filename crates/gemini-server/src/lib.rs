pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use gemini_bridge::Bridge;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(bridge: Arc<Bridge>) -> Router {
    let app_state = state::AppState::new(bridge);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::health::root))
        .route("/api/ask", post(routes::ask::ask))
        // Gemini-compatible surface
        .route("/v1beta/models/{model}", post(routes::models::generate_content))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(app_state)
}

/// Start the API server on a pre-bound listener.
///
/// The caller binds so it can read the actual port first (useful when
/// `port = 0` and the OS picks a free one). Returns after a graceful
/// shutdown on Ctrl-C, once the bridge has released the CLI.
pub async fn serve_on(listener: tokio::net::TcpListener, bridge: Arc<Bridge>) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(bridge.clone());

    tracing::info!(
        strategy = bridge.strategy().as_str(),
        "Gemini wrapper API listening on http://localhost:{actual_port}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bridge.shutdown().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
