/**
 * Router Configuration
 *
 * Combines the realtime routes and the API routes into one router.
 *
 * # Route Order
 *
 * 1. Realtime routes (`/ws`, `/realtime/stats`)
 * 2. API routes (`/diagrams/...`)
 * 3. Fallback handler (404)
 *
 * Every request passes through `TraceLayer`.
 */

use crate::backend::realtime::{Fanout, FanoutSnapshot};
use crate::backend::routes::api_routes::configure_api_routes;
use crate::backend::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Create the Axum router with all routes configured
///
/// # Realtime Routes
///
/// - `GET /ws` - WebSocket subscription to one diagram
/// - `GET /realtime/stats` - fanout counters
pub fn create_router(app_state: AppState) -> Router<()> {
    let router = Router::new()
        .route(
            "/ws",
            axum::routing::get({
                use crate::backend::realtime::socket::handle_socket_upgrade;
                handle_socket_upgrade
            }),
        )
        .route("/realtime/stats", axum::routing::get(realtime_stats));

    let router = configure_api_routes(router);

    let router = router.fallback(|| async { (StatusCode::NOT_FOUND, "404 Not Found") });

    router
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state)
}

async fn realtime_stats(State(fanout): State<Fanout>) -> Json<FanoutSnapshot> {
    Json(fanout.stats())
}
