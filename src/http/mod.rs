//! HTTP API module.
//!
//! Two routers: the public API (queue operations plus cluster status/join)
//! and the internal raft RPC listener. Queue-targeted routes sit behind a
//! leader-redirect middleware; `/ping` and `/raft/status` answer on every
//! node.

mod cluster;
mod queues;
mod types;

#[cfg(test)]
mod tests;

use axum::{
    http::{header, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub use types::AppState;

/// Create CORS layer based on environment configuration.
/// Set CORS_ALLOW_ORIGIN for production (comma-separated list of origins);
/// unset allows all origins.
fn create_cors_layer() -> CorsLayer {
    match std::env::var("CORS_ALLOW_ORIGIN").ok() {
        Some(origins) if !origins.is_empty() && origins != "*" => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        }
        _ => CorsLayer::permissive(),
    }
}

/// Public API router.
pub fn create_router(state: AppState) -> Router {
    let leader_routes = Router::new()
        .route("/createQueue", post(queues::create_queue))
        .route("/sendMessage", post(queues::send_message))
        .route("/peekMessage", get(queues::peek_message))
        .route("/popMessage", delete(queues::pop_message))
        .route("/requeueMessage", post(queues::requeue_message))
        .route("/viewAllMessages", get(queues::view_all_messages))
        .route("/raft/join", post(cluster::join))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            cluster::leader_redirect,
        ));

    Router::new()
        .route("/ping", get(queues::ping))
        .route("/raft/status", get(cluster::status))
        .merge(leader_routes)
        .layer(create_cors_layer())
        .with_state(state)
}

/// Internal raft RPC router, bound to the raft port.
pub fn create_raft_router(state: AppState) -> Router {
    Router::new()
        .route("/raft/append-entries", post(cluster::append_entries))
        .route("/raft/install-snapshot", post(cluster::install_snapshot))
        .route("/raft/vote", post(cluster::vote))
        .with_state(state)
}
