//! Cognito Edge Auth: OAuth2/OIDC authentication gateway for CloudFront.
//!
//! The same edge handler runs as a Lambda@Edge function or behind a local
//! Axum server. Detection via `AWS_LAMBDA_RUNTIME_API` env var.

pub mod authenticator;
pub mod cognito;
pub mod config;
pub mod cookie;
pub mod csrf;
pub mod error;
pub mod handler;
pub mod ocsf;
pub mod params;
pub mod routes;
pub mod types;

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handler::EdgeHandler;
use crate::params::AnyParameterStore;

/// Shared application state available to all route handlers.
pub struct AppState {
    pub handler: EdgeHandler<AnyParameterStore>,
}

/// Build the local gateway router.
///
/// `/health` is answered directly; every other path goes through the edge
/// functions.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", axum::routing::get(routes::health::health))
        .fallback(routes::gateway::gateway)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
