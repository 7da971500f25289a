//! Dual-mode entrypoint: Lambda@Edge function or local dev gateway.
//!
//! Detects Lambda runtime via `AWS_LAMBDA_RUNTIME_API` env var.
//! - Lambda: `lambda_runtime::run` on viewer-request events with compiled-in
//!   settings; the edge function is chosen by request path
//! - Local: `axum::serve(listener, app)` with settings from the environment

#![recursion_limit = "256"]

use std::env;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

use cognito_edge_auth::config::EdgeSettings;
use cognito_edge_auth::handler::EdgeHandler;
use cognito_edge_auth::params::{AnyParameterStore, SsmParameterStore, StaticParameterStore};
use cognito_edge_auth::types::EdgeEvent;
use cognito_edge_auth::{AppState, create_app};
use lambda_runtime::{LambdaEvent, service_fn};

#[tokio::main]
async fn main() {
    let is_lambda = env::var("AWS_LAMBDA_RUNTIME_API").is_ok();

    // Init tracing: JSON for Lambda, pretty for local
    if is_lambda {
        fmt()
            .json()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    } else {
        // Load .env for local dev
        let _ = dotenvy::dotenv();
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    if is_lambda {
        // Lambda@Edge passes no environment to the function
        let settings = EdgeSettings::for_edge();
        let store = AnyParameterStore::Ssm(ssm_store(&settings.region).await);
        let handler = Arc::new(EdgeHandler::new(store, settings));

        tracing::info!("Starting in Lambda mode");
        lambda_runtime::run(service_fn(move |event: LambdaEvent<EdgeEvent>| {
            let handler = handler.clone();
            async move { Ok::<_, lambda_runtime::Error>(handler.handle(event.payload).await) }
        }))
        .await
        .expect("Lambda runtime error");
    } else {
        let settings = EdgeSettings::from_env().expect("Failed to load configuration");

        // Parameters from COGNITO_* env vars unless told to use SSM
        let store = if env::var("PARAMETER_SOURCE").as_deref() == Ok("ssm") {
            tracing::info!("Using SSM parameter store");
            AnyParameterStore::Ssm(ssm_store(&settings.region).await)
        } else {
            tracing::info!("Using parameters from environment");
            AnyParameterStore::Static(StaticParameterStore::from_env(&settings.app_prefix))
        };

        let addr = format!("0.0.0.0:{}", settings.port);
        let state = Arc::new(AppState {
            handler: EdgeHandler::new(store, settings),
        });
        let app = create_app(state);

        tracing::info!("Starting local gateway on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind");
        axum::serve(listener, app).await.expect("Server error");
    }
}

async fn ssm_store(region: &str) -> SsmParameterStore {
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await;
    SsmParameterStore::new(aws_sdk_ssm::Client::new(&sdk_config))
}
