//! Fallback route: runs the edge functions in front of a local origin.
//!
//! Routing by path is the same as at the edge, see
//! [`crate::handler::EdgeFunction::for_path`]. Pass-through requests are
//! served from `ORIGIN_DIR` when configured.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::types::{EdgeRequest, EdgeResponse, EdgeResult, HeaderEntry};

pub async fn gateway(State(state): State<Arc<crate::AppState>>, req: Request) -> Response {
    let edge_request = to_edge_request(&req);

    match state.handler.handle_routed(edge_request).await {
        EdgeResult::Response(resp) => into_http_response(resp),
        EdgeResult::Request(_) => {
            serve_origin(state.handler.settings().origin_dir.as_deref(), req).await
        }
    }
}

/// Convert a plain HTTP request into the edge request shape.
pub fn to_edge_request(req: &Request) -> EdgeRequest {
    let mut edge = EdgeRequest::new(req.uri().path(), req.uri().query().unwrap_or_default());
    for (name, value) in req.headers() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        edge.headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(HeaderEntry::new(name.as_str(), value));
    }
    edge.rest
        .insert("method".into(), req.method().as_str().into());
    edge
}

/// Convert a synthetic edge response into an HTTP response.
pub fn into_http_response(resp: EdgeResponse) -> Response {
    let status = resp
        .status
        .parse::<u16>()
        .ok()
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = Response::new(Body::from(resp.body.unwrap_or_default()));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, entries) in resp.headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!(header = %name, "dropping invalid header name");
            continue;
        };
        for entry in entries {
            match HeaderValue::from_str(&entry.value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => tracing::warn!(header = %name, "dropping invalid header value"),
            }
        }
    }
    response
}

async fn serve_origin(origin_dir: Option<&str>, req: Request) -> Response {
    match origin_dir {
        Some(dir) => match ServeDir::new(dir).oneshot(req).await {
            Ok(resp) => resp.into_response(),
            Err(never) => match never {},
        },
        None => (StatusCode::OK, "Authenticated").into_response(),
    }
}
