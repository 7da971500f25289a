//! Lambda@Edge events through the edge handler.
//!
//! One deployed function serves every path of the distribution; settings
//! beyond the compiled-in defaults come from the parameter blob.

mod common;

use cognito_edge_auth::config::EdgeSettings;
use cognito_edge_auth::handler::EdgeHandler;
use cognito_edge_auth::params::StaticParameterStore;
use cognito_edge_auth::types::EdgeResult;
use common::*;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::Mock;

fn edge_handler(server: &wiremock::MockServer) -> EdgeHandler<StaticParameterStore> {
    EdgeHandler::new(edge_store(server), EdgeSettings::default())
}

/// `Cookie` header a browser would send back for these `Set-Cookie` values.
fn cookie_header(set_cookies: &[&str]) -> String {
    set_cookies
        .iter()
        .map(|c| {
            let (name, value) = cookie_pair(c);
            format!("{name}={value}")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[tokio::test]
async fn test_sign_in_round_trip_through_one_function() {
    let server = start_idp().await;
    let handler = edge_handler(&server);

    // Protected page: check-auth sends the browser to the hosted UI
    let resp = expect_response(handler.handle(viewer_event("/reports", "id=7", None)).await);
    assert_eq!(resp.status, "307");
    let location = resp.header("location").unwrap().to_string();
    let state = query_param(&location, "state").unwrap();
    let set_cookies = resp.set_cookies();
    let pkce = set_cookies
        .iter()
        .map(|c| cookie_pair(c))
        .find(|(name, _)| name.ends_with(".pkce"))
        .unwrap()
        .1
        .to_string();

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .and(body_string_contains(format!("code_verifier={pkce}")))
        .respond_with(token_response("alice", true))
        .expect(1)
        .mount(&server)
        .await;

    // Callback on the same function: routed to parse-auth by path
    let callback = viewer_event(
        "/signin",
        &format!("code=abc123&state={state}"),
        Some(&cookie_header(&set_cookies)),
    );
    let resp = expect_response(handler.handle(callback).await);
    assert_eq!(resp.status, "307");
    assert_eq!(resp.header("location"), Some("/reports?id=7"));
    assert_eq!(resp.set_cookies().len(), 6);

    // Back on the protected page the request passes through untouched
    let id_token = resp
        .set_cookies()
        .iter()
        .map(|c| cookie_pair(c))
        .find(|(name, _)| name.ends_with(".alice.idToken"))
        .unwrap()
        .1
        .to_string();
    let event = viewer_event(
        "/reports",
        "id=7",
        Some(&token_cookie("alice", "idToken", &id_token)),
    );
    let result = handler.handle(event).await;
    let EdgeResult::Request(request) = &result else {
        panic!("expected pass-through, got {result:?}");
    };
    assert_eq!(request.uri, "/reports");
    assert_eq!(
        serde_json::to_value(&result).unwrap()["clientIp"],
        json!("203.0.113.178")
    );
}

#[tokio::test]
async fn test_callback_event_reaches_parse_auth() {
    let server = start_idp().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(token_response("alice", true))
        .expect(0)
        .mount(&server)
        .await;
    let handler = edge_handler(&server);

    // Without CSRF cookies parse-auth refuses before exchanging the code;
    // check-auth would have redirected instead
    let resp = expect_response(
        handler
            .handle(viewer_event("/signin", "code=abc123&state=xyz", None))
            .await,
    );
    assert_eq!(resp.status, "400");
    assert!(resp.body.unwrap().contains("nonce cookie"));
}

#[tokio::test]
async fn test_sign_out_event_uses_blob_logout_settings() {
    let server = start_idp().await;
    let handler = edge_handler(&server);

    let resp = expect_response(handler.handle(viewer_event("/signout", "", None)).await);
    assert_eq!(resp.status, "307");
    assert_eq!(resp.header("location"), Some("/goodbye"));
}

#[tokio::test]
async fn test_event_response_wire_shape() {
    let server = start_idp().await;
    let handler = edge_handler(&server);

    let result = handler.handle(viewer_event("/api/files", "", None)).await;
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({"status": "401", "statusDescription": "Unauthorized"})
    );
}
