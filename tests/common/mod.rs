//! Test utilities: RSA keypair, JWT factory, wiremock identity provider,
//! authenticator and app builders.

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cognito_edge_auth::authenticator::Authenticator;
use cognito_edge_auth::config::{AuthenticatorConfig, EdgeSettings, LogoutConfiguration};
use cognito_edge_auth::handler::EdgeHandler;
use cognito_edge_auth::params::{AnyParameterStore, StaticParameterStore, json_parameter_name};
use cognito_edge_auth::types::{EdgeEvent, EdgeRequest, EdgeResponse, EdgeResult};
use cognito_edge_auth::{AppState, create_app};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ISSUER: &str = "https://cognito-idp.us-west-2.amazonaws.com/us-west-2_test123";
pub const CLIENT_ID: &str = "test-client-id";
pub const HOST: &str = "d111.cloudfront.net";
pub const COOKIE_BASE: &str = "dev.test-client-id";

/// Test RSA keypair for signing JWTs.
pub struct TestKeys {
    pub private_key: RsaPrivateKey,
    pub kid: String,
}

impl TestKeys {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate key");
        Self {
            private_key,
            kid: "test-key-1".into(),
        }
    }

    /// Build a signed JWT with the given claims.
    pub fn sign_jwt(&self, claims: &serde_json::Value) -> String {
        self.sign_jwt_with_kid(claims, &self.kid)
    }

    /// Sign with this key but advertise `kid` in the header.
    pub fn sign_jwt_with_kid(&self, claims: &serde_json::Value, kid: &str) -> String {
        let der = self
            .private_key
            .to_pkcs1_der()
            .expect("failed to encode private key");
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_der(der.as_bytes());

        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = Some(kid.to_string());

        jsonwebtoken::encode(&header, claims, &encoding_key).expect("failed to sign JWT")
    }

    /// JWKS document publishing this key under `kid`.
    pub fn jwks_json_with_kid(&self, kid: &str) -> serde_json::Value {
        let n = self.private_key.n().to_bytes_be();
        let e = self.private_key.e().to_bytes_be();
        json!({
            "keys": [{
                "kid": kid,
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "n": URL_SAFE_NO_PAD.encode(&n),
                "e": URL_SAFE_NO_PAD.encode(&e)
            }]
        })
    }

    /// Build JWKS JSON response for wiremock.
    pub fn jwks_json(&self) -> serde_json::Value {
        self.jwks_json_with_kid(&self.kid)
    }
}

/// Keys shared by every test in a binary; 2048-bit generation is slow.
pub fn test_keys() -> &'static TestKeys {
    static KEYS: OnceLock<TestKeys> = OnceLock::new();
    KEYS.get_or_init(TestKeys::generate)
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Standard ID-token claims for `username`.
pub fn id_claims(username: &str) -> serde_json::Value {
    let exp = now_secs() + 3600;
    json!({
        "sub": format!("sub-{username}"),
        "cognito:username": username,
        "email": format!("{username}@example.com"),
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "exp": exp,
        "iat": exp - 3600,
        "token_use": "id"
    })
}

/// ID-token claims that expired long ago.
pub fn expired_claims(username: &str) -> serde_json::Value {
    let mut claims = id_claims(username);
    claims["exp"] = json!(1000);
    claims["iat"] = json!(900);
    claims
}

pub fn valid_id_token(username: &str) -> String {
    test_keys().sign_jwt(&id_claims(username))
}

pub fn expired_id_token(username: &str) -> String {
    test_keys().sign_jwt(&expired_claims(username))
}

/// Start a mock identity provider serving JWKS at `/jwks.json`.
pub async fn start_idp() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_keys().jwks_json()))
        .mount(&server)
        .await;
    server
}

/// Token endpoint response carrying freshly signed tokens for `username`.
pub fn token_response(username: &str, with_refresh: bool) -> ResponseTemplate {
    let mut body = json!({
        "id_token": valid_id_token(username),
        "access_token": format!("access-{username}"),
        "token_type": "Bearer",
        "expires_in": 3600
    });
    if with_refresh {
        body["refresh_token"] = json!(format!("refresh-{username}"));
    }
    ResponseTemplate::new(200).set_body_json(body)
}

/// Authenticator config pointed at the mock identity provider.
pub fn idp_config(server: &MockServer) -> AuthenticatorConfig {
    AuthenticatorConfig {
        user_pool_domain: server.uri(),
        jwks_url: Some(format!("{}/jwks.json", server.uri())),
        logout: Some(LogoutConfiguration {
            logout_path: "/signout".into(),
            logout_redirect_path: "/goodbye".into(),
        }),
        ..AuthenticatorConfig::test_default()
    }
}

pub fn build_authenticator(config: AuthenticatorConfig) -> Authenticator {
    Authenticator::from_config(config).expect("valid test config")
}

/// Settings matching `AuthenticatorConfig::test_default`, resolving the user
/// pool from a static store that points at the mock identity provider.
pub fn idp_settings(server: &MockServer) -> EdgeSettings {
    EdgeSettings {
        region: "us-west-2".into(),
        app_prefix: "fileshare".into(),
        jwks_url: Some(format!("{}/jwks.json", server.uri())),
        logout: Some(LogoutConfiguration {
            logout_path: "/signout".into(),
            logout_redirect_path: "/goodbye".into(),
        }),
        ..EdgeSettings::default()
    }
}

pub fn idp_store(server: &MockServer) -> StaticParameterStore {
    let blob = json!({
        "userPoolId": "us-west-2_test123",
        "appClientId": CLIENT_ID,
        "userPoolDomain": server.uri(),
    });
    StaticParameterStore::new().with(json_parameter_name("fileshare"), blob.to_string())
}

/// Store whose JSON blob also carries the distribution settings, the way an
/// edge deployment is configured.
pub fn edge_store(server: &MockServer) -> StaticParameterStore {
    let blob = json!({
        "userPoolId": "us-west-2_test123",
        "appClientId": CLIENT_ID,
        "userPoolDomain": server.uri(),
        "region": "us-west-2",
        "jwksUrl": format!("{}/jwks.json", server.uri()),
        "logoutPath": "/signout",
        "logoutRedirectPath": "/goodbye",
    });
    StaticParameterStore::new().with(json_parameter_name("fileshare"), blob.to_string())
}

/// Lambda@Edge viewer-request event as delivered by CloudFront.
pub fn viewer_event(uri: &str, querystring: &str, cookie: Option<&str>) -> EdgeEvent {
    let mut headers = json!({
        "host": [{"key": "Host", "value": HOST}],
    });
    if let Some(cookie) = cookie {
        headers["cookie"] = json!([{"key": "Cookie", "value": cookie}]);
    }
    serde_json::from_value(json!({
        "Records": [{
            "cf": {
                "config": {"distributionId": "EDFDVBD6EXAMPLE", "eventType": "viewer-request"},
                "request": {
                    "clientIp": "203.0.113.178",
                    "method": "GET",
                    "uri": uri,
                    "querystring": querystring,
                    "headers": headers,
                }
            }
        }]
    }))
    .expect("valid viewer event")
}

/// Build the local gateway app resolving parameters from `store`.
pub fn build_test_app(
    store: StaticParameterStore,
    settings: EdgeSettings,
) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState {
        handler: EdgeHandler::new(AnyParameterStore::Static(store), settings),
    });
    (create_app(state.clone()), state)
}

/// Viewer request for `uri` on the test host.
pub fn viewer_request(uri: &str, querystring: &str) -> EdgeRequest {
    EdgeRequest::new(uri, querystring).with_header("Host", HOST)
}

pub fn token_cookie(username: &str, kind: &str, value: &str) -> String {
    format!("{COOKIE_BASE}.{username}.{kind}={value}")
}

/// Unwrap a synthetic response.
pub fn expect_response(result: EdgeResult) -> EdgeResponse {
    match result {
        EdgeResult::Response(resp) => resp,
        EdgeResult::Request(req) => panic!("expected a response, request passed through: {req:?}"),
    }
}

/// `name=value` of a `Set-Cookie` header value.
pub fn cookie_pair(set_cookie: &str) -> (&str, &str) {
    let pair = set_cookie.split(';').next().unwrap_or_default();
    pair.split_once('=').unwrap_or((pair, ""))
}

/// Value of a query parameter in a URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
