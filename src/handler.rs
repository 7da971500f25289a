//! Edge entrypoints.
//!
//! An [`EdgeHandler`] is created once per execution environment. The first
//! invocation resolves the user-pool parameters and builds the
//! [`Authenticator`]; later invocations reuse it. A failed resolution is not
//! cached, so the next invocation tries again.

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::authenticator::{Authenticator, Outcome};
use crate::config::{AuthenticatorConfig, ConfigError, EdgeSettings};
use crate::params::{ParameterError, ParameterStore, resolve_gateway_parameters};
use crate::types::{EdgeEvent, EdgeRequest, EdgeResponse, EdgeResult};

/// Which edge function a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFunction {
    CheckAuth,
    ParseAuth,
    SignOut,
}

impl EdgeFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeFunction::CheckAuth => "check-auth",
            EdgeFunction::ParseAuth => "parse-auth",
            EdgeFunction::SignOut => "sign-out",
        }
    }
}

impl EdgeFunction {
    /// Which edge function handles a request for `path`: the callback path
    /// goes to parse-auth, the logout path to sign-out, everything else to
    /// check-auth.
    pub fn for_path(path: &str, config: &AuthenticatorConfig) -> Self {
        if path.strip_prefix('/') == Some(config.parse_auth_path.as_str()) {
            return EdgeFunction::ParseAuth;
        }
        if config
            .logout
            .as_ref()
            .is_some_and(|logout| path == logout.logout_path)
        {
            return EdgeFunction::SignOut;
        }
        EdgeFunction::CheckAuth
    }
}

pub struct EdgeHandler<S: ParameterStore> {
    store: S,
    settings: EdgeSettings,
    authenticator: OnceCell<Arc<Authenticator>>,
}

impl<S: ParameterStore> EdgeHandler<S> {
    pub fn new(store: S, settings: EdgeSettings) -> Self {
        Self {
            store,
            settings,
            authenticator: OnceCell::new(),
        }
    }

    /// Use an already-built authenticator; the parameter store is never read.
    pub fn with_authenticator(store: S, settings: EdgeSettings, authenticator: Authenticator) -> Self {
        Self {
            store,
            settings,
            authenticator: OnceCell::new_with(Some(Arc::new(authenticator))),
        }
    }

    pub fn settings(&self) -> &EdgeSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.authenticator.initialized()
    }

    /// Handle a Lambda@Edge event, routed by request path.
    pub async fn handle(&self, event: EdgeEvent) -> EdgeResult {
        match event.into_request() {
            Some(request) => self.handle_routed(request).await,
            None => {
                tracing::error!("edge event carried no request record");
                EdgeResult::Response(EdgeResponse::bad_request("Malformed edge event"))
            }
        }
    }

    /// Run whichever edge function the resolved configuration assigns to the
    /// request path.
    pub async fn handle_routed(&self, request: EdgeRequest) -> EdgeResult {
        match self.authenticator().await {
            Ok(authenticator) => {
                let function = EdgeFunction::for_path(&request.uri, authenticator.config());
                run(authenticator, function, request).await
            }
            Err(err) => {
                tracing::error!(error = %err, path = %request.uri, "authenticator unavailable");
                EdgeResult::Response(EdgeResponse::internal_error())
            }
        }
    }

    /// Run one edge function against a viewer request.
    pub async fn handle_request(&self, function: EdgeFunction, request: EdgeRequest) -> EdgeResult {
        match self.authenticator().await {
            Ok(authenticator) => run(authenticator, function, request).await,
            Err(err) => {
                tracing::error!(error = %err, function = function.as_str(), "authenticator unavailable");
                EdgeResult::Response(EdgeResponse::internal_error())
            }
        }
    }

    async fn authenticator(&self) -> Result<&Arc<Authenticator>, HandlerError> {
        self.authenticator
            .get_or_try_init(|| async {
                tracing::info!(
                    prefix = %self.settings.app_prefix,
                    "resolving gateway parameters"
                );
                let params = resolve_gateway_parameters(
                    &self.store,
                    &self.settings.app_prefix,
                    self.settings.parameter_layout,
                    self.settings.http_timeout,
                )
                .await?;
                let config = AuthenticatorConfig::from_parts(&self.settings, params)?;
                Ok::<_, HandlerError>(Arc::new(Authenticator::from_config(config)?))
            })
            .await
    }
}

async fn run(authenticator: &Authenticator, function: EdgeFunction, request: EdgeRequest) -> EdgeResult {
    let outcome = match function {
        EdgeFunction::CheckAuth => authenticator.handle_check_auth(request).await,
        EdgeFunction::ParseAuth => authenticator.handle_parse_auth(&request).await,
        EdgeFunction::SignOut => authenticator.handle_sign_out(&request).await,
    };
    log_outcome(function, &outcome);
    outcome.into_result()
}

fn log_outcome(function: EdgeFunction, outcome: &Outcome) {
    let result = match outcome {
        Outcome::PassThrough(_) => "pass-through",
        Outcome::Redirect { .. } => "redirect",
        Outcome::Unauthorized => "unauthorized",
        Outcome::BadRequest(_) => "bad-request",
    };
    tracing::debug!(function = function.as_str(), result, "edge request handled");
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("failed to resolve gateway parameters: {0}")]
    Parameter(#[from] ParameterError),

    #[error("invalid authenticator configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogoutConfiguration;
    use crate::params::{StaticParameterStore, json_parameter_name};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BLOB: &str = r#"{"userPoolId":"eu-west-1_pool","appClientId":"client","userPoolDomain":"auth.example.com"}"#;

    /// Counts reads; the first `fail_first` reads fail.
    struct CountingStore {
        reads: AtomicUsize,
        fail_first: usize,
    }

    impl ParameterStore for CountingStore {
        async fn get_parameter(&self, name: &str) -> Result<String, ParameterError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(ParameterError::Store("throttled".into()))
            } else if name == json_parameter_name("fileshare") {
                Ok(BLOB.into())
            } else {
                Err(ParameterError::NotFound(name.into()))
            }
        }
    }

    fn request(uri: &str) -> EdgeRequest {
        EdgeRequest::new(uri, "").with_header("Host", "d111.cloudfront.net")
    }

    fn status(result: &EdgeResult) -> &str {
        match result {
            EdgeResult::Response(resp) => &resp.status,
            EdgeResult::Request(_) => "pass-through",
        }
    }

    #[test]
    fn test_edge_function_for_path() {
        let config = AuthenticatorConfig {
            logout: Some(LogoutConfiguration {
                logout_path: "/signout".into(),
                logout_redirect_path: "/".into(),
            }),
            ..AuthenticatorConfig::test_default()
        };
        assert_eq!(EdgeFunction::for_path("/signin", &config), EdgeFunction::ParseAuth);
        assert_eq!(EdgeFunction::for_path("/signout", &config), EdgeFunction::SignOut);
        assert_eq!(EdgeFunction::for_path("/signin/x", &config), EdgeFunction::CheckAuth);
        assert_eq!(EdgeFunction::for_path("/", &config), EdgeFunction::CheckAuth);

        let no_logout = AuthenticatorConfig::test_default();
        assert_eq!(EdgeFunction::for_path("/signout", &no_logout), EdgeFunction::CheckAuth);
    }

    #[tokio::test]
    async fn test_parameters_resolved_once() {
        let handler = EdgeHandler::new(
            CountingStore {
                reads: AtomicUsize::new(0),
                fail_first: 0,
            },
            EdgeSettings::default(),
        );
        assert!(!handler.is_initialized());

        for _ in 0..3 {
            let result = handler
                .handle_request(EdgeFunction::CheckAuth, request("/api/x"))
                .await;
            assert_eq!(status(&result), "401");
        }
        assert!(handler.is_initialized());
        assert_eq!(handler.store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_is_500_and_retried() {
        let handler = EdgeHandler::new(
            CountingStore {
                reads: AtomicUsize::new(0),
                fail_first: 1,
            },
            EdgeSettings::default(),
        );

        let first = handler
            .handle_request(EdgeFunction::CheckAuth, request("/api/x"))
            .await;
        assert_eq!(status(&first), "500");
        assert!(!handler.is_initialized());

        let second = handler
            .handle_request(EdgeFunction::CheckAuth, request("/api/x"))
            .await;
        assert_eq!(status(&second), "401");
        assert_eq!(handler.store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_parameters_are_500() {
        let store = StaticParameterStore::new().with(
            json_parameter_name("fileshare"),
            r#"{"userPoolId":"","appClientId":"client","userPoolDomain":"auth.example.com"}"#,
        );
        let handler = EdgeHandler::new(store, EdgeSettings::default());
        let result = handler
            .handle_request(EdgeFunction::ParseAuth, request("/signin"))
            .await;
        let EdgeResult::Response(resp) = result else {
            panic!("expected response");
        };
        assert_eq!(resp.status, "500");
        assert_eq!(resp.body.as_deref(), Some("Internal Server Error"));
    }

    #[tokio::test]
    async fn test_routes_by_path_using_blob_settings() {
        let store = StaticParameterStore::new().with(
            json_parameter_name("fileshare"),
            r#"{"userPoolId":"eu-west-1_pool","appClientId":"client","userPoolDomain":"auth.example.com",
                "parseAuthPath":"callback","logoutPath":"/bye","logoutRedirectPath":"/home"}"#,
        );
        let handler = EdgeHandler::new(store, EdgeSettings::default());

        let EdgeResult::Response(resp) = handler.handle_routed(request("/bye")).await else {
            panic!("expected sign-out redirect");
        };
        assert_eq!(resp.header("location"), Some("/home"));

        let callback = handler.handle_routed(request("/callback")).await;
        assert_eq!(status(&callback), "400");

        // the compiled-in callback path is no longer special
        let EdgeResult::Response(resp) = handler.handle_routed(request("/signin")).await else {
            panic!("expected sign-in redirect");
        };
        assert!(
            resp.header("location")
                .unwrap()
                .starts_with("https://auth.example.com/oauth2/authorize?")
        );
    }

    #[tokio::test]
    async fn test_empty_event_is_rejected() {
        let handler = EdgeHandler::new(StaticParameterStore::new(), EdgeSettings::default());
        let event: EdgeEvent = serde_json::from_str(r#"{"Records":[]}"#).unwrap();
        let result = handler.handle(event).await;
        assert_eq!(status(&result), "400");
    }
}
