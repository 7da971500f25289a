//! Parameter-store resolution of the user-pool settings.
//!
//! Edge functions cannot carry environment variables, so the user pool id,
//! app client id/secret and hosted-UI domain are fetched from SSM once per
//! execution environment. Two layouts are supported:
//!
//! - `Json`: one parameter `/{prefix}/authentication-gateway-config` holding
//!   `{"userPoolId", "appClientId", "appClientSecret", "userPoolDomain"}`
//!   plus any [`DistributionSettings`] keys
//! - `Discrete`: one parameter per value under `/{prefix}/cognito/userpool/`

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::cookie::{CookieSettingsOverrides, SameSite};

/// User-pool settings resolved at cold start.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayParameters {
    pub user_pool_id: String,
    pub app_client_id: String,
    #[serde(default)]
    pub app_client_secret: Option<String>,
    pub user_pool_domain: String,
    #[serde(flatten)]
    pub distribution: DistributionSettings,
}

/// Per-distribution settings carried in the JSON blob. Unset keys keep the
/// compiled-in [`crate::config::EdgeSettings`] value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSettings {
    /// Region of the user pool.
    pub region: Option<String>,
    pub same_site: Option<SameSite>,
    pub cookie_domain: Option<String>,
    pub cookie_settings_overrides: Option<CookieSettingsOverrides>,
    pub parse_auth_path: Option<String>,
    pub csrf_protection: Option<bool>,
    pub nonce_signing_secret: Option<String>,
    pub logout_path: Option<String>,
    pub logout_redirect_path: Option<String>,
    pub unauthorized_path_prefixes: Option<Vec<String>>,
    pub cookie_version_tag: Option<String>,
    pub jwks_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterLayout {
    Json,
    Discrete,
}

pub fn json_parameter_name(prefix: &str) -> String {
    format!("/{prefix}/authentication-gateway-config")
}

/// Names for the discrete layout: (pool id, client id, domain, client secret).
pub fn discrete_parameter_names(prefix: &str) -> [String; 4] {
    [
        format!("/{prefix}/cognito/userpool/id"),
        format!("/{prefix}/cognito/userpool/client/id"),
        format!("/{prefix}/cognito/userpool/domain"),
        format!("/{prefix}/cognito/userpool/client/secret"),
    ]
}

/// Read-only key/value parameter store.
///
/// Implementations must be `Send + Sync`; the store is shared by every
/// invocation in an execution environment.
pub trait ParameterStore: Send + Sync {
    fn get_parameter(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<String, ParameterError>> + Send;
}

/// AWS Systems Manager Parameter Store.
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

impl ParameterStore for SsmParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, ParameterError> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_parameter_not_found())
                {
                    ParameterError::NotFound(name.to_string())
                } else {
                    ParameterError::Store(e.to_string())
                }
            })?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(String::from)
            .ok_or_else(|| ParameterError::NotFound(name.to_string()))
    }
}

/// In-process store for local development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticParameterStore {
    values: HashMap<String, String>,
}

impl StaticParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Store holding a JSON-layout blob built from `COGNITO_*` env vars.
    pub fn from_env(prefix: &str) -> Self {
        let var = |key: &str| std::env::var(key).unwrap_or_default();
        let blob = serde_json::json!({
            "userPoolId": var("COGNITO_USER_POOL_ID"),
            "appClientId": var("COGNITO_CLIENT_ID"),
            "appClientSecret": var("COGNITO_CLIENT_SECRET"),
            "userPoolDomain": var("COGNITO_DOMAIN"),
        });
        Self::new().with(json_parameter_name(prefix), blob.to_string())
    }
}

impl ParameterStore for StaticParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, ParameterError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ParameterError::NotFound(name.to_string()))
    }
}

/// Store selected at startup.
///
/// `ParameterStore` uses RPITIT and is not object-safe, so dispatch is
/// done by hand.
pub enum AnyParameterStore {
    Ssm(SsmParameterStore),
    Static(StaticParameterStore),
}

impl ParameterStore for AnyParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, ParameterError> {
        match self {
            AnyParameterStore::Ssm(s) => s.get_parameter(name).await,
            AnyParameterStore::Static(s) => s.get_parameter(name).await,
        }
    }
}

/// Resolve the user-pool settings, bounded by `timeout`. Not retried.
pub async fn resolve_gateway_parameters<S: ParameterStore>(
    store: &S,
    prefix: &str,
    layout: ParameterLayout,
    timeout: Duration,
) -> Result<GatewayParameters, ParameterError> {
    tokio::time::timeout(timeout, resolve(store, prefix, layout))
        .await
        .map_err(|_| ParameterError::Timeout)?
}

async fn resolve<S: ParameterStore>(
    store: &S,
    prefix: &str,
    layout: ParameterLayout,
) -> Result<GatewayParameters, ParameterError> {
    match layout {
        ParameterLayout::Json => {
            let name = json_parameter_name(prefix);
            let blob = store.get_parameter(&name).await?;
            serde_json::from_str(&blob).map_err(|e| ParameterError::InvalidJson {
                name,
                reason: e.to_string(),
            })
        }
        ParameterLayout::Discrete => {
            let [pool_id, client_id, domain, secret] = discrete_parameter_names(prefix);
            let (user_pool_id, app_client_id, user_pool_domain, app_client_secret) = tokio::join!(
                store.get_parameter(&pool_id),
                store.get_parameter(&client_id),
                store.get_parameter(&domain),
                store.get_parameter(&secret),
            );
            let app_client_secret = match app_client_secret {
                Ok(s) => Some(s),
                Err(ParameterError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
            Ok(GatewayParameters {
                user_pool_id: user_pool_id?,
                app_client_id: app_client_id?,
                app_client_secret,
                user_pool_domain: user_pool_domain?,
                distribution: DistributionSettings::default(),
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("parameter not found: {0}")]
    NotFound(String),

    #[error("parameter store request failed: {0}")]
    Store(String),

    #[error("parameter {name} is not valid gateway JSON: {reason}")]
    InvalidJson { name: String, reason: String },

    #[error("parameter store request timed out")]
    Timeout,
}
