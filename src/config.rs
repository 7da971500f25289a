//! Gateway configuration.
//!
//! Two layers: [`EdgeSettings`] are static deployment settings (compiled in
//! for Lambda@Edge, read from the environment by the local gateway, with
//! defaults matching the file-share distribution), and
//! [`AuthenticatorConfig`] is the immutable per-process configuration built
//! once the user-pool parameters have been resolved from the parameter store.
//! Settings carried in the parameter blob take precedence over both.

use std::env;
use std::time::Duration;

use crate::cookie::{CookieOverride, CookieSettingsOverrides, CookieError, SameSite};
use crate::params::{DistributionSettings, GatewayParameters, ParameterLayout};

pub const DEFAULT_VERSION_TAG: &str = "dev";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Enables nonce/PKCE cookies and a signed `state` on the OAuth round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfProtection {
    pub nonce_signing_secret: String,
}

/// Sign-out endpoint and the page users land on afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutConfiguration {
    /// Request path that triggers sign-out, e.g. `/signout`.
    pub logout_path: String,
    /// Path on this distribution the IdP redirects to after logout.
    pub logout_redirect_path: String,
}

/// Static deployment settings.
#[derive(Debug, Clone)]
pub struct EdgeSettings {
    pub region: String,
    pub app_prefix: String,
    pub parameter_layout: ParameterLayout,
    pub same_site: SameSite,
    pub cookie_domain: Option<String>,
    pub cookie_settings_overrides: CookieSettingsOverrides,
    pub parse_auth_path: String,
    pub csrf_protection: Option<CsrfProtection>,
    pub logout: Option<LogoutConfiguration>,
    pub unauthorized_path_prefixes: Vec<String>,
    pub version_tag: String,
    pub http_timeout: Duration,
    pub jwks_url: Option<String>,
    pub port: u16,
    pub origin_dir: Option<String>,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        let app_prefix = "fileshare".to_string();
        Self {
            region: "eu-west-1".into(),
            parameter_layout: ParameterLayout::Json,
            same_site: SameSite::Lax,
            cookie_domain: None,
            cookie_settings_overrides: default_cookie_overrides(),
            parse_auth_path: "signin".into(),
            csrf_protection: Some(CsrfProtection {
                nonce_signing_secret: app_prefix.clone(),
            }),
            logout: None,
            unauthorized_path_prefixes: vec!["/api/".into()],
            version_tag: DEFAULT_VERSION_TAG.into(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            jwks_url: None,
            port: 3001,
            origin_dir: None,
            app_prefix,
        }
    }
}

/// accessToken 30 min on `/api`, idToken 30 min, refreshToken 8 h.
fn default_cookie_overrides() -> CookieSettingsOverrides {
    CookieSettingsOverrides {
        access_token: Some(CookieOverride {
            expiration_seconds: Some(1800),
            path: Some("/api".into()),
            ..Default::default()
        }),
        id_token: Some(CookieOverride {
            expiration_seconds: Some(1800),
            path: Some("/".into()),
            ..Default::default()
        }),
        refresh_token: Some(CookieOverride {
            expiration_seconds: Some(28800),
            path: Some("/".into()),
            ..Default::default()
        }),
    }
}

impl EdgeSettings {
    /// Settings for a Lambda@Edge deployment.
    ///
    /// Edge functions get no environment, so the parameter prefix and region
    /// are fixed at build time (`EDGE_APP_PREFIX`, `EDGE_PARAMETER_REGION`,
    /// `EDGE_PARAMETER_LAYOUT`). Everything else comes from the parameter
    /// blob, see [`DistributionSettings`].
    pub fn for_edge() -> Self {
        let defaults = Self::default();
        let app_prefix = option_env!("EDGE_APP_PREFIX")
            .map(String::from)
            .unwrap_or(defaults.app_prefix);
        Self {
            region: option_env!("EDGE_PARAMETER_REGION")
                .map(String::from)
                .unwrap_or(defaults.region),
            parameter_layout: match option_env!("EDGE_PARAMETER_LAYOUT") {
                Some("discrete") => ParameterLayout::Discrete,
                _ => ParameterLayout::Json,
            },
            csrf_protection: Some(CsrfProtection {
                nonce_signing_secret: app_prefix.clone(),
            }),
            app_prefix,
            ..defaults
        }
    }

    /// Overlay the settings carried in the parameter blob.
    pub fn with_distribution(&self, dist: &DistributionSettings) -> Self {
        let mut settings = self.clone();
        if let Some(region) = &dist.region {
            settings.region = region.clone();
        }
        if let Some(same_site) = dist.same_site {
            settings.same_site = same_site;
        }
        if let Some(domain) = dist.cookie_domain.as_ref().filter(|d| !d.is_empty()) {
            settings.cookie_domain = Some(domain.clone());
        }
        if let Some(overrides) = &dist.cookie_settings_overrides {
            settings.cookie_settings_overrides = overrides.clone();
        }
        if let Some(path) = &dist.parse_auth_path {
            settings.parse_auth_path = path.clone();
        }
        match (dist.csrf_protection, &dist.nonce_signing_secret) {
            (Some(false), _) => settings.csrf_protection = None,
            (_, Some(secret)) => {
                settings.csrf_protection = Some(CsrfProtection {
                    nonce_signing_secret: secret.clone(),
                });
            }
            (Some(true), None) if settings.csrf_protection.is_none() => {
                settings.csrf_protection = Some(CsrfProtection {
                    nonce_signing_secret: settings.app_prefix.clone(),
                });
            }
            _ => {}
        }
        if let Some(logout_path) = &dist.logout_path {
            settings.logout = Some(LogoutConfiguration {
                logout_path: with_leading_slash(logout_path),
                logout_redirect_path: with_leading_slash(
                    dist.logout_redirect_path.as_deref().unwrap_or("/"),
                ),
            });
        }
        if let Some(prefixes) = &dist.unauthorized_path_prefixes {
            settings.unauthorized_path_prefixes = prefixes.clone();
        }
        if let Some(tag) = &dist.cookie_version_tag {
            settings.version_tag = tag.clone();
        }
        if let Some(url) = dist.jwks_url.as_ref().filter(|u| !u.is_empty()) {
            settings.jwks_url = Some(url.clone());
        }
        settings
    }

    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let app_prefix = env::var("APP_PREFIX").unwrap_or(defaults.app_prefix);

        let same_site = match env::var("SAME_SITE") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.same_site,
        };

        let parameter_layout = match env::var("PARAMETER_LAYOUT").as_deref() {
            Ok("json") | Err(_) => ParameterLayout::Json,
            Ok("discrete") => ParameterLayout::Discrete,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    key: "PARAMETER_LAYOUT",
                    reason: format!("expected json or discrete, got {other:?}"),
                });
            }
        };

        let cookie_settings_overrides = match env::var("COOKIE_SETTINGS_OVERRIDES") {
            Ok(json) => serde_json::from_str(&json).map_err(|e| ConfigError::Invalid {
                key: "COOKIE_SETTINGS_OVERRIDES",
                reason: e.to_string(),
            })?,
            Err(_) => defaults.cookie_settings_overrides,
        };

        let csrf_enabled = env::var("CSRF_PROTECTION").map_or(true, |v| v != "false" && v != "0");
        let csrf_protection = csrf_enabled.then(|| CsrfProtection {
            nonce_signing_secret: env::var("NONCE_SIGNING_SECRET")
                .unwrap_or_else(|_| app_prefix.clone()),
        });

        let logout = match (env::var("LOGOUT_PATH"), env::var("LOGOUT_REDIRECT_PATH")) {
            (Ok(logout_path), redirect) => Some(LogoutConfiguration {
                logout_path: with_leading_slash(&logout_path),
                logout_redirect_path: with_leading_slash(&redirect.unwrap_or_else(|_| "/".into())),
            }),
            _ => None,
        };

        let unauthorized_path_prefixes = match env::var("UNAUTHORIZED_PATH_PREFIXES") {
            Ok(v) => v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            Err(_) => defaults.unauthorized_path_prefixes,
        };

        let http_timeout = match env::var("HTTP_TIMEOUT_SECS") {
            Ok(v) => Duration::from_secs(v.parse().map_err(|_| ConfigError::Invalid {
                key: "HTTP_TIMEOUT_SECS",
                reason: format!("not a number: {v:?}"),
            })?),
            Err(_) => defaults.http_timeout,
        };

        Ok(Self {
            region: env::var("COGNITO_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .unwrap_or(defaults.region),
            parameter_layout,
            same_site,
            cookie_domain: env::var("COOKIE_DOMAIN").ok().filter(|d| !d.is_empty()),
            cookie_settings_overrides,
            parse_auth_path: env::var("PARSE_AUTH_PATH").unwrap_or(defaults.parse_auth_path),
            csrf_protection,
            logout,
            unauthorized_path_prefixes,
            version_tag: env::var("COOKIE_VERSION_TAG").unwrap_or(defaults.version_tag),
            http_timeout,
            jwks_url: env::var("JWKS_URL").ok().filter(|u| !u.is_empty()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            origin_dir: env::var("ORIGIN_DIR").ok().filter(|d| !d.is_empty()),
            app_prefix,
        })
    }
}

/// Immutable configuration of one [`crate::authenticator::Authenticator`].
#[derive(Debug, Clone)]
pub struct AuthenticatorConfig {
    pub region: String,
    pub user_pool_id: String,
    pub app_client_id: String,
    pub app_client_secret: Option<String>,
    pub user_pool_domain: String,
    pub same_site: SameSite,
    pub cookie_domain: Option<String>,
    pub cookie_settings_overrides: CookieSettingsOverrides,
    /// Callback path without leading slash, e.g. `signin`.
    pub parse_auth_path: String,
    pub csrf_protection: Option<CsrfProtection>,
    pub logout: Option<LogoutConfiguration>,
    pub unauthorized_path_prefixes: Vec<String>,
    pub version_tag: String,
    pub http_timeout: Duration,
    pub jwks_url: Option<String>,
}

impl AuthenticatorConfig {
    /// Combine static settings with resolved user-pool parameters.
    pub fn from_parts(
        settings: &EdgeSettings,
        params: GatewayParameters,
    ) -> Result<Self, ConfigError> {
        let settings = &settings.with_distribution(&params.distribution);
        let config = Self {
            region: settings.region.clone(),
            user_pool_id: params.user_pool_id,
            app_client_id: params.app_client_id,
            app_client_secret: params.app_client_secret.filter(|s| !s.is_empty()),
            user_pool_domain: params.user_pool_domain,
            same_site: settings.same_site,
            cookie_domain: settings.cookie_domain.clone(),
            cookie_settings_overrides: settings.cookie_settings_overrides.clone(),
            parse_auth_path: settings.parse_auth_path.trim_start_matches('/').to_string(),
            csrf_protection: settings.csrf_protection.clone(),
            logout: settings.logout.clone(),
            unauthorized_path_prefixes: settings.unauthorized_path_prefixes.clone(),
            version_tag: settings.version_tag.clone(),
            http_timeout: settings.http_timeout,
            jwks_url: settings.jwks_url.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations missing a required field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("region", &self.region),
            ("userPoolId", &self.user_pool_id),
            ("appClientId", &self.app_client_id),
            ("userPoolDomain", &self.user_pool_domain),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field));
            }
        }
        if let Some(csrf) = &self.csrf_protection
            && csrf.nonce_signing_secret.is_empty()
        {
            return Err(ConfigError::MissingField("nonceSigningSecret"));
        }
        Ok(())
    }

    /// Prefix shared by every auth cookie: `{versionTag}.{appClientId}`.
    pub fn cookie_base(&self) -> String {
        format!("{}.{}", self.version_tag, self.app_client_id)
    }

    /// Cognito OIDC issuer URL.
    pub fn cognito_issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    /// JWKS endpoint URL.
    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("{}/.well-known/jwks.json", self.cognito_issuer()))
    }

    /// Hosted-UI base URL. A domain that already carries a scheme is used
    /// as-is.
    pub fn user_pool_base_url(&self) -> String {
        let domain = self.user_pool_domain.trim_end_matches('/');
        if domain.starts_with("https://") || domain.starts_with("http://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.user_pool_base_url())
    }

    pub fn revoke_url(&self) -> String {
        format!("{}/oauth2/revoke", self.user_pool_base_url())
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/oauth2/authorize", self.user_pool_base_url())
    }

    pub fn logout_url(&self) -> String {
        format!("{}/logout", self.user_pool_base_url())
    }

    /// Callback URL registered with the app client.
    pub fn parse_auth_redirect_uri(&self, host: &str) -> String {
        format!("https://{}/{}", host, self.parse_auth_path)
    }

    /// Path attribute for the CSRF cookies.
    pub fn parse_auth_cookie_path(&self) -> String {
        format!("/{}", self.parse_auth_path)
    }
}

/// Configuration for testing: all fields settable directly.
impl AuthenticatorConfig {
    pub fn test_default() -> Self {
        Self {
            region: "us-west-2".into(),
            user_pool_id: "us-west-2_test123".into(),
            app_client_id: "test-client-id".into(),
            app_client_secret: None,
            user_pool_domain: "test.auth.us-west-2.amazoncognito.com".into(),
            same_site: SameSite::Lax,
            cookie_domain: None,
            cookie_settings_overrides: CookieSettingsOverrides::default(),
            parse_auth_path: "signin".into(),
            csrf_protection: Some(CsrfProtection {
                nonce_signing_secret: "test-signing-secret".into(),
            }),
            logout: None,
            unauthorized_path_prefixes: vec!["/api/".into()],
            version_tag: DEFAULT_VERSION_TAG.into(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            jwks_url: None,
        }
    }
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration field: {0}")]
    MissingField(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(transparent)]
    Cookie(#[from] CookieError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
