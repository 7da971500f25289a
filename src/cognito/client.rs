//! Cognito OAuth2 client: code exchange, refresh and revocation.
//!
//! All calls are form-encoded POSTs against the hosted-UI domain. When the
//! app client has a secret it is sent as HTTP Basic credentials; public
//! clients only send `client_id` in the body. Failures are never retried.

use serde::Deserialize;

use crate::config::AuthenticatorConfig;

/// Tokens returned by the token endpoint.
///
/// `refresh_token` is only present on authorization-code grants.
#[derive(Clone, PartialEq, Eq)]
pub struct Tokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for Tokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokens")
            .field("id_token", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// HTTP client for the identity provider, with the configured timeout.
pub fn build_http_client(config: &AuthenticatorConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
}

/// Exchange an OAuth authorization code for tokens.
///
/// POST to `{domain}/oauth2/token` with grant_type=authorization_code.
pub async fn fetch_tokens_from_code(
    http_client: &reqwest::Client,
    config: &AuthenticatorConfig,
    redirect_uri: &str,
    code: &str,
    code_verifier: Option<&str>,
) -> Result<Tokens, CognitoError> {
    let mut params = vec![
        ("client_id", config.app_client_id.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
        ("redirect_uri", redirect_uri),
    ];
    if let Some(verifier) = code_verifier {
        params.push(("code_verifier", verifier));
    }

    let body: TokenEndpointResponse = post_form(http_client, config, &config.token_url(), &params)
        .await?
        .json()
        .await
        .map_err(|e| CognitoError::RequestFailed(e.to_string()))?;

    Ok(Tokens {
        id_token: body.id_token.ok_or(CognitoError::MissingToken("id_token"))?,
        access_token: body
            .access_token
            .ok_or(CognitoError::MissingToken("access_token"))?,
        refresh_token: body.refresh_token,
    })
}

/// Fetch fresh id/access tokens with a refresh token.
///
/// The refresh token is never rotated: any `refresh_token` in the response
/// is ignored and the browser keeps its existing cookie.
pub async fn fetch_tokens_from_refresh_token(
    http_client: &reqwest::Client,
    config: &AuthenticatorConfig,
    redirect_uri: &str,
    refresh_token: &str,
) -> Result<Tokens, CognitoError> {
    let params = [
        ("client_id", config.app_client_id.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
        ("redirect_uri", redirect_uri),
    ];

    let body: TokenEndpointResponse = post_form(http_client, config, &config.token_url(), &params)
        .await?
        .json()
        .await
        .map_err(|e| CognitoError::RequestFailed(e.to_string()))?;

    Ok(Tokens {
        id_token: body.id_token.ok_or(CognitoError::MissingToken("id_token"))?,
        access_token: body
            .access_token
            .ok_or(CognitoError::MissingToken("access_token"))?,
        refresh_token: None,
    })
}

/// Revoke a refresh token (and the access tokens minted from it).
///
/// POST to `{domain}/oauth2/revoke`.
pub async fn revoke_tokens(
    http_client: &reqwest::Client,
    config: &AuthenticatorConfig,
    refresh_token: &str,
) -> Result<(), CognitoError> {
    let params = [
        ("client_id", config.app_client_id.as_str()),
        ("token", refresh_token),
    ];
    post_form(http_client, config, &config.revoke_url(), &params).await?;
    Ok(())
}

async fn post_form(
    http_client: &reqwest::Client,
    config: &AuthenticatorConfig,
    url: &str,
    params: &[(&str, &str)],
) -> Result<reqwest::Response, CognitoError> {
    let mut request = http_client
        .post(url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(params);
    if let Some(secret) = &config.app_client_secret {
        request = request.basic_auth(&config.app_client_id, Some(secret));
    }

    let resp = request.send().await.map_err(|e| {
        if e.is_timeout() {
            CognitoError::Timeout
        } else {
            CognitoError::RequestFailed(e.to_string())
        }
    })?;

    // Capture status before consuming the body
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(CognitoError::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

#[derive(Debug, thiserror::Error)]
pub enum CognitoError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("request to identity provider timed out")]
    Timeout,

    #[error("identity provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("token response is missing {0}")]
    MissingToken(&'static str),
}
