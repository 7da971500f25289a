//! ID-token verification and JWKS cache.
//!
//! Verification is RS256 against the user pool's published keys, checking
//! issuer, audience, expiry and `token_use == "id"`. The authenticator only
//! depends on the [`IdTokenVerifier`] trait.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::AuthenticatorConfig;

/// Claims read from a Cognito ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "cognito:username", default)]
    pub cognito_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub iss: Option<String>,
    pub aud: Option<String>,
    pub exp: Option<u64>,
    pub iat: Option<u64>,
    pub token_use: Option<String>,
}

impl Claims {
    /// Username used to namespace token cookies.
    pub fn username(&self) -> &str {
        self.cognito_username.as_deref().unwrap_or(&self.sub)
    }
}

/// Verifies an ID token and returns its claims.
pub trait IdTokenVerifier: Send + Sync {
    fn verify(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Claims, JwtError>> + Send;
}

/// JWKS key entry from Cognito's /.well-known/jwks.json
#[derive(Debug, Clone, Deserialize)]
pub struct JwkKey {
    pub kid: String,
    pub kty: String,
    pub n: String,
    pub e: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(rename = "use", default)]
    pub key_use: Option<String>,
}

/// JWKS response from Cognito.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<JwkKey>,
}

/// Minimum spacing between refetches triggered by an unrecognised `kid`.
pub const FORCED_REFETCH_COOLDOWN: Duration = Duration::from_secs(60);

const KEY_SET_TTL: Duration = Duration::from_secs(3600);

struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    key_set: Option<KeySet>,
    last_forced_refetch: Option<Instant>,
}

/// The user pool's signing keys, refreshed hourly.
///
/// A `kid` missing from a fresh key set triggers at most one refetch per
/// [`FORCED_REFETCH_COOLDOWN`]; inside the cooldown it is rejected outright.
/// Replacing the key set never drops keys other requests are verifying with.
pub struct JwksCache {
    state: RwLock<CacheState>,
    jwks_url: String,
    http_client: reqwest::Client,
}

impl JwksCache {
    pub fn new(http_client: reqwest::Client, jwks_url: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            jwks_url: jwks_url.into(),
            http_client,
        }
    }

    /// Decoding key for `kid`.
    pub async fn key(&self, kid: &str) -> Result<DecodingKey, JwtError> {
        {
            let state = self.state.read().await;
            if let Some(key_set) = state.fresh_key_set() {
                if let Some(key) = key_set.keys.get(kid) {
                    return Ok(key.clone());
                }
                if !state.may_force_refetch() {
                    return Err(JwtError::KeyNotFound(kid.to_string()));
                }
            }
        }

        // Fetches are serialised behind the write lock; re-check what a
        // concurrent fetch may already have stored.
        let mut state = self.state.write().await;
        if let Some(key_set) = state.fresh_key_set() {
            if let Some(key) = key_set.keys.get(kid) {
                return Ok(key.clone());
            }
            if !state.may_force_refetch() {
                return Err(JwtError::KeyNotFound(kid.to_string()));
            }
            tracing::info!(kid, "unknown signing key, refetching JWKS");
            state.last_forced_refetch = Some(Instant::now());
        }

        let keys = self.fetch().await?;
        let key = keys.get(kid).cloned();
        state.key_set = Some(KeySet {
            keys,
            fetched_at: Instant::now(),
        });
        key.ok_or_else(|| JwtError::KeyNotFound(kid.to_string()))
    }

    async fn fetch(&self) -> Result<HashMap<String, DecodingKey>, JwtError> {
        let resp = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| JwtError::JwksFetchFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(JwtError::JwksFetchFailed(format!("HTTP {}", resp.status())));
        }
        let jwks: JwksResponse = resp
            .json()
            .await
            .map_err(|e| JwtError::JwksFetchFailed(e.to_string()))?;

        // Keys that are not usable RSA signing keys are skipped
        Ok(jwks
            .keys
            .into_iter()
            .filter(|k| k.kty == "RSA" && k.key_use.as_deref().is_none_or(|u| u == "sig"))
            .filter_map(|k| {
                DecodingKey::from_rsa_components(&k.n, &k.e)
                    .ok()
                    .map(|dk| (k.kid, dk))
            })
            .collect())
    }
}

impl CacheState {
    fn fresh_key_set(&self) -> Option<&KeySet> {
        self.key_set
            .as_ref()
            .filter(|ks| ks.fetched_at.elapsed() < KEY_SET_TTL)
    }

    fn may_force_refetch(&self) -> bool {
        self.last_forced_refetch
            .is_none_or(|at| at.elapsed() >= FORCED_REFETCH_COOLDOWN)
    }
}

/// Verifier for ID tokens of one user pool / app client.
pub struct CognitoJwtVerifier {
    jwks: JwksCache,
    issuer: String,
    client_id: String,
}

impl CognitoJwtVerifier {
    pub fn new(http_client: reqwest::Client, config: &AuthenticatorConfig) -> Self {
        Self {
            jwks: JwksCache::new(http_client, config.jwks_url()),
            issuer: config.cognito_issuer(),
            client_id: config.app_client_id.clone(),
        }
    }
}

impl IdTokenVerifier for CognitoJwtVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| JwtError::InvalidFormat)?;
        let kid = header.kid.ok_or(JwtError::MissingKid)?;
        let decoding_key = self.jwks.key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.client_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let token_data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| JwtError::Validation(e.to_string()))?;

        match token_data.claims.token_use.as_deref() {
            Some("id") => Ok(token_data.claims),
            other => Err(JwtError::WrongTokenUse(other.unwrap_or_default().to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Invalid JWT format")]
    InvalidFormat,

    #[error("Token missing kid header")]
    MissingKid,

    #[error("Signing key not found for kid: {0}")]
    KeyNotFound(String),

    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),

    #[error("JWT validation failed: {0}")]
    Validation(String),

    #[error("expected an id token, got token_use {0:?}")]
    WrongTokenUse(String),
}
