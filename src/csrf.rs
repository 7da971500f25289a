//! CSRF tokens for the authorization-code round trip.
//!
//! A sign-in redirect mints a nonce, its HMAC and a PKCE verifier, stores
//! them in cookies and binds the nonce into the OAuth `state` parameter:
//!
//! ```text
//! state = base64url(JSON { "nonce": ..., "redirect_uri": ... })
//! nonceHmac = base64url(HMAC-SHA256(secret, nonce))[..16]
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// RFC 7636 unreserved characters.
const SECRET_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

const NONCE_RANDOM_LEN: usize = 16;
const PKCE_VERIFIER_LEN: usize = 43;
const NONCE_HMAC_LEN: usize = 16;

/// Values minted for one sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfTokens {
    pub nonce: String,
    pub nonce_hmac: String,
    pub pkce: String,
    pub state: String,
}

/// Decoded OAuth `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub nonce: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsrfError {
    #[error(
        "Your browser didn't send the nonce cookie along, but it is required for security (prevent CSRF)."
    )]
    MissingNonceCookie,

    #[error(
        "Nonce mismatch. This can happen if you start multiple authentication attempts in parallel (e.g. in separate tabs)"
    )]
    NonceMismatch,

    #[error(
        "Your browser didn't send the pkce cookie along, but it is required for security (prevent CSRF)."
    )]
    MissingPkceCookie,

    #[error("Nonce signature mismatch")]
    NonceSignatureMismatch,

    #[error("Invalid state parameter")]
    InvalidState,
}

/// Mint nonce, nonce HMAC, PKCE verifier and the `state` blob for a
/// sign-in redirect back to `request_uri`.
pub fn generate_csrf_tokens(request_uri: &str, signing_secret: &str) -> CsrfTokens {
    let nonce = generate_nonce();
    let nonce_hmac = sign_nonce(&nonce, signing_secret);
    let state = encode_state(&OAuthState {
        nonce: nonce.clone(),
        redirect_uri: request_uri.to_string(),
    });

    CsrfTokens {
        nonce,
        nonce_hmac,
        pkce: random_secret(PKCE_VERIFIER_LEN),
        state,
    }
}

/// `{unix seconds}T{16 random chars}`
pub fn generate_nonce() -> String {
    let now = chrono::Utc::now().timestamp();
    format!("{}T{}", now, random_secret(NONCE_RANDOM_LEN))
}

/// Truncated URL-safe HMAC-SHA256 of `nonce` under `secret`.
pub fn sign_nonce(nonce: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is always valid");
    mac.update(nonce.as_bytes());
    let digest = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    digest[..NONCE_HMAC_LEN].to_string()
}

/// Constant-time check of a nonce HMAC received from a cookie.
pub fn verify_nonce(nonce: &str, secret: &str, nonce_hmac: &str) -> bool {
    let expected = sign_nonce(nonce, secret);
    expected.as_bytes().ct_eq(nonce_hmac.as_bytes()).into()
}

/// Constant-time string equality for nonce comparisons.
pub fn nonces_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub fn encode_state(state: &OAuthState) -> String {
    let json = serde_json::to_vec(state).expect("OAuthState always serializes");
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a `state` parameter. Padding and standard-alphabet characters
/// are tolerated.
pub fn decode_state(state: &str) -> Result<OAuthState, CsrfError> {
    let normalized: String = state
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = URL_SAFE_NO_PAD
        .decode(normalized)
        .map_err(|_| CsrfError::InvalidState)?;
    serde_json::from_slice(&bytes).map_err(|_| CsrfError::InvalidState)
}

/// S256 code challenge for a PKCE verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_secret(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SECRET_CHARSET[rng.gen_range(0..SECRET_CHARSET.len())] as char)
        .collect()
}
