//! Authentication failure reasons.
//!
//! The authenticator never lets one of these escape: a failure on a
//! protected path becomes a sign-in redirect or a bare 401, and a failure on
//! the callback path becomes a 400 whose body is the error's `Display` text.

use crate::cognito::client::CognitoError;
use crate::cognito::jwt::JwtError;
use crate::csrf::CsrfError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Cookies weren't present in the request")]
    CookieMissing,

    #[error("Neither idToken, nor refreshToken was present in request cookies")]
    TokenMissing,

    #[error("idToken verification failed: {0}")]
    TokenVerification(#[source] JwtError),

    #[error("{0}")]
    Csrf(#[from] CsrfError),

    #[error("OAuth code parameter not found")]
    MissingCode,

    #[error("OAuth state parameter not found")]
    MissingState,

    #[error("Identity provider returned an error: {0}")]
    IdentityProvider(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(#[source] CognitoError),

    #[error("Token refresh failed: {0}")]
    RefreshExchange(#[source] CognitoError),

    #[error("Host header is missing")]
    MissingHost,

    #[error("Sign-out is not configured")]
    SignOutDisabled,
}

impl AuthError {
    /// CSRF failures are logged at high severity; they are the visible part
    /// of a forged or replayed callback.
    pub fn is_csrf(&self) -> bool {
        matches!(self, AuthError::Csrf(_) | AuthError::MissingState)
    }
}
