//! Request-interception state machine.
//!
//! Every viewer request is classified from its cookies alone:
//!
//! - valid idToken: pass through unmodified
//! - invalid idToken + refreshToken: refresh and redirect back with new cookies
//! - nothing usable: 401 on API paths, otherwise redirect to the hosted UI
//!
//! The callback path (`handle_parse_auth`) validates the CSRF cookies,
//! exchanges the code and redirects to the page the user originally asked for.
//! All branches return an [`Outcome`]; no error escapes to the caller.

use chrono::{DateTime, Duration, Utc};

use crate::cognito::client::{self, Tokens};
use crate::cognito::jwt::{CognitoJwtVerifier, IdTokenVerifier};
use crate::config::{AuthenticatorConfig, ConfigError, CsrfProtection};
use crate::cookie::{
    self, CookieAttributes, CookieType, CsrfCookie, csrf_cookie_name, token_cookie_name,
    username_from_token_cookie,
};
use crate::csrf::{self, CsrfError, CsrfTokens, OAuthState};
use crate::error::AuthError;
use crate::ocsf;
use crate::types::{EdgeRequest, EdgeResponse, EdgeResult};

/// Lifetime of the nonce/nonceHmac/pkce cookies.
const CSRF_COOKIE_TTL_MINUTES: i64 = 10;

/// Result of one authenticator step.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Forward the original request to the origin.
    PassThrough(EdgeRequest),
    /// 307 with `Location` and `Set-Cookie` headers.
    Redirect {
        location: String,
        cookies: Vec<String>,
    },
    /// Bare 401, no body.
    Unauthorized,
    /// 400 with a plain-text reason.
    BadRequest(String),
}

impl Outcome {
    pub fn into_result(self) -> EdgeResult {
        match self {
            Outcome::PassThrough(request) => EdgeResult::Request(request),
            Outcome::Redirect { location, cookies } => {
                EdgeResult::Response(EdgeResponse::temporary_redirect(&location, cookies))
            }
            Outcome::Unauthorized => EdgeResult::Response(EdgeResponse::unauthorized()),
            Outcome::BadRequest(reason) => {
                EdgeResult::Response(EdgeResponse::bad_request(reason))
            }
        }
    }
}

/// Token cookies found on a request.
#[derive(Default)]
struct CookieTokens {
    username: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
}

/// CSRF cookie values found on a request.
#[derive(Default)]
struct CsrfCookieValues {
    nonce: Option<String>,
    nonce_hmac: Option<String>,
    pkce: Option<String>,
}

pub struct Authenticator<V: IdTokenVerifier = CognitoJwtVerifier> {
    config: AuthenticatorConfig,
    verifier: V,
    http_client: reqwest::Client,
}

impl Authenticator {
    /// Build an authenticator that verifies tokens against the user pool's
    /// JWKS, sharing one HTTP client for JWKS and token calls.
    pub fn from_config(config: AuthenticatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http_client = client::build_http_client(&config)
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let verifier = CognitoJwtVerifier::new(http_client.clone(), &config);
        Ok(Self::new(config, verifier, http_client))
    }
}

impl<V: IdTokenVerifier> Authenticator<V> {
    pub fn new(config: AuthenticatorConfig, verifier: V, http_client: reqwest::Client) -> Self {
        Self {
            config,
            verifier,
            http_client,
        }
    }

    pub fn config(&self) -> &AuthenticatorConfig {
        &self.config
    }

    /// Decide what to do with a request for a protected resource.
    pub async fn handle_check_auth(&self, request: EdgeRequest) -> Outcome {
        let Some(host) = request.host().map(str::to_string) else {
            tracing::warn!(path = %request.uri, "request without host header");
            return Outcome::BadRequest(AuthError::MissingHost.to_string());
        };

        match self.authenticate(&request, &host).await {
            Ok(None) => Outcome::PassThrough(request),
            Ok(Some(refreshed)) => refreshed,
            Err(err) => {
                tracing::info!(path = %request.uri, reason = %err, "user isn't authenticated");
                self.unauthenticated(&request, &host)
            }
        }
    }

    /// Handle the OAuth redirect back from the hosted UI.
    pub async fn handle_parse_auth(&self, request: &EdgeRequest) -> Outcome {
        match self.parse_auth(request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let severity = if err.is_csrf() {
                    ocsf::SEVERITY_HIGH
                } else {
                    ocsf::SEVERITY_MEDIUM
                };
                ocsf::authentication_event(
                    ocsf::ACTIVITY_AUTH_TICKET,
                    ocsf::STATUS_FAILURE,
                    severity,
                    None,
                    &format!("OAuth callback rejected: {err}"),
                );
                tracing::info!(reason = %err, "unable to exchange code for tokens");
                Outcome::BadRequest(err.to_string())
            }
        }
    }

    /// Revoke the refresh token, expire the token cookies and send the user
    /// through the hosted UI logout.
    pub async fn handle_sign_out(&self, request: &EdgeRequest) -> Outcome {
        let Some(logout) = &self.config.logout else {
            return Outcome::BadRequest(AuthError::SignOutDisabled.to_string());
        };
        let Some(host) = request.host() else {
            return Outcome::BadRequest(AuthError::MissingHost.to_string());
        };

        let tokens = match self.tokens_from_cookies(request) {
            Ok(tokens) => tokens,
            Err(err) => {
                tracing::info!(reason = %err, "sign-out without a session");
                return Outcome::Redirect {
                    location: logout.logout_redirect_path.clone(),
                    cookies: Vec::new(),
                };
            }
        };

        if let Some(refresh_token) = &tokens.refresh_token
            && let Err(err) =
                client::revoke_tokens(&self.http_client, &self.config, refresh_token).await
        {
            // Cookies are cleared regardless
            tracing::warn!(error = %err, "unable to revoke refresh token");
        }

        let username = tokens.username.as_deref().unwrap_or_default();
        let now = Utc::now();
        let cookies = [
            CookieType::IdToken,
            CookieType::AccessToken,
            CookieType::RefreshToken,
        ]
        .into_iter()
        .map(|kind| {
            cookie::serialize(
                &token_cookie_name(&self.config.cookie_base(), username, kind),
                "",
                &self.token_cookie_attributes(kind, host, now).expired(),
            )
        })
        .collect();

        ocsf::authentication_event(
            ocsf::ACTIVITY_LOGOFF,
            ocsf::STATUS_SUCCESS,
            ocsf::SEVERITY_INFORMATIONAL,
            Some(username),
            "User signed out",
        );

        let logout_uri = format!("https://{}{}", host, logout.logout_redirect_path);
        Outcome::Redirect {
            location: format!(
                "{}?client_id={}&logout_uri={}",
                self.config.logout_url(),
                urlencoding::encode(&self.config.app_client_id),
                urlencoding::encode(&logout_uri)
            ),
            cookies,
        }
    }

    /// `Ok(None)` when the idToken verifies, `Ok(Some(redirect))` after a
    /// successful refresh.
    async fn authenticate(
        &self,
        request: &EdgeRequest,
        host: &str,
    ) -> Result<Option<Outcome>, AuthError> {
        let tokens = self.tokens_from_cookies(request)?;

        let mut failure = AuthError::TokenMissing;
        if let Some(id_token) = &tokens.id_token {
            match self.verifier.verify(id_token).await {
                Ok(claims) => {
                    tracing::debug!(
                        path = %request.uri,
                        username = claims.username(),
                        "forwarding request"
                    );
                    return Ok(None);
                }
                Err(err) => {
                    tracing::info!(error = %err, "idToken verification failed");
                    failure = AuthError::TokenVerification(err);
                }
            }
        }

        let Some(refresh_token) = &tokens.refresh_token else {
            return Err(failure);
        };

        tracing::info!(path = %request.uri, "refreshing tokens");
        let redirect_uri = format!("https://{host}");
        let fresh = match client::fetch_tokens_from_refresh_token(
            &self.http_client,
            &self.config,
            &redirect_uri,
            refresh_token,
        )
        .await
        {
            Ok(fresh) => fresh,
            Err(err) => {
                ocsf::authentication_event(
                    ocsf::ACTIVITY_SERVICE_TICKET,
                    ocsf::STATUS_FAILURE,
                    ocsf::SEVERITY_LOW,
                    tokens.username.as_deref(),
                    &format!("Token refresh failed: {err}"),
                );
                return Err(AuthError::RefreshExchange(err));
            }
        };

        let outcome = self
            .redirect_with_tokens(&fresh, host, request.original_uri(), false)
            .await?;
        ocsf::authentication_event(
            ocsf::ACTIVITY_SERVICE_TICKET,
            ocsf::STATUS_SUCCESS,
            ocsf::SEVERITY_INFORMATIONAL,
            tokens.username.as_deref(),
            "Token refresh succeeded",
        );
        Ok(Some(outcome))
    }

    async fn parse_auth(&self, request: &EdgeRequest) -> Result<Outcome, AuthError> {
        if let Some(error) = request.query_param("error") {
            let description = request
                .query_param("error_description")
                .filter(|d| !d.is_empty())
                .unwrap_or(error);
            return Err(AuthError::IdentityProvider(description));
        }

        let host = request.host().ok_or(AuthError::MissingHost)?;
        let code = request
            .query_param("code")
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCode)?;
        let state = request.query_param("state");

        // CSRF validation always precedes the code exchange
        let (location, code_verifier) = match &self.config.csrf_protection {
            Some(csrf) => {
                let (state, pkce) = self.validate_csrf(request, state.as_deref(), csrf)?;
                (state.redirect_uri, Some(pkce))
            }
            None => (state.unwrap_or_else(|| "/".into()), None),
        };

        let redirect_uri = self.config.parse_auth_redirect_uri(host);
        let tokens = client::fetch_tokens_from_code(
            &self.http_client,
            &self.config,
            &redirect_uri,
            &code,
            code_verifier.as_deref(),
        )
        .await
        .map_err(AuthError::TokenExchange)?;

        let outcome = self
            .redirect_with_tokens(
                &tokens,
                host,
                sanitize_redirect(&location),
                self.config.csrf_protection.is_some(),
            )
            .await?;
        ocsf::authentication_event(
            ocsf::ACTIVITY_AUTH_TICKET,
            ocsf::STATUS_SUCCESS,
            ocsf::SEVERITY_INFORMATIONAL,
            None,
            "OAuth token exchange succeeded",
        );
        Ok(outcome)
    }

    /// Check `state` against the CSRF cookies. Returns the decoded state and
    /// the PKCE verifier.
    fn validate_csrf(
        &self,
        request: &EdgeRequest,
        state: Option<&str>,
        csrf: &CsrfProtection,
    ) -> Result<(OAuthState, String), AuthError> {
        let cookies = self.csrf_cookies_from_request(request);

        let nonce = cookies.nonce.ok_or(CsrfError::MissingNonceCookie)?;
        let state = csrf::decode_state(state.ok_or(AuthError::MissingState)?)?;
        if state.nonce.is_empty() || !csrf::nonces_match(&state.nonce, &nonce) {
            return Err(CsrfError::NonceMismatch.into());
        }
        let pkce = cookies.pkce.ok_or(CsrfError::MissingPkceCookie)?;
        match cookies.nonce_hmac {
            Some(hmac) if csrf::verify_nonce(&state.nonce, &csrf.nonce_signing_secret, &hmac) => {}
            _ => return Err(CsrfError::NonceSignatureMismatch.into()),
        }

        Ok((state, pkce))
    }

    /// Verify the new idToken for its username and build the cookie-setting
    /// redirect.
    async fn redirect_with_tokens(
        &self,
        tokens: &Tokens,
        host: &str,
        location: String,
        clear_csrf: bool,
    ) -> Result<Outcome, AuthError> {
        let claims = self
            .verifier
            .verify(&tokens.id_token)
            .await
            .map_err(AuthError::TokenVerification)?;
        let username = claims.username();
        let base = self.config.cookie_base();
        let now = Utc::now();

        let mut cookies = vec![
            cookie::serialize(
                &token_cookie_name(&base, username, CookieType::AccessToken),
                &tokens.access_token,
                &self.token_cookie_attributes(CookieType::AccessToken, host, now),
            ),
            cookie::serialize(
                &token_cookie_name(&base, username, CookieType::IdToken),
                &tokens.id_token,
                &self.token_cookie_attributes(CookieType::IdToken, host, now),
            ),
        ];
        if let Some(refresh_token) = &tokens.refresh_token {
            cookies.push(cookie::serialize(
                &token_cookie_name(&base, username, CookieType::RefreshToken),
                refresh_token,
                &self.token_cookie_attributes(CookieType::RefreshToken, host, now),
            ));
        }

        if clear_csrf {
            let expired = self.csrf_cookie_attributes().expired();
            cookies.extend(
                CsrfCookie::ALL
                    .iter()
                    .map(|kind| cookie::serialize(&csrf_cookie_name(&base, *kind), "", &expired)),
            );
        }

        tracing::info!(username, location = %location, "issuing token cookies");
        Ok(Outcome::Redirect { location, cookies })
    }

    /// 401 for API paths, otherwise a redirect to the hosted UI.
    fn unauthenticated(&self, request: &EdgeRequest, host: &str) -> Outcome {
        if self.is_api_path(&request.uri) {
            tracing::info!(path = %request.uri, "returning 401 for API path");
            Outcome::Unauthorized
        } else {
            self.redirect_to_sign_in(request, host)
        }
    }

    fn redirect_to_sign_in(&self, request: &EdgeRequest, host: &str) -> Outcome {
        let redirect_uri = self.config.parse_auth_redirect_uri(host);
        let original_uri = request.original_uri();

        let mut params = vec![
            ("redirect_uri", redirect_uri),
            ("response_type", "code".to_string()),
            ("client_id", self.config.app_client_id.clone()),
        ];
        let mut cookies = Vec::new();

        match &self.config.csrf_protection {
            Some(csrf) => {
                let tokens = csrf::generate_csrf_tokens(&original_uri, &csrf.nonce_signing_secret);
                params.push(("state", tokens.state.clone()));
                params.push(("code_challenge", csrf::pkce_challenge(&tokens.pkce)));
                params.push(("code_challenge_method", "S256".to_string()));
                cookies = self.csrf_cookies(&tokens, Utc::now());
            }
            None => params.push(("state", original_uri)),
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let location = format!("{}?{}", self.config.authorize_url(), query);

        tracing::info!(path = %request.uri, "redirecting to hosted UI");
        Outcome::Redirect { location, cookies }
    }

    fn csrf_cookies(&self, tokens: &CsrfTokens, now: DateTime<Utc>) -> Vec<String> {
        let mut attrs = self.csrf_cookie_attributes();
        attrs.expires = Some(now + Duration::minutes(CSRF_COOKIE_TTL_MINUTES));
        let base = self.config.cookie_base();

        CsrfCookie::ALL
            .iter()
            .map(|kind| {
                let value = match kind {
                    CsrfCookie::Nonce => &tokens.nonce,
                    CsrfCookie::NonceHmac => &tokens.nonce_hmac,
                    CsrfCookie::Pkce => &tokens.pkce,
                };
                cookie::serialize(&csrf_cookie_name(&base, *kind), value, &attrs)
            })
            .collect()
    }

    /// CSRF cookies are only read by the callback path of this distribution,
    /// so they carry no Domain.
    fn csrf_cookie_attributes(&self) -> CookieAttributes {
        CookieAttributes {
            path: Some(self.config.parse_auth_cookie_path()),
            secure: true,
            http_only: true,
            same_site: Some(self.config.same_site),
            ..Default::default()
        }
    }

    fn token_cookie_attributes(
        &self,
        kind: CookieType,
        host: &str,
        now: DateTime<Utc>,
    ) -> CookieAttributes {
        let mut attrs = CookieAttributes {
            domain: Some(cookie::cookie_domain(
                host,
                self.config.cookie_domain.as_deref(),
            )),
            path: Some("/".into()),
            secure: true,
            http_only: true,
            same_site: Some(self.config.same_site),
            ..Default::default()
        };
        if let Some(overrides) = self.config.cookie_settings_overrides.get(kind) {
            overrides.apply(&mut attrs, now);
        }
        // idToken and refreshToken are never readable from scripts
        if kind != CookieType::AccessToken {
            attrs.secure = true;
            attrs.http_only = true;
        }
        attrs
    }

    /// First idToken/refreshToken cookie of this app client, in header order.
    fn tokens_from_cookies(&self, request: &EdgeRequest) -> Result<CookieTokens, AuthError> {
        if !request.has_cookies() {
            return Err(AuthError::CookieMissing);
        }

        let base = self.config.cookie_base();
        let mut found = CookieTokens::default();
        for c in request.cookie_headers().flat_map(cookie::parse) {
            if c.value.is_empty() {
                continue;
            }
            if found.id_token.is_none()
                && let Some(user) = username_from_token_cookie(&c.name, &base, CookieType::IdToken)
            {
                found.username = Some(user.to_string());
                found.id_token = Some(c.value);
            } else if found.refresh_token.is_none()
                && let Some(user) =
                    username_from_token_cookie(&c.name, &base, CookieType::RefreshToken)
            {
                found.username.get_or_insert_with(|| user.to_string());
                found.refresh_token = Some(c.value);
            }
        }

        if found.id_token.is_none() && found.refresh_token.is_none() {
            return Err(AuthError::TokenMissing);
        }
        Ok(found)
    }

    fn csrf_cookies_from_request(&self, request: &EdgeRequest) -> CsrfCookieValues {
        let base = self.config.cookie_base();
        let mut found = CsrfCookieValues::default();
        for c in request.cookie_headers().flat_map(cookie::parse) {
            if c.value.is_empty() {
                continue;
            }
            for kind in CsrfCookie::ALL {
                if !cookie::is_csrf_cookie(&c.name, &base, kind) {
                    continue;
                }
                let slot = match kind {
                    CsrfCookie::Nonce => &mut found.nonce,
                    CsrfCookie::NonceHmac => &mut found.nonce_hmac,
                    CsrfCookie::Pkce => &mut found.pkce,
                };
                slot.get_or_insert_with(|| c.value.clone());
            }
        }
        found
    }

    fn is_api_path(&self, uri: &str) -> bool {
        self.config
            .unauthorized_path_prefixes
            .iter()
            .any(|prefix| uri.starts_with(prefix.as_str()))
    }
}

/// Same-origin path to land on after sign-in; anything else becomes `/`.
///
/// Browsers strip tabs and newlines while parsing a `Location`, so any
/// control or whitespace character disqualifies the value before the
/// scheme-relative checks run.
pub fn sanitize_redirect(location: &str) -> String {
    let same_origin = !location
        .chars()
        .any(|c| c.is_ascii_control() || c.is_whitespace())
        && location.starts_with('/')
        && !location.starts_with("//")
        && !location.starts_with("/\\");
    if same_origin {
        location.to_string()
    } else {
        "/".to_string()
    }
}
