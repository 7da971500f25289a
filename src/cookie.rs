//! Cookie codec and the auth cookie naming contract.
//!
//! Token cookies are named `{versionTag}.{appClientId}.{username}.{tokenType}`
//! and CSRF cookies `{versionTag}.{appClientId}.{suffix}`. Deployed browsers
//! already hold cookies in this format, so the names are matched on exact
//! prefix/suffix strings.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Allowed `SameSite` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameSite {
    type Err = CookieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Strict" => Ok(SameSite::Strict),
            "Lax" => Ok(SameSite::Lax),
            "None" => Ok(SameSite::None),
            other => Err(CookieError::InvalidSameSite(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("Expected SameSite to be Strict, Lax or None, got {0:?}")]
    InvalidSameSite(String),
}

/// Attributes rendered after the `name=value` pair of a `Set-Cookie` header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieAttributes {
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl CookieAttributes {
    /// Attributes that make the browser drop a cookie immediately.
    pub fn expired(mut self) -> Self {
        self.expires = Some(DateTime::from_timestamp(0, 0).unwrap_or_default());
        self.max_age = Some(0);
        self
    }
}

/// A `name=value` pair read from a request `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCookie {
    pub name: String,
    pub value: String,
}

/// Serialize a cookie into a single `Set-Cookie` header value.
///
/// The value is percent-encoded outside the RFC 3986 unreserved set, which
/// leaves JWTs and the CSRF tokens untouched. Unset attributes are omitted;
/// without `expires`/`max_age` the cookie is a session cookie.
pub fn serialize(name: &str, value: &str, attrs: &CookieAttributes) -> String {
    let mut out = format!("{}={}", name, urlencoding::encode(value));

    if let Some(domain) = &attrs.domain {
        out.push_str("; Domain=");
        out.push_str(domain);
    }
    if let Some(path) = &attrs.path {
        out.push_str("; Path=");
        out.push_str(path);
    }
    if let Some(expires) = &attrs.expires {
        out.push_str("; Expires=");
        out.push_str(&http_date(expires));
    }
    if let Some(max_age) = attrs.max_age {
        out.push_str(&format!("; Max-Age={max_age}"));
    }
    if attrs.secure {
        out.push_str("; Secure");
    }
    if attrs.http_only {
        out.push_str("; HttpOnly");
    }
    if let Some(same_site) = attrs.same_site {
        out.push_str("; SameSite=");
        out.push_str(same_site.as_str());
    }

    out
}

/// Parse a request `Cookie` header into its pairs, in header order.
///
/// Duplicate names are all returned; callers decide which one wins.
pub fn parse(header: &str) -> Vec<RequestCookie> {
    header
        .split(';')
        .filter_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some(RequestCookie {
                name: name.to_string(),
                value,
            })
        })
        .collect()
}

/// Domain attribute for auth cookies: the override if configured, otherwise
/// the request host without its port.
pub fn cookie_domain(host: &str, override_domain: Option<&str>) -> String {
    if let Some(domain) = override_domain {
        return domain.to_string();
    }
    if host.starts_with('[') {
        // IPv6 literal, keep the brackets
        return match host.find(']') {
            Some(end) => host[..=end].to_string(),
            None => host.to_string(),
        };
    }
    match host.split_once(':') {
        Some((bare, _port)) => bare.to_string(),
        None => host.to_string(),
    }
}

/// IMF-fixdate as required for the `Expires` attribute.
fn http_date(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// ───── Naming contract ─────

/// Token cookies carried per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookieType {
    IdToken,
    AccessToken,
    RefreshToken,
}

impl CookieType {
    pub fn suffix(&self) -> &'static str {
        match self {
            CookieType::IdToken => "idToken",
            CookieType::AccessToken => "accessToken",
            CookieType::RefreshToken => "refreshToken",
        }
    }
}

/// CSRF cookies, shared by all users of a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfCookie {
    Nonce,
    NonceHmac,
    Pkce,
}

impl CsrfCookie {
    pub const ALL: [CsrfCookie; 3] = [CsrfCookie::Pkce, CsrfCookie::Nonce, CsrfCookie::NonceHmac];

    pub fn suffix(&self) -> &'static str {
        match self {
            CsrfCookie::Nonce => "nonce",
            CsrfCookie::NonceHmac => "nonceHmac",
            CsrfCookie::Pkce => "pkce",
        }
    }
}

/// `{cookieBase}.{username}.{tokenType}`
pub fn token_cookie_name(cookie_base: &str, username: &str, kind: CookieType) -> String {
    format!("{}.{}.{}", cookie_base, username, kind.suffix())
}

/// `{cookieBase}.{suffix}`
pub fn csrf_cookie_name(cookie_base: &str, kind: CsrfCookie) -> String {
    format!("{}.{}", cookie_base, kind.suffix())
}

/// True if `name` starts with `{cookieBase}.` and ends with `.{tokenType}`.
pub fn is_token_cookie(name: &str, cookie_base: &str, kind: CookieType) -> bool {
    name.strip_prefix(cookie_base)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|rest| rest.ends_with(&format!(".{}", kind.suffix())))
}

/// Username segment of a token cookie name, if `name` is one.
pub fn username_from_token_cookie<'a>(
    name: &'a str,
    cookie_base: &str,
    kind: CookieType,
) -> Option<&'a str> {
    let rest = name.strip_prefix(cookie_base)?.strip_prefix('.')?;
    let username = rest.strip_suffix(kind.suffix())?.strip_suffix('.')?;
    (!username.is_empty()).then_some(username)
}

/// True if `name` is exactly `{cookieBase}.{suffix}`.
pub fn is_csrf_cookie(name: &str, cookie_base: &str, kind: CsrfCookie) -> bool {
    name.strip_prefix(cookie_base)
        .and_then(|rest| rest.strip_prefix('.'))
        == Some(kind.suffix())
}

// ───── Per-type overrides ─────

/// Attribute overrides for one token cookie type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieOverride {
    pub http_only: Option<bool>,
    pub same_site: Option<SameSite>,
    pub path: Option<String>,
    pub expiration_seconds: Option<u64>,
}

impl CookieOverride {
    /// Overlay the configured fields onto `attrs`.
    pub fn apply(&self, attrs: &mut CookieAttributes, now: DateTime<Utc>) {
        if let Some(http_only) = self.http_only {
            attrs.http_only = http_only;
        }
        if let Some(same_site) = self.same_site {
            attrs.same_site = Some(same_site);
        }
        if let Some(path) = &self.path {
            attrs.path = Some(path.clone());
        }
        if let Some(secs) = self.expiration_seconds {
            attrs.expires = Some(now + Duration::seconds(secs as i64));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieSettingsOverrides {
    #[serde(default)]
    pub id_token: Option<CookieOverride>,
    #[serde(default)]
    pub access_token: Option<CookieOverride>,
    #[serde(default)]
    pub refresh_token: Option<CookieOverride>,
}

impl CookieSettingsOverrides {
    pub fn get(&self, kind: CookieType) -> Option<&CookieOverride> {
        match kind {
            CookieType::IdToken => self.id_token.as_ref(),
            CookieType::AccessToken => self.access_token.as_ref(),
            CookieType::RefreshToken => self.refresh_token.as_ref(),
        }
    }
}
