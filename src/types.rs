//! Edge request/response DTOs.
//!
//! These follow the Lambda@Edge viewer-request event shape: headers are
//! keyed by lower-case name and carry a list of `{key, value}` entries, and
//! status codes are strings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One header value with its original-case name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.to_string()),
            value: value.into(),
        }
    }
}

pub type Headers = BTreeMap<String, Vec<HeaderEntry>>;

/// Viewer request as delivered by the CDN.
///
/// Only `uri`, `querystring` and the `host`/`cookie` headers are inspected;
/// every other field is carried through untouched on pass-through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRequest {
    pub uri: String,
    #[serde(default)]
    pub querystring: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl EdgeRequest {
    pub fn new(uri: impl Into<String>, querystring: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            querystring: querystring.into(),
            headers: Headers::new(),
            rest: Map::new(),
        }
    }

    /// Builder-style header append, keyed by lower-case name.
    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(HeaderEntry::new(key, value));
        self
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|entries| entries.first())
            .map(|e| e.value.as_str())
    }

    pub fn host(&self) -> Option<&str> {
        self.header("host").filter(|h| !h.is_empty())
    }

    /// All `Cookie` header values, in order.
    pub fn cookie_headers(&self) -> impl Iterator<Item = &str> {
        self.headers
            .get("cookie")
            .into_iter()
            .flatten()
            .map(|e| e.value.as_str())
    }

    pub fn has_cookies(&self) -> bool {
        self.cookie_headers().next().is_some()
    }

    /// Request URI with its query string, if any.
    pub fn original_uri(&self) -> String {
        if self.querystring.is_empty() {
            self.uri.clone()
        } else {
            format!("{}?{}", self.uri, self.querystring)
        }
    }

    /// First value of a query parameter, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.querystring.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

/// Synthetic response generated at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(default, skip_serializing_if = "Headers::is_empty")]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

pub const NO_CACHE: &str = "no-cache, no-store, max-age=0, must-revalidate";

impl EdgeResponse {
    fn status(status: &str, description: &str) -> Self {
        Self {
            status: status.into(),
            status_description: Some(description.into()),
            headers: Headers::new(),
            body: None,
        }
    }

    /// 307 with `Location`, no-cache headers and the given `Set-Cookie` values.
    pub fn temporary_redirect(location: &str, cookies: Vec<String>) -> Self {
        let mut resp = Self::status("307", "Temporary Redirect");
        resp.headers
            .insert("location".into(), vec![HeaderEntry::new("Location", location)]);
        resp.headers.insert(
            "cache-control".into(),
            vec![HeaderEntry::new("Cache-Control", NO_CACHE)],
        );
        resp.headers
            .insert("pragma".into(), vec![HeaderEntry::new("Pragma", "no-cache")]);
        if !cookies.is_empty() {
            resp.headers.insert(
                "set-cookie".into(),
                cookies
                    .into_iter()
                    .map(|c| HeaderEntry::new("Set-Cookie", c))
                    .collect(),
            );
        }
        resp
    }

    pub fn unauthorized() -> Self {
        Self::status("401", "Unauthorized")
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        let mut resp = Self::status("400", "Bad Request");
        resp.body = Some(body.into());
        resp
    }

    pub fn internal_error() -> Self {
        let mut resp = Self::status("500", "Internal Server Error");
        resp.body = Some("Internal Server Error".into());
        resp
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|entries| entries.first())
            .map(|e| e.value.as_str())
    }

    /// All `Set-Cookie` values.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.headers
            .get("set-cookie")
            .map(|entries| entries.iter().map(|e| e.value.as_str()).collect())
            .unwrap_or_default()
    }
}

/// What an edge function hands back to the CDN.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EdgeResult {
    /// Forward to the origin unmodified.
    Request(EdgeRequest),
    Response(EdgeResponse),
}

/// Lambda@Edge event envelope: `{"Records":[{"cf":{"request":...}}]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeEvent {
    #[serde(rename = "Records")]
    pub records: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeRecord {
    pub cf: CloudFrontPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudFrontPayload {
    #[serde(default)]
    pub config: Option<Value>,
    pub request: EdgeRequest,
}

impl EdgeEvent {
    pub fn into_request(self) -> Option<EdgeRequest> {
        self.records.into_iter().next().map(|r| r.cf.request)
    }
}

/// GET /health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
    pub authenticator: String,
}
