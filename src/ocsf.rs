//! OCSF (Open Cybersecurity Schema Framework) structured event logging.
//!
//! Events are emitted via `tracing::info!` on the `ocsf` target as
//! structured JSON. Never panics. Token values are never included.

use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

// OCSF event class UIDs
pub const CLASS_AUTHENTICATION: u32 = 3001;

// Activity IDs
pub const ACTIVITY_LOGON: u32 = 1;
pub const ACTIVITY_LOGOFF: u32 = 2;
pub const ACTIVITY_AUTH_TICKET: u32 = 3; // OAuth code exchange
pub const ACTIVITY_SERVICE_TICKET: u32 = 4; // Token refresh

// Status IDs
pub const STATUS_SUCCESS: u32 = 1;
pub const STATUS_FAILURE: u32 = 2;

// Severity IDs
pub const SEVERITY_INFORMATIONAL: u32 = 1;
pub const SEVERITY_LOW: u32 = 2;
pub const SEVERITY_MEDIUM: u32 = 3;
pub const SEVERITY_HIGH: u32 = 4;

pub const AUTH_PROTOCOL_OAUTH2: u32 = 10;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn activity_name(id: u32) -> &'static str {
    match id {
        ACTIVITY_LOGON => "Logon",
        ACTIVITY_LOGOFF => "Logoff",
        ACTIVITY_AUTH_TICKET => "Authentication Ticket",
        ACTIVITY_SERVICE_TICKET => "Service Ticket",
        _ => "Other",
    }
}

fn severity_name(id: u32) -> &'static str {
    match id {
        SEVERITY_INFORMATIONAL => "Informational",
        SEVERITY_LOW => "Low",
        SEVERITY_MEDIUM => "Medium",
        SEVERITY_HIGH => "High",
        5 => "Critical",
        _ => "Unknown",
    }
}

fn status_name(id: u32) -> &'static str {
    match id {
        STATUS_SUCCESS => "Success",
        _ => "Failure",
    }
}

/// Emit an OCSF event as structured JSON via tracing. Never panics.
fn emit(event: &serde_json::Value) {
    if let Ok(json) = serde_json::to_string(event) {
        tracing::info!(target: "ocsf", "{}", json);
    }
}

/// Build an OCSF Authentication (3001) event.
pub fn build_authentication_event(
    activity_id: u32,
    status_id: u32,
    severity_id: u32,
    username: Option<&str>,
    message: &str,
) -> serde_json::Value {
    let mut event = json!({
        "class_uid": CLASS_AUTHENTICATION,
        "class_name": "Authentication",
        "activity_id": activity_id,
        "activity_name": activity_name(activity_id),
        "severity_id": severity_id,
        "severity": severity_name(severity_id),
        "status_id": status_id,
        "status": status_name(status_id),
        "time": now_millis(),
        "metadata": {
            "product": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "vendor_name": "Cognito Edge Auth"
            }
        },
        "auth_protocol_id": AUTH_PROTOCOL_OAUTH2,
        "auth_protocol": "OAuth 2.0/OIDC",
        "message": message,
    });

    if let Some(name) = username {
        event["actor"] = json!({
            "user": {
                "name": name,
                "type_id": 1,
                "type": "User"
            }
        });
    }

    event
}

/// Emit an OCSF Authentication (3001) event.
pub fn authentication_event(
    activity_id: u32,
    status_id: u32,
    severity_id: u32,
    username: Option<&str>,
    message: &str,
) {
    emit(&build_authentication_event(
        activity_id,
        status_id,
        severity_id,
        username,
        message,
    ));
}
