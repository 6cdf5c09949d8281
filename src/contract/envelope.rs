//! Response normalization.
//!
//! Services answer in whatever shape they were written with: the legacy
//! monolith returns `{success, data}` or `{success: false, error: "..."}`,
//! newer services return bare data, remote calls can fail outright. Everything
//! is coerced to a [`ResponseEnvelope`] here so the router treats all services
//! the same way.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::service::ServiceError;
use super::types::{ErrorBody, ErrorCode, ResponseEnvelope, ServiceId};

/// What a service hands back before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawReply {
    /// Already in envelope form (the legacy shim, envelope-aware services).
    Envelope(ResponseEnvelope),
    /// Any JSON value: a `{success, ...}` object or bare data.
    Json(Value),
}

/// Legacy error strings that carried redirect intent in prose.
///
/// Only the two phrasings the monolith actually emitted count. A bare
/// "moved to" is ordinary business prose ("moved to quarantine pen") and
/// stays an error.
static MOVED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\bhas moved to|已迁移到)\s*[:：]?\s*([A-Za-z0-9][A-Za-z0-9_\-]*)")
        .expect("static regex")
});

/// Coerce a service result into the single envelope shape.
pub fn normalize(result: Result<RawReply, ServiceError>) -> ResponseEnvelope {
    match result {
        Ok(RawReply::Envelope(envelope)) => envelope,
        Ok(RawReply::Json(value)) => normalize_json(value),
        Err(error) => from_service_error(&error),
    }
}

/// Map a service failure to its envelope error code.
pub fn from_service_error(error: &ServiceError) -> ResponseEnvelope {
    let code = match error {
        ServiceError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        ServiceError::Validation(_) => ErrorCode::ValidationError,
        ServiceError::UnknownAction(_) => ErrorCode::RouteNotFound,
        ServiceError::Rejected(_) => ErrorCode::ActionFailed,
        ServiceError::Failed(_)
        | ServiceError::Timeout(_)
        | ServiceError::Transport(_)
        | ServiceError::Panicked(_) => ErrorCode::ServiceUnavailable,
    };
    ResponseEnvelope::error(code, error.to_string())
}

/// Interpret a JSON reply.
///
/// Objects with a boolean `success` field are read as envelopes; anything
/// else is bare data.
pub fn normalize_json(value: Value) -> ResponseEnvelope {
    let mut object = match value {
        Value::Object(object) if object.get("success").map_or(false, Value::is_boolean) => object,
        other => return ResponseEnvelope::Ok(other),
    };

    let success = object
        .remove("success")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if success {
        if let Some(data) = object.remove("data") {
            return ResponseEnvelope::Ok(data);
        }
        // `{success: true, total: 3}` style: the remaining fields are the data.
        object.remove("error");
        object.remove("redirect");
        return if object.is_empty() {
            ResponseEnvelope::Ok(Value::Null)
        } else {
            ResponseEnvelope::Ok(Value::Object(object))
        };
    }

    let redirect = object
        .remove("redirect")
        .and_then(|v| v.as_str().map(ServiceId::from));
    let error = error_body(object.remove("error"), object.remove("message"));

    match redirect.or_else(|| moved_target(&error.message)) {
        Some(service) => ResponseEnvelope::Redirect {
            error: ErrorBody::new(ErrorCode::Deprecated, error.message),
            service,
        },
        None => ResponseEnvelope::Err(error),
    }
}

/// Read `error` as either a plain string or a `{code, message}` object.
fn error_body(error: Option<Value>, message: Option<Value>) -> ErrorBody {
    let fallback_message = message
        .as_ref()
        .and_then(|m| m.as_str())
        .unwrap_or("action failed")
        .to_string();

    match error {
        Some(Value::String(message)) => ErrorBody::new(ErrorCode::ActionFailed, message),
        Some(Value::Object(object)) => {
            let code = object
                .get("code")
                .cloned()
                .and_then(|c| serde_json::from_value::<ErrorCode>(c).ok())
                .unwrap_or(ErrorCode::ActionFailed);
            let message = object
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or(fallback_message);
            ErrorBody::new(code, message)
        }
        Some(other) if !other.is_null() => ErrorBody::new(ErrorCode::ActionFailed, other.to_string()),
        _ => ErrorBody::new(ErrorCode::ActionFailed, fallback_message),
    }
}

fn moved_target(message: &str) -> Option<ServiceId> {
    MOVED_PATTERN
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| ServiceId::from(m.as_str()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
