//! Wire types shared by the router, the legacy shim and every service.
//!
//! A call is a [`RequestEnvelope`] in and a [`ResponseEnvelope`] out. The
//! response is a sum type in Rust but serializes to the flat
//! `{success, data, error, redirect}` shape that existing callers already
//! understand.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON object carried by a request.
pub type Payload = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// ServiceId
// ---------------------------------------------------------------------------

/// Identifier of an independently deployable service (e.g. `health-death`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ServiceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ServiceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Who is calling, and the trace the call belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    /// Caller identity (an openid in the mini-app); `None` for system calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default = "new_trace_id")]
    pub trace_id: String,
}

fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl CallerContext {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            trace_id: new_trace_id(),
        }
    }

    /// Context for calls made by the system itself (repairs, cron jobs).
    pub fn system() -> Self {
        Self {
            identity: None,
            trace_id: new_trace_id(),
        }
    }

    pub fn identity_or_anonymous(&self) -> &str {
        self.identity.as_deref().unwrap_or("anonymous")
    }
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::system()
    }
}

/// A single call: action name, JSON payload, caller context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub action: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub caller_context: CallerContext,
}

impl RequestEnvelope {
    pub fn new(action: impl Into<String>, payload: Payload) -> Self {
        Self {
            action: action.into(),
            payload,
            caller_context: CallerContext::default(),
        }
    }

    /// Build a request from a JSON value; non-object values yield an empty payload.
    pub fn with_json(action: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        Self::new(action, payload)
    }

    pub fn with_context(mut self, context: CallerContext) -> Self {
        self.caller_context = context;
        self
    }

    /// Same payload and context, different action name.
    pub fn renamed(&self, action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            payload: self.payload.clone(),
            caller_context: self.caller_context.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Machine-readable error category carried in every failure envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No service knows the action.
    RouteNotFound,
    /// The action was recognized but is deliberately not executed here
    /// (moved or retired).
    Deprecated,
    PermissionDenied,
    /// The downstream call failed, timed out or crashed.
    ServiceUnavailable,
    /// The request was malformed and never forwarded.
    ValidationError,
    /// The owning service ran the action and reported a business failure.
    ActionFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RouteNotFound => "RouteNotFound",
            Self::Deprecated => "Deprecated",
            Self::PermissionDenied => "PermissionDenied",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::ValidationError => "ValidationError",
            Self::ActionFailed => "ActionFailed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// The single response shape every service returns.
///
/// `Redirect` is not a failure of the service: it says the action lives in
/// another service now. It still serializes with `success: false` so callers
/// written against the monolith keep treating it as "did not happen".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub enum ResponseEnvelope {
    Ok(Value),
    Err(ErrorBody),
    Redirect { error: ErrorBody, service: ServiceId },
}

impl ResponseEnvelope {
    pub fn ok(data: Value) -> Self {
        Self::Ok(data)
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Err(ErrorBody::new(code, message))
    }

    /// Redirect for `action`, now owned by `service`.
    pub fn moved(action: &str, service: ServiceId) -> Self {
        Self::Redirect {
            error: ErrorBody::new(
                ErrorCode::Deprecated,
                format!("{} has moved to {}", action, service),
            ),
            service,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Ok(data) => Some(data),
            _ => None,
        }
    }

    pub fn error_body(&self) -> Option<&ErrorBody> {
        match self {
            Self::Ok(_) => None,
            Self::Err(error) | Self::Redirect { error, .. } => Some(error),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.error_body().map(|e| e.code)
    }

    pub fn redirect_target(&self) -> Option<&ServiceId> {
        match self {
            Self::Redirect { service, .. } => Some(service),
            _ => None,
        }
    }

    /// Short label for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ok(_) => "ok",
            Self::Err(_) => "error",
            Self::Redirect { .. } => "redirect",
        }
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

/// Flat `{success, data, error, redirect}` form used on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<ServiceId>,
}

/// A wire envelope that violates the success/data/error/redirect rules.
#[derive(Debug, Error)]
pub enum EnvelopeShapeError {
    #[error("successful envelope must not carry an error or redirect")]
    SuccessWithError,
    #[error("failed envelope must carry an error")]
    FailureWithoutError,
    #[error("failed envelope must not carry data")]
    FailureWithData,
}

impl From<ResponseEnvelope> for WireEnvelope {
    fn from(envelope: ResponseEnvelope) -> Self {
        match envelope {
            ResponseEnvelope::Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
                redirect: None,
            },
            ResponseEnvelope::Err(error) => Self {
                success: false,
                data: None,
                error: Some(error),
                redirect: None,
            },
            ResponseEnvelope::Redirect { error, service } => Self {
                success: false,
                data: None,
                error: Some(error),
                redirect: Some(service),
            },
        }
    }
}

impl TryFrom<WireEnvelope> for ResponseEnvelope {
    type Error = EnvelopeShapeError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        if wire.success {
            if wire.error.is_some() || wire.redirect.is_some() {
                return Err(EnvelopeShapeError::SuccessWithError);
            }
            return Ok(Self::Ok(wire.data.unwrap_or(Value::Null)));
        }
        if wire.data.is_some() {
            return Err(EnvelopeShapeError::FailureWithData);
        }
        let error = wire.error.ok_or(EnvelopeShapeError::FailureWithoutError)?;
        Ok(match wire.redirect {
            Some(service) => Self::Redirect { error, service },
            None => Self::Err(error),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_envelope_wire_shape() {
        let env = ResponseEnvelope::ok(json!({"total": 3}));
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire, json!({"success": true, "data": {"total": 3}}));
    }

    #[test]
    fn test_redirect_envelope_wire_shape() {
        let env = ResponseEnvelope::moved("create_treatment_record", "health-treatment".into());
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["success"], false);
        assert_eq!(wire["redirect"], "health-treatment");
        assert_eq!(wire["error"]["code"], "Deprecated");
        assert_eq!(
            wire["error"]["message"],
            "create_treatment_record has moved to health-treatment"
        );
        assert!(wire.get("data").is_none());
    }

    #[test]
    fn test_wire_rejects_redirect_on_success() {
        let raw = json!({"success": true, "data": 1, "redirect": "x"});
        let parsed: Result<ResponseEnvelope, _> = serde_json::from_value(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_wire_rejects_failure_without_error() {
        let parsed: Result<ResponseEnvelope, _> = serde_json::from_value(json!({"success": false}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_wire_success_without_data_is_null() {
        let env: ResponseEnvelope = serde_json::from_value(json!({"success": true})).unwrap();
        assert_eq!(env, ResponseEnvelope::Ok(Value::Null));
    }

    #[test]
    fn test_request_envelope_camel_case() {
        let raw = json!({
            "action": "get_death_stats",
            "payload": {"farm": "north"},
            "callerContext": {"identity": "openid-1", "traceId": "t-1"}
        });
        let req: RequestEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(req.caller_context.identity.as_deref(), Some("openid-1"));
        assert_eq!(req.caller_context.trace_id, "t-1");
        assert_eq!(req.payload["farm"], "north");
    }

    #[test]
    fn test_request_envelope_defaults() {
        let req: RequestEnvelope = serde_json::from_value(json!({"action": "x"})).unwrap();
        assert!(req.payload.is_empty());
        assert!(req.caller_context.identity.is_none());
        assert!(!req.caller_context.trace_id.is_empty());
        assert_eq!(req.caller_context.identity_or_anonymous(), "anonymous");
    }

    #[test]
    fn test_renamed_keeps_payload_and_context() {
        let req = RequestEnvelope::with_json("getDeathStats", json!({"a": 1}))
            .with_context(CallerContext::new("openid-2"));
        let renamed = req.renamed("get_death_stats");
        assert_eq!(renamed.action, "get_death_stats");
        assert_eq!(renamed.payload, req.payload);
        assert_eq!(renamed.caller_context, req.caller_context);
    }
}
