//! Error - Typed failures for the completion endpoints
//!
//! Upstream rejections are classified once, at the HTTP boundary, into an
//! [`ErrorRecord`]; everything after that matches on [`ErrorKind`] instead
//! of re-reading response bodies.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure from the HTTP client.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// A classified rejection from the service.
    #[error("{0}")]
    Api(#[from] ErrorRecord),

    /// The client is already streaming an exchange.
    #[error("an exchange is already in flight on this client")]
    Busy,
}

/// What an upstream rejection amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No credential was supplied at all.
    NoCredential,
    /// The credential was supplied but rejected.
    InvalidCredential,
    /// The organization attached to the credential was rejected.
    InvalidOrganization,
    /// The requested model does not exist for this credential.
    InvalidModel,
    /// Retries against a transient condition were exhausted.
    RateLimitExceeded,
    /// Anything the classifier could not place.
    Unknown,
}

/// A classified upstream error, with the raw body kept for diagnostics.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub code: String,
    pub status: u16,
    pub raw: Option<Value>,
}

impl ErrorRecord {
    pub fn no_credential(raw: Option<Value>) -> Self {
        Self {
            kind: ErrorKind::NoCredential,
            message: "No API key provided. You can obtain one from \
                      https://platform.openai.com/account/api-keys."
                .to_string(),
            code: String::new(),
            status: 401,
            raw,
        }
    }

    pub fn invalid_credential(raw: Option<Value>) -> Self {
        Self {
            kind: ErrorKind::InvalidCredential,
            message: "Invalid API key provided.".to_string(),
            code: "invalid_api_key".to_string(),
            status: 401,
            raw,
        }
    }

    pub fn invalid_organization(raw: Option<Value>) -> Self {
        Self {
            kind: ErrorKind::InvalidOrganization,
            message: "Invalid organization provided.".to_string(),
            code: "invalid_organization".to_string(),
            status: 401,
            raw,
        }
    }

    pub fn invalid_model(raw: Option<Value>) -> Self {
        Self {
            kind: ErrorKind::InvalidModel,
            message: "Invalid model provided.".to_string(),
            code: String::new(),
            status: 401,
            raw,
        }
    }

    pub fn rate_limited() -> Self {
        Self {
            kind: ErrorKind::RateLimitExceeded,
            message: "You have exceeded your API rate limit.".to_string(),
            code: "rate_limit_exceeded".to_string(),
            status: 429,
            raw: None,
        }
    }

    pub fn unknown(
        message: impl Into<String>,
        code: impl Into<String>,
        status: u16,
        raw: Option<Value>,
    ) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            message: message.into(),
            code: code.into(),
            status,
            raw,
        }
    }

    /// Classify a 401 response body.
    ///
    /// The service reports every credential problem as 401 with an
    /// `{"error": {"code", "message"}}` body; which problem it is has to be
    /// teased out of the code and, failing that, the message text. A body
    /// missing either field is its own kind of unknown.
    pub fn classify_unauthorized(body: Option<Value>, model: &str) -> Self {
        let Some(body) = body else {
            return Self::unknown("Unknown error", "", 401, None);
        };
        let Some(error) = body.get("error").cloned() else {
            return Self::unknown("Unknown error", "", 401, Some(body));
        };
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if code.is_empty() {
            return Self::unknown("Unknown error", "", 401, Some(body));
        }
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if message.is_empty() {
            return Self::unknown("Unknown error", code, 401, Some(body));
        }

        match code.as_str() {
            "invalid_api_key" => Self::invalid_credential(Some(body)),
            "invalid_organization" => Self::invalid_organization(Some(body)),
            _ => {
                if message.contains(model) && message.contains("does not exist") {
                    Self::invalid_model(Some(body))
                } else if message.contains("You didn't provide an API key") {
                    Self::no_credential(Some(body))
                } else {
                    Self::unknown(message, code, 401, Some(body))
                }
            }
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ErrorRecord {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unauthorized(body: Value) -> ErrorRecord {
        ErrorRecord::classify_unauthorized(Some(body), "gpt-4")
    }

    #[test]
    fn missing_body_is_unknown() {
        let record = ErrorRecord::classify_unauthorized(None, "gpt-4");
        assert_eq!(record.kind, ErrorKind::Unknown);
        assert_eq!(record.status, 401);
    }

    #[test]
    fn missing_error_object_is_unknown() {
        assert_eq!(unauthorized(json!({})).kind, ErrorKind::Unknown);
    }

    #[test]
    fn missing_code_or_message_is_unknown() {
        let no_code = unauthorized(json!({"error": {"message": "broken"}}));
        assert_eq!(no_code.kind, ErrorKind::Unknown);

        let empty_code = unauthorized(json!({"error": {"code": "", "message": "broken"}}));
        assert_eq!(empty_code.kind, ErrorKind::Unknown);

        let no_message = unauthorized(json!({"error": {"code": "weird_code"}}));
        assert_eq!(no_message.kind, ErrorKind::Unknown);
        assert_eq!(no_message.code, "weird_code");
    }

    #[test]
    fn known_codes_map_directly() {
        let record = unauthorized(json!({
            "error": {"code": "invalid_api_key", "message": "Incorrect API key provided"}
        }));
        assert_eq!(record.kind, ErrorKind::InvalidCredential);
        assert_eq!(record.code, "invalid_api_key");

        let record = unauthorized(json!({
            "error": {"code": "invalid_organization", "message": "No such org"}
        }));
        assert_eq!(record.kind, ErrorKind::InvalidOrganization);
    }

    #[test]
    fn model_absence_is_detected_from_the_message() {
        let record = unauthorized(json!({
            "error": {"code": "model_not_found", "message": "The model gpt-4 does not exist"}
        }));
        assert_eq!(record.kind, ErrorKind::InvalidModel);

        // Same message shape about a different model stays unknown.
        let record = unauthorized(json!({
            "error": {"code": "model_not_found", "message": "The model gpt-9 does not exist"}
        }));
        assert_eq!(record.kind, ErrorKind::Unknown);
    }

    #[test]
    fn missing_credential_is_detected_from_the_message() {
        let record = unauthorized(json!({
            "error": {
                "code": "key_missing",
                "message": "You didn't provide an API key. You need to provide one."
            }
        }));
        assert_eq!(record.kind, ErrorKind::NoCredential);
    }

    #[test]
    fn unmatched_bodies_keep_their_code_and_message() {
        let record = unauthorized(json!({
            "error": {"code": "brand_new_code", "message": "something else entirely"}
        }));
        assert_eq!(record.kind, ErrorKind::Unknown);
        assert_eq!(record.code, "brand_new_code");
        assert_eq!(record.message, "something else entirely");
        assert!(record.raw.is_some());
    }
}
