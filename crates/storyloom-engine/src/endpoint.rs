use std::fmt;

use serde_json::Value;

/// Why a single endpoint call did not yield what was asked for. Set by the
/// adapter that talks to the remote service; retry decisions dispatch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    RateLimited,
    /// The model answered with prose instead of an image.
    ChattyText,
    SafetyRefused,
    NoImageData,
    PermissionDenied,
    Transport,
    Other,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ChattyText => "chatty_text",
            FailureKind::SafetyRefused => "safety_refused",
            FailureKind::NoImageData => "no_image_data",
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::Transport => "transport",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointError {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl EndpointError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message).with_status(429)
    }

    pub fn chatty_text(text: impl Into<String>) -> Self {
        Self::new(FailureKind::ChattyText, text)
    }

    pub fn safety_refused(message: impl Into<String>) -> Self {
        Self::new(FailureKind::SafetyRefused, message)
    }

    pub fn no_image_data() -> Self {
        Self::new(FailureKind::NoImageData, "No image data returned.")
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(FailureKind::PermissionDenied, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EndpointError {}

/// Maps a non-success HTTP reply to a failure kind.
///
/// Rate limiting shows up as a 429 status, as `error.code == 429` in the
/// body, or as a `RESOURCE_EXHAUSTED` status string.
pub fn classify_http_failure(status: u16, body: &str) -> FailureKind {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|value| value.get("error"));
    let body_code = error
        .and_then(|error| error.get("code"))
        .and_then(Value::as_u64);
    let body_status = error
        .and_then(|error| error.get("status"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if status == 429
        || body_code == Some(429)
        || body_status == "RESOURCE_EXHAUSTED"
        || body.contains("RESOURCE_EXHAUSTED")
    {
        return FailureKind::RateLimited;
    }
    if matches!(status, 401 | 403)
        || matches!(body_code, Some(401 | 403))
        || body_status == "PERMISSION_DENIED"
        || body_status == "UNAUTHENTICATED"
    {
        return FailureKind::PermissionDenied;
    }
    if matches!(status, 408 | 502 | 503 | 504) {
        return FailureKind::Transport;
    }
    FailureKind::Other
}

/// One piece of an endpoint reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    InlineData {
        mime_type: Option<String>,
        data: String,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCall {
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextCall {
    pub model: String,
    pub prompt: String,
    pub temperature: Option<f64>,
    pub system_instruction: Option<String>,
}

impl TextCall {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: None,
            system_instruction: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

pub trait ImageEndpoint: Send + Sync {
    fn name(&self) -> &str;
    fn generate_image(&self, call: &ImageCall) -> Result<Vec<ContentPart>, EndpointError>;
}

pub trait TextEndpoint: Send + Sync {
    fn name(&self) -> &str;
    fn generate_text(&self, call: &TextCall) -> Result<String, EndpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_are_recognized_by_status_code_and_marker() {
        assert_eq!(classify_http_failure(429, ""), FailureKind::RateLimited);
        assert_eq!(
            classify_http_failure(
                400,
                r#"{"error":{"code":429,"message":"Quota exceeded","status":"UNKNOWN"}}"#
            ),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_http_failure(
                500,
                r#"{"error":{"code":500,"status":"RESOURCE_EXHAUSTED"}}"#
            ),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_http_failure(500, "upstream said RESOURCE_EXHAUSTED"),
            FailureKind::RateLimited
        );
    }

    #[test]
    fn permission_and_transport_failures_are_distinct() {
        assert_eq!(
            classify_http_failure(403, r#"{"error":{"code":403,"status":"PERMISSION_DENIED"}}"#),
            FailureKind::PermissionDenied
        );
        assert_eq!(
            classify_http_failure(400, r#"{"error":{"status":"UNAUTHENTICATED"}}"#),
            FailureKind::PermissionDenied
        );
        assert_eq!(classify_http_failure(503, "busy"), FailureKind::Transport);
        assert_eq!(classify_http_failure(400, "bad request"), FailureKind::Other);
    }

    #[test]
    fn endpoint_error_displays_message_and_keeps_status() {
        let err = EndpointError::rate_limited("slow down");
        assert_eq!(err.to_string(), "slow down");
        assert_eq!(err.status, Some(429));
        assert_eq!(err.kind.as_str(), "rate_limited");
        assert_eq!(EndpointError::no_image_data().kind, FailureKind::NoImageData);
    }

    #[test]
    fn text_call_builder_sets_optional_fields() {
        let call = TextCall::new("gemini-2.5-flash", "hello")
            .with_temperature(0.4)
            .with_system_instruction("be brief");
        assert_eq!(call.temperature, Some(0.4));
        assert_eq!(call.system_instruction.as_deref(), Some("be brief"));
    }
}
