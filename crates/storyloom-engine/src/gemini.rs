use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use crate::endpoint::{
    classify_http_failure, ContentPart, EndpointError, ImageCall, ImageEndpoint, TextCall,
    TextEndpoint,
};
use crate::{env_u64, non_empty_env, truncate_text};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_SECS: u64 = 90;

const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "IMAGE_PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")),
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            request_timeout: Duration::from_secs(env_u64(
                "STORYLOOM_REQUEST_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
                15,
                300,
            )),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = Some(key.trim().to_string()).filter(|value| !value.is_empty());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.clamp(Duration::from_secs(15), Duration::from_secs(300));
        self
    }
}

/// Calls the Gemini `generateContent` API for both images and text.
pub struct GeminiClient {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn post(&self, model: &str, payload: &Value) -> Result<Value, EndpointError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(EndpointError::permission_denied(
                "GEMINI_API_KEY or GOOGLE_API_KEY not set",
            ));
        };
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.config.request_timeout)
            .json(payload)
            .send()
            .map_err(|err| {
                EndpointError::transport(format!("Gemini request failed ({endpoint}): {err}"))
            })?;

        let status = response.status();
        let code = status.as_u16();
        let body = response.text().map_err(|err| {
            EndpointError::transport(format!("Gemini response body read failed: {err}"))
        })?;
        if !status.is_success() {
            return Err(EndpointError::new(
                classify_http_failure(code, &body),
                format!("Gemini request failed ({code}): {}", truncate_text(&body, 512)),
            )
            .with_status(code));
        }
        serde_json::from_str(&body).map_err(|err| {
            EndpointError::other(format!("Gemini returned invalid JSON payload: {err}"))
        })
    }
}

pub(crate) fn image_payload(call: &ImageCall) -> Value {
    let mut generation_config = Map::new();
    generation_config.insert("responseModalities".to_string(), json!(["IMAGE"]));
    if !call.aspect_ratio.trim().is_empty() {
        generation_config.insert(
            "imageConfig".to_string(),
            json!({ "aspectRatio": call.aspect_ratio.trim() }),
        );
    }
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": call.prompt }],
        }],
        "generationConfig": Value::Object(generation_config),
    })
}

pub(crate) fn text_payload(call: &TextCall) -> Value {
    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        json!([{
            "role": "user",
            "parts": [{ "text": call.prompt }],
        }]),
    );
    if let Some(instruction) = call
        .system_instruction
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        payload.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [{ "text": instruction }] }),
        );
    }
    if let Some(temperature) = call.temperature {
        payload.insert(
            "generationConfig".to_string(),
            json!({ "temperature": temperature }),
        );
    }
    Value::Object(payload)
}

fn candidate_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .map(|candidates| {
            candidates
                .iter()
                .filter_map(|candidate| {
                    candidate
                        .get("content")
                        .and_then(|content| content.get("parts"))
                        .and_then(Value::as_array)
                })
                .flatten()
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn finish_reasons(response: &Value) -> Vec<String> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .map(|candidates| {
            candidates
                .iter()
                .filter_map(|candidate| candidate.get("finishReason").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn block_reason(response: &Value) -> Option<String> {
    response
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Extracts image and text parts from a `generateContent` reply. A reply with
/// neither is returned as an empty list; the caller decides what that means.
pub fn parse_image_response(response: &Value) -> Result<Vec<ContentPart>, EndpointError> {
    if let Some(reason) = block_reason(response) {
        return Err(EndpointError::safety_refused(format!(
            "Prompt blocked by safety filters ({reason})."
        )));
    }

    let mut parts = Vec::new();
    for part in candidate_parts(response) {
        if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object);
        if let Some(inline) = inline {
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(str::to_string);
            parts.push(ContentPart::InlineData {
                mime_type,
                data: data.to_string(),
            });
            continue;
        }
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            parts.push(ContentPart::Text(text.to_string()));
        }
    }

    if parts.is_empty() {
        if let Some(reason) = finish_reasons(response)
            .into_iter()
            .find(|reason| SAFETY_FINISH_REASONS.contains(&reason.as_str()))
        {
            return Err(EndpointError::safety_refused(format!(
                "Image generation stopped by safety filters ({reason})."
            )));
        }
    }
    Ok(parts)
}

pub fn parse_text_response(response: &Value) -> Result<String, EndpointError> {
    if let Some(reason) = block_reason(response) {
        return Err(EndpointError::safety_refused(format!(
            "Prompt blocked by safety filters ({reason})."
        )));
    }
    let text = candidate_parts(response)
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<String>();
    if text.trim().is_empty() {
        return Err(EndpointError::other("Gemini returned no text."));
    }
    Ok(text)
}

impl ImageEndpoint for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_image(&self, call: &ImageCall) -> Result<Vec<ContentPart>, EndpointError> {
        let response = self.post(&call.model, &image_payload(call))?;
        parse_image_response(&response)
    }
}

impl TextEndpoint for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_text(&self, call: &TextCall) -> Result<String, EndpointError> {
        let response = self.post(&call.model, &text_payload(call))?;
        parse_text_response(&response)
    }
}
