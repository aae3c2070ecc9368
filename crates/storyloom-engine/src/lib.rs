use std::env;

use serde_json::{Map, Value};

mod assistant;
mod batch;
mod config;
mod data_uri;
mod dryrun;
mod endpoint;
mod engine;
mod gemini;
mod prompt;
mod providers;
mod retry;

pub use assistant::{
    is_placeholder, StoryAssistant, StoryContext, CHARACTER_FALLBACK, IDEA_FALLBACK,
    TRANSLATION_FALLBACK,
};
pub use batch::{image_from_parts, BatchError, BatchErrorKind, BatchImageGenerator, BatchResult};
pub use config::EngineConfig;
pub use data_uri::{decode_data_uri, extension_for_mime, to_data_uri, DEFAULT_IMAGE_MIME};
pub use dryrun::DryrunEndpoint;
pub use endpoint::{
    classify_http_failure, ContentPart, EndpointError, FailureKind, ImageCall, ImageEndpoint,
    TextCall, TextEndpoint,
};
pub use engine::{CoauthorEngine, Illustration};
pub use gemini::{parse_image_response, parse_text_response, GeminiClient, GeminiConfig};
pub use prompt::{compose_image_prompt, prompt_fingerprint, DEFAULT_ASPECT_RATIO, IMAGE_DIRECTIVE};
pub use providers::{default_provider_registry, ProviderRegistry};
pub use retry::{
    CancelToken, ChattyTextPolicy, Pacer, RetryBudget, RetryDecision, RetryPolicy, ThreadPacer,
};

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str, default: u64, min: u64, max: u64) -> u64 {
    non_empty_env(key)
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(|value| value.clamp(min, max))
        .unwrap_or(default)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn now_utc_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}
