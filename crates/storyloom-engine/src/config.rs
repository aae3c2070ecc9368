use std::path::PathBuf;

use crate::gemini::GeminiConfig;
use crate::non_empty_env;
use crate::retry::RetryPolicy;

/// Everything a `CoauthorEngine` needs, built by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub session_dir: PathBuf,
    /// Defaults to `<session_dir>/events.jsonl`.
    pub events_path: Option<PathBuf>,
    pub text_model: Option<String>,
    pub image_model: Option<String>,
    pub gemini: GeminiConfig,
    pub retry: RetryPolicy,
}

impl EngineConfig {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_dir: session_dir.into(),
            events_path: None,
            text_model: None,
            image_model: None,
            gemini: GeminiConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Reads `STORYLOOM_TEXT_MODEL`, `STORYLOOM_IMAGE_MODEL` and the Gemini and
    /// retry variables.
    pub fn from_env(session_dir: impl Into<PathBuf>) -> Self {
        Self {
            text_model: non_empty_env("STORYLOOM_TEXT_MODEL"),
            image_model: non_empty_env("STORYLOOM_IMAGE_MODEL"),
            gemini: GeminiConfig::from_env(),
            retry: RetryPolicy::from_env(),
            ..Self::new(session_dir)
        }
    }

    pub fn with_events_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.events_path = Some(path.into());
        self
    }

    pub fn with_text_model(mut self, model: Option<String>) -> Self {
        if model.is_some() {
            self.text_model = model;
        }
        self
    }

    pub fn with_image_model(mut self, model: Option<String>) -> Self {
        if model.is_some() {
            self.image_model = model;
        }
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn resolved_events_path(&self) -> PathBuf {
        self.events_path
            .clone()
            .unwrap_or_else(|| self.session_dir.join("events.jsonl"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_default_to_session_dir() {
        let config = EngineConfig::new("/tmp/session-a");
        assert_eq!(
            config.resolved_events_path(),
            PathBuf::from("/tmp/session-a/events.jsonl")
        );
        let config = config.with_events_path("/tmp/elsewhere.jsonl");
        assert_eq!(
            config.resolved_events_path(),
            PathBuf::from("/tmp/elsewhere.jsonl")
        );
    }

    #[test]
    fn model_overrides_ignore_none() {
        let config = EngineConfig::new("/tmp/s")
            .with_image_model(Some("dryrun-image-1".to_string()))
            .with_image_model(None);
        assert_eq!(config.image_model.as_deref(), Some("dryrun-image-1"));
        assert!(config.text_model.is_none());
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
