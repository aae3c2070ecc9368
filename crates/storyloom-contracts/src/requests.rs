use serde::{Deserialize, Serialize};

use crate::styles::{ContentRating, ImageStyle};

/// Upper bound on images per batch.
pub const MAX_IMAGE_COUNT: u32 = 30;

/// One illustration batch as asked for by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub style: ImageStyle,
    #[serde(default)]
    pub is_adult: bool,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: ImageStyle::default(),
            is_adult: false,
            count: default_count(),
        }
    }

    pub fn with_style(mut self, style: ImageStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_adult(mut self, is_adult: bool) -> Self {
        self.is_adult = is_adult;
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn rating(&self) -> ContentRating {
        ContentRating::from_adult_flag(self.is_adult)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("Image prompt is empty.".to_string());
        }
        if self.count == 0 {
            return Err("Image count must be at least 1.".to_string());
        }
        if self.count > MAX_IMAGE_COUNT {
            return Err(format!(
                "Image count {} exceeds the limit of {MAX_IMAGE_COUNT}.",
                self.count
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_sets_fields() {
        let request = GenerationRequest::new("a lighthouse at dusk")
            .with_style(ImageStyle::Anime)
            .with_adult(true)
            .with_count(4);
        assert_eq!(request.style, ImageStyle::Anime);
        assert_eq!(request.rating(), ContentRating::Mature);
        assert_eq!(request.count, 4);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_prompt_and_bad_counts() {
        assert_eq!(
            GenerationRequest::new("   ").validate(),
            Err("Image prompt is empty.".to_string())
        );
        assert!(GenerationRequest::new("x").with_count(0).validate().is_err());
        assert!(GenerationRequest::new("x")
            .with_count(MAX_IMAGE_COUNT)
            .validate()
            .is_ok());
        assert_eq!(
            GenerationRequest::new("x").with_count(31).validate(),
            Err("Image count 31 exceeds the limit of 30.".to_string())
        );
    }

    #[test]
    fn deserialize_fills_defaults() -> anyhow::Result<()> {
        let request: GenerationRequest = serde_json::from_value(json!({
            "prompt": "a quiet harbor",
        }))?;
        assert_eq!(request.style, ImageStyle::DigitalArt);
        assert!(!request.is_adult);
        assert_eq!(request.count, 1);
        Ok(())
    }
}
