use std::sync::Arc;

use serde_json::json;
use storyloom_contracts::events::EventWriter;

use crate::endpoint::{TextCall, TextEndpoint};
use crate::{map_object, truncate_text};

pub const IDEA_FALLBACK: &str = "Could not generate a story idea right now. Please try again.";
pub const CHARACTER_FALLBACK: &str = "Could not suggest a character right now. Please try again.";
pub const TRANSLATION_FALLBACK: &str = "Translation failed. Please try again.";

const SYSTEM_INSTRUCTION: &str =
    "You are a co-author helping a novelist. Answer with the requested text only.";

/// Longest slice of recent prose sent along with a request.
const RECENT_TEXT_CHARS: usize = 4000;

/// True when a helper result means "nothing produced".
pub fn is_placeholder(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty()
        || trimmed == IDEA_FALLBACK
        || trimmed == CHARACTER_FALLBACK
        || trimmed == TRANSLATION_FALLBACK
}

/// Story details a caller passes along with a helper request. Blank fields are
/// left out of the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryContext {
    pub title: String,
    pub genre: String,
    pub synopsis: String,
    pub recent_text: String,
}

impl StoryContext {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    pub fn with_synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.synopsis = synopsis.into();
        self
    }

    pub fn with_recent_text(mut self, recent_text: impl Into<String>) -> Self {
        self.recent_text = recent_text.into();
        self
    }

    fn render(&self) -> String {
        let mut lines = Vec::new();
        for (label, value) in [
            ("Title", self.title.as_str()),
            ("Genre", self.genre.as_str()),
            ("Synopsis", self.synopsis.as_str()),
        ] {
            if !value.trim().is_empty() {
                lines.push(format!("{label}: {}", value.trim()));
            }
        }
        let recent = tail_chars(self.recent_text.trim(), RECENT_TEXT_CHARS);
        if !recent.is_empty() {
            lines.push(format!("Recent text:\n{recent}"));
        }
        lines.join("\n")
    }
}

fn tail_chars(value: &str, max_chars: usize) -> &str {
    let count = value.chars().count();
    if count <= max_chars {
        return value;
    }
    match value.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &value[idx..],
        None => value,
    }
}

/// Single-shot text helpers. No retries: a failed call degrades to an empty
/// string or a fixed placeholder.
pub struct StoryAssistant {
    endpoint: Arc<dyn TextEndpoint>,
    model: String,
    events: EventWriter,
}

impl StoryAssistant {
    pub fn new(endpoint: Arc<dyn TextEndpoint>, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
            events: EventWriter::disabled(),
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generate_story_idea(&self, genre: &str, premise: &str) -> String {
        let mut prompt = String::from(
            "Suggest one original story idea for a novel: a title, a two-sentence \
             premise and the central conflict.",
        );
        if !genre.trim().is_empty() {
            prompt.push_str(&format!("\nGenre: {}", genre.trim()));
        }
        if !premise.trim().is_empty() {
            prompt.push_str(&format!("\nBuild on this: {}", premise.trim()));
        }
        self.complete("story_idea", prompt, 0.9, IDEA_FALLBACK)
    }

    pub fn expand_text(&self, context: &StoryContext, text: &str) -> String {
        if text.trim().is_empty() && context.recent_text.trim().is_empty() {
            return String::new();
        }
        let prompt = format!(
            "Continue the story from where it stops, matching its voice and tense. \
             Write two or three paragraphs.\n{}\nContinue from:\n{}",
            context.render(),
            text.trim()
        );
        self.complete("expand", prompt, 0.8, "")
    }

    pub fn suggest_character(&self, context: &StoryContext, role: &str) -> String {
        let role = if role.trim().is_empty() {
            "a supporting character"
        } else {
            role.trim()
        };
        let prompt = format!(
            "Suggest {role} for this story. Give a name, age, appearance, personality, \
             motivation and a secret.\n{}",
            context.render()
        );
        self.complete("character", prompt, 0.8, CHARACTER_FALLBACK)
    }

    pub fn translate_to_bengali(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        let prompt = format!(
            "Translate the following text into Bengali. Keep paragraph breaks and \
             proper names.\n\n{}",
            text.trim()
        );
        self.complete("translate_bengali", prompt, 0.2, TRANSLATION_FALLBACK)
    }

    /// Condenses chapter prose into one visual scene, ready for the image
    /// generator.
    pub fn generate_scene_description(&self, chapter_text: &str) -> String {
        if chapter_text.trim().is_empty() {
            return String::new();
        }
        let prompt = format!(
            "Describe the most striking visual moment of this chapter in two or three \
             sentences for an illustrator: setting, characters, lighting and mood. \
             No dialogue.\n\n{}",
            tail_chars(chapter_text.trim(), RECENT_TEXT_CHARS)
        );
        self.complete("scene_description", prompt, 0.4, "")
    }

    fn complete(&self, helper: &str, prompt: String, temperature: f64, fallback: &str) -> String {
        let call = TextCall::new(self.model.clone(), prompt)
            .with_temperature(temperature)
            .with_system_instruction(SYSTEM_INSTRUCTION);
        match self.endpoint.generate_text(&call) {
            Ok(text) if !text.trim().is_empty() => {
                let text = text.trim().to_string();
                self.events.record(
                    "text_generated",
                    map_object(json!({
                        "helper": helper,
                        "provider": self.endpoint.name(),
                        "model": self.model,
                        "chars": text.chars().count(),
                    })),
                );
                text
            }
            Ok(_) => {
                self.record_failure(helper, "empty", "empty reply");
                fallback.to_string()
            }
            Err(err) => {
                self.record_failure(helper, err.kind.as_str(), &err.message);
                fallback.to_string()
            }
        }
    }

    fn record_failure(&self, helper: &str, kind: &str, message: &str) {
        self.events.record(
            "text_failed",
            map_object(json!({
                "helper": helper,
                "provider": self.endpoint.name(),
                "model": self.model,
                "kind": kind,
                "message": truncate_text(message, 512),
            })),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::endpoint::EndpointError;

    struct CapturingEndpoint {
        reply: Result<String, EndpointError>,
        calls: Mutex<Vec<TextCall>>,
    }

    impl CapturingEndpoint {
        fn replying(reply: Result<String, EndpointError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<TextCall> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }
    }

    impl TextEndpoint for CapturingEndpoint {
        fn name(&self) -> &str {
            "capturing"
        }

        fn generate_text(&self, call: &TextCall) -> Result<String, EndpointError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call.clone());
            }
            self.reply.clone()
        }
    }

    fn assistant(endpoint: &Arc<CapturingEndpoint>, events: &EventWriter) -> StoryAssistant {
        let endpoint: Arc<dyn TextEndpoint> = endpoint.clone();
        StoryAssistant::new(endpoint, "gemini-2.5-flash").with_events(events.clone())
    }

    fn context() -> StoryContext {
        StoryContext::new("The Salt Road")
            .with_genre("fantasy")
            .with_synopsis("A smuggler crosses the desert.")
            .with_recent_text("The caravan halted at dusk.")
    }

    #[test]
    fn helpers_return_trimmed_model_text() {
        let endpoint =
            CapturingEndpoint::replying(Ok("  A lighthouse keeper's secret.\n".to_string()));
        let events = EventWriter::in_memory("test");
        let helper = assistant(&endpoint, &events);

        assert_eq!(
            helper.generate_story_idea("mystery", "islands"),
            "A lighthouse keeper's secret."
        );
        let calls = endpoint.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].prompt.contains("Genre: mystery"));
        assert_eq!(calls[0].temperature, Some(0.9));
        assert_eq!(calls[0].model, "gemini-2.5-flash");
        assert_eq!(events.recorded_types(), vec!["text_generated".to_string()]);
    }

    #[test]
    fn failures_degrade_to_placeholders_without_retrying() {
        let endpoint = CapturingEndpoint::replying(Err(EndpointError::rate_limited("quota")));
        let events = EventWriter::in_memory("test");
        let helper = assistant(&endpoint, &events);

        assert_eq!(helper.generate_story_idea("", ""), IDEA_FALLBACK);
        assert_eq!(helper.suggest_character(&context(), "a rival"), CHARACTER_FALLBACK);
        assert_eq!(helper.translate_to_bengali("Hello"), TRANSLATION_FALLBACK);
        assert_eq!(helper.expand_text(&context(), "She ran."), "");
        assert_eq!(helper.generate_scene_description("A storm broke."), "");
        assert_eq!(endpoint.calls().len(), 5);

        let failures = events
            .recorded()
            .iter()
            .filter(|event| event["type"] == "text_failed" && event["kind"] == "rate_limited")
            .count();
        assert_eq!(failures, 5);
    }

    #[test]
    fn blank_replies_count_as_nothing_produced() {
        let endpoint = CapturingEndpoint::replying(Ok("   ".to_string()));
        let events = EventWriter::in_memory("test");
        let helper = assistant(&endpoint, &events);
        assert!(is_placeholder(&helper.suggest_character(&context(), "")));
        assert!(is_placeholder(&helper.expand_text(&context(), "")));
    }

    #[test]
    fn blank_inputs_skip_the_endpoint() {
        let endpoint = CapturingEndpoint::replying(Ok("unused".to_string()));
        let events = EventWriter::in_memory("test");
        let helper = assistant(&endpoint, &events);
        assert_eq!(helper.translate_to_bengali("  "), "");
        assert_eq!(helper.generate_scene_description(""), "");
        assert_eq!(helper.expand_text(&StoryContext::default(), " "), "");
        assert!(endpoint.calls().is_empty());
    }

    #[test]
    fn context_is_rendered_into_prompts() {
        let endpoint = CapturingEndpoint::replying(Ok("More prose.".to_string()));
        let events = EventWriter::in_memory("test");
        let helper = assistant(&endpoint, &events);
        helper.expand_text(&context(), "She reached for the lantern.");

        let prompt = &endpoint.calls()[0].prompt;
        assert!(prompt.contains("Title: The Salt Road"));
        assert!(prompt.contains("Synopsis: A smuggler crosses the desert."));
        assert!(prompt.contains("Recent text:\nThe caravan halted at dusk."));
        assert!(prompt.ends_with("She reached for the lantern."));
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder(""));
        assert!(is_placeholder(&format!(" {TRANSLATION_FALLBACK}\n")));
        assert!(is_placeholder(IDEA_FALLBACK));
        assert!(!is_placeholder("A real idea."));
    }

    #[test]
    fn tail_chars_keeps_the_end_of_long_text() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 3), "ab");
        assert_eq!(tail_chars("ঝড়ের রাত", 3), "রাত");
    }
}
