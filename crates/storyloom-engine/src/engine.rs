use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use storyloom_contracts::events::{EventPayload, EventWriter};
use storyloom_contracts::models::{Capability, ModelSelector, ModelSpec};
use storyloom_contracts::requests::GenerationRequest;
use storyloom_contracts::runs::{new_session_id, write_summary, BatchSummary, SlotStatus};

use crate::assistant::{is_placeholder, StoryAssistant};
use crate::batch::{BatchErrorKind, BatchImageGenerator};
use crate::config::EngineConfig;
use crate::data_uri::{decode_data_uri, extension_for_mime};
use crate::providers::{default_provider_registry, ProviderRegistry};
use crate::retry::{CancelToken, Pacer, ThreadPacer};
use crate::{error_chain_text, map_object, now_utc_iso};

/// A finished illustration batch: data URIs, the files they were saved to, and
/// the per-slot summary.
#[derive(Debug, Clone)]
pub struct Illustration {
    pub images: Vec<String>,
    pub paths: Vec<PathBuf>,
    pub summary: BatchSummary,
    pub summary_path: PathBuf,
}

/// One co-authoring session: model selection, providers, event log and the
/// session directory images are saved into.
pub struct CoauthorEngine {
    config: EngineConfig,
    session_id: String,
    events: EventWriter,
    model_selector: ModelSelector,
    providers: ProviderRegistry,
    pacer: Arc<dyn Pacer>,
    last_fallback_reason: Option<String>,
}

impl CoauthorEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        fs::create_dir_all(&config.session_dir).with_context(|| {
            format!(
                "failed to create session dir {}",
                config.session_dir.display()
            )
        })?;
        let session_id = config
            .session_dir
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(new_session_id);
        let events = EventWriter::new(config.resolved_events_path(), session_id.clone());
        events.emit(
            "session_started",
            map_object(json!({
                "session_dir": config.session_dir.to_string_lossy().to_string(),
                "text_model": config.text_model,
                "image_model": config.image_model,
            })),
        )?;

        Ok(Self {
            providers: default_provider_registry(&config.gemini),
            config,
            session_id,
            events,
            model_selector: ModelSelector::new(None),
            pacer: Arc::new(ThreadPacer::default()),
            last_fallback_reason: None,
        })
    }

    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_dir(&self) -> &Path {
        &self.config.session_dir
    }

    pub fn last_fallback_reason(&self) -> Option<&str> {
        self.last_fallback_reason.as_deref()
    }

    pub fn emit_event(&self, event_type: &str, payload: EventPayload) -> Result<Value> {
        self.events.emit(event_type, payload)
    }

    fn select_model(&mut self, capability: Capability) -> Result<ModelSpec> {
        let requested = match capability {
            Capability::Text => self.config.text_model.clone(),
            Capability::Image => self.config.image_model.clone(),
        };
        let selection = self
            .model_selector
            .select(requested.as_deref(), capability)
            .map_err(|message| anyhow!(message))?;
        self.last_fallback_reason = selection.fallback_reason.clone();
        if let Some(reason) = selection.fallback_reason {
            self.events.record(
                "model_fallback",
                map_object(json!({
                    "capability": capability.as_str(),
                    "requested": selection.requested,
                    "model": selection.model.name,
                    "reason": reason,
                })),
            );
        }
        Ok(selection.model)
    }

    pub fn image_generator(&mut self) -> Result<BatchImageGenerator> {
        let model = self.select_model(Capability::Image)?;
        let Some(endpoint) = self.providers.image(&model.provider) else {
            bail!(
                "No image provider '{}' registered for model '{}'",
                model.provider,
                model.name
            );
        };
        Ok(BatchImageGenerator::new(endpoint, model.name)
            .with_policy(self.config.retry.clone())
            .with_pacer(self.pacer.clone())
            .with_events(self.events.clone()))
    }

    pub fn assistant(&mut self) -> Result<StoryAssistant> {
        let model = self.select_model(Capability::Text)?;
        let Some(endpoint) = self.providers.text(&model.provider) else {
            bail!(
                "No text provider '{}' registered for model '{}'",
                model.provider,
                model.name
            );
        };
        Ok(StoryAssistant::new(endpoint, model.name).with_events(self.events.clone()))
    }

    /// Runs one batch, saves every produced image into the session directory
    /// and writes `summary.json`. The summary is written for failed batches
    /// too; the `BatchError` is then returned inside the `anyhow::Error`.
    /// An image that cannot be saved abandons only its own slot.
    pub fn illustrate(
        &mut self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<Illustration> {
        let started_at = now_utc_iso();
        let generator = self.image_generator()?;
        let model = generator.model().to_string();

        let outcome = generator.generate_images(request, cancel);
        let (images, mut slots, cancelled, failure) = match outcome {
            Ok(result) => (result.images, result.slots, result.cancelled, None),
            Err(err) if err.kind == BatchErrorKind::InvalidRequest => return Err(err.into()),
            Err(err) => (
                Vec::new(),
                err.slots.clone(),
                err.kind == BatchErrorKind::Cancelled,
                Some(err),
            ),
        };

        let stamp = chrono::Utc::now().timestamp_millis();
        let produced = images.len();
        let mut saved = Vec::with_capacity(produced);
        let mut paths = Vec::with_capacity(produced);
        let succeeded = slots
            .iter_mut()
            .filter(|slot| slot.status == SlotStatus::Succeeded);
        for (slot, image) in succeeded.zip(images) {
            match self.save_image(&image, stamp, slot.slot) {
                Ok(path) => {
                    slot.artifact = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(str::to_string);
                    paths.push(path);
                    saved.push(image);
                }
                Err(err) => {
                    let message = error_chain_text(&err, 512);
                    self.events.record(
                        "image_save_failed",
                        map_object(json!({
                            "slot": slot.slot,
                            "error": message,
                        })),
                    );
                    slot.status = SlotStatus::Abandoned;
                    slot.failure_kind = Some("save_failed".to_string());
                    slot.message = Some(message);
                }
            }
        }
        let error = match &failure {
            Some(err) => Some(err.message.clone()),
            None if saved.is_empty() => Some(format!(
                "None of the {produced} generated images could be saved."
            )),
            None => None,
        };

        let summary = BatchSummary {
            session_id: self.session_id.clone(),
            started_at,
            finished_at: now_utc_iso(),
            model,
            style: request.style.label().to_string(),
            requested: request.count,
            produced: saved.len() as u32,
            cancelled,
            slots,
        };
        let summary_path = self.config.session_dir.join("summary.json");
        let extra = map_object(json!({
            "fallback_reason": self.last_fallback_reason,
            "error": error.as_deref(),
        }));
        write_summary(&summary_path, &summary, Some(&extra))?;

        if let Some(err) = failure {
            return Err(err.into());
        }
        if let Some(message) = error {
            bail!(message);
        }

        self.events.record(
            "illustration_saved",
            map_object(json!({
                "paths": paths
                    .iter()
                    .map(|path| path.to_string_lossy().to_string())
                    .collect::<Vec<_>>(),
                "summary_path": summary_path.to_string_lossy().to_string(),
            })),
        );
        Ok(Illustration {
            images: saved,
            paths,
            summary,
            summary_path,
        })
    }

    /// Describes a scene from chapter prose, then illustrates it with the
    /// style, rating and count of `template`.
    pub fn illustrate_chapter(
        &mut self,
        chapter_text: &str,
        template: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<Illustration> {
        let scene = self.assistant()?.generate_scene_description(chapter_text);
        if is_placeholder(&scene) {
            bail!("Could not describe a scene for this chapter.");
        }
        let request = GenerationRequest {
            prompt: scene,
            ..template.clone()
        };
        self.illustrate(&request, cancel)
    }

    fn save_image(&self, data_uri: &str, stamp: i64, slot: u32) -> Result<PathBuf> {
        let (mime, bytes) = decode_data_uri(data_uri)
            .with_context(|| format!("slot {slot} returned an unreadable image"))?;
        let path = self.config.session_dir.join(format!(
            "image-{stamp}-{slot:02}.{}",
            extension_for_mime(&mime)
        ));
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
