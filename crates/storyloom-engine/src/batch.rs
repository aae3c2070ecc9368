use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use storyloom_contracts::events::EventWriter;
use storyloom_contracts::requests::GenerationRequest;
use storyloom_contracts::runs::{SlotReport, SlotStatus};

use crate::data_uri::to_data_uri;
use crate::endpoint::{ContentPart, EndpointError, FailureKind, ImageCall, ImageEndpoint};
use crate::prompt::{compose_image_prompt, prompt_fingerprint, DEFAULT_ASPECT_RATIO};
use crate::retry::{CancelToken, Pacer, RetryBudget, RetryDecision, RetryPolicy, ThreadPacer};
use crate::{map_object, truncate_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchErrorKind {
    InvalidRequest,
    /// Every slot was processed and none produced an image.
    Exhausted,
    /// Cancelled before any image was produced.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BatchError {
    pub kind: BatchErrorKind,
    pub message: String,
    /// Most recent per-slot failure, for callers that explain the error.
    pub last_failure: Option<FailureKind>,
    pub slots: Vec<SlotReport>,
}

impl BatchError {
    fn invalid(message: String) -> Self {
        Self {
            kind: BatchErrorKind::InvalidRequest,
            message,
            last_failure: None,
            slots: Vec::new(),
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BatchError {}

/// Images produced by a batch, in slot-completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub images: Vec<String>,
    pub slots: Vec<SlotReport>,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        self.images.len() < self.slots.len()
    }
}

#[derive(Debug)]
enum SlotState {
    Pending,
    Retrying(FailureKind),
    Succeeded(String),
    Abandoned(EndpointError),
}

struct SlotRun {
    state: SlotState,
    attempts: u32,
}

/// Requests images one at a time and keeps whatever succeeds.
pub struct BatchImageGenerator {
    endpoint: Arc<dyn ImageEndpoint>,
    model: String,
    policy: RetryPolicy,
    pacer: Arc<dyn Pacer>,
    events: EventWriter,
}

impl BatchImageGenerator {
    pub fn new(endpoint: Arc<dyn ImageEndpoint>, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
            policy: RetryPolicy::default(),
            pacer: Arc::new(ThreadPacer::default()),
            events: EventWriter::disabled(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One call to the image endpoint, no retries.
    pub fn generate_single_image(&self, prompt: &str) -> Result<String, EndpointError> {
        let call = ImageCall {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
        };
        let parts = self.endpoint.generate_image(&call)?;
        image_from_parts(parts)
    }

    pub fn generate_images(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<BatchResult, BatchError> {
        request.validate().map_err(BatchError::invalid)?;

        let prompt = compose_image_prompt(&request.prompt, request.style, request.rating());
        let fingerprint = prompt_fingerprint(&prompt);
        self.events.record(
            "batch_started",
            map_object(json!({
                "model": self.model,
                "provider": self.endpoint.name(),
                "style": request.style.label(),
                "is_adult": request.is_adult,
                "count": request.count,
                "prompt_fingerprint": fingerprint,
            })),
        );

        let mut images = Vec::new();
        let mut slots = Vec::with_capacity(request.count as usize);
        let mut last_failure = None;

        for slot in 0..request.count {
            if cancel.is_cancelled() {
                slots.push(SlotReport::skipped(slot));
                continue;
            }

            let run = self.run_slot(slot, &prompt, cancel);
            match run.state {
                SlotState::Succeeded(image) => {
                    self.events.record(
                        "slot_succeeded",
                        map_object(json!({
                            "slot": slot,
                            "attempts": run.attempts,
                        })),
                    );
                    images.push(image);
                    slots.push(SlotReport {
                        slot,
                        status: SlotStatus::Succeeded,
                        attempts: run.attempts,
                        failure_kind: None,
                        message: None,
                        artifact: None,
                    });
                    if slot + 1 < request.count {
                        self.pacer.pause(self.policy.politeness_delay, cancel);
                    }
                }
                SlotState::Abandoned(err) => {
                    self.events.record(
                        "slot_abandoned",
                        map_object(json!({
                            "slot": slot,
                            "attempts": run.attempts,
                            "kind": err.kind.as_str(),
                            "status": err.status,
                            "message": truncate_text(&err.message, 512),
                        })),
                    );
                    last_failure = Some(err.kind);
                    slots.push(SlotReport {
                        slot,
                        status: SlotStatus::Abandoned,
                        attempts: run.attempts,
                        failure_kind: Some(err.kind.as_str().to_string()),
                        message: Some(truncate_text(&err.message, 512)),
                        artifact: None,
                    });
                }
                SlotState::Pending | SlotState::Retrying(_) => {
                    slots.push(SlotReport::skipped(slot));
                }
            }
        }

        let cancelled = cancel.is_cancelled();
        if cancelled {
            self.events.record(
                "batch_cancelled",
                map_object(json!({
                    "produced": images.len(),
                    "requested": request.count,
                })),
            );
        }

        if images.is_empty() {
            let (kind, message) = if cancelled {
                (
                    BatchErrorKind::Cancelled,
                    "Image generation was cancelled before any image was produced.".to_string(),
                )
            } else {
                (
                    BatchErrorKind::Exhausted,
                    match last_failure {
                        Some(kind) => format!(
                            "Unable to generate images: all {} slots failed \
                             (last failure: {kind}).",
                            request.count
                        ),
                        None => "Unable to generate images.".to_string(),
                    },
                )
            };
            self.events.record(
                "batch_failed",
                map_object(json!({
                    "kind": format!("{kind:?}"),
                    "last_failure": last_failure.map(FailureKind::as_str),
                    "message": message,
                })),
            );
            return Err(BatchError {
                kind,
                message,
                last_failure,
                slots,
            });
        }

        self.events.record(
            "batch_finished",
            map_object(json!({
                "requested": request.count,
                "produced": images.len(),
                "cancelled": cancelled,
            })),
        );
        Ok(BatchResult {
            images,
            slots,
            cancelled,
        })
    }

    fn run_slot(&self, slot: u32, prompt: &str, cancel: &CancelToken) -> SlotRun {
        let mut state = SlotState::Pending;
        let mut budget = RetryBudget::default();
        let mut attempts = 0;

        loop {
            state = match state {
                open @ (SlotState::Pending | SlotState::Retrying(_)) => {
                    if cancel.is_cancelled() {
                        return SlotRun {
                            state: open,
                            attempts,
                        };
                    }
                    let retrying_after = match open {
                        SlotState::Retrying(kind) => Some(kind.as_str()),
                        _ => None,
                    };
                    attempts += 1;
                    self.events.record(
                        "slot_attempt",
                        map_object(json!({
                            "slot": slot,
                            "attempt": attempts,
                            "retrying_after": retrying_after,
                        })),
                    );
                    match self.generate_single_image(prompt) {
                        Ok(image) => SlotState::Succeeded(image),
                        Err(err) => match self.policy.decide(err.kind, &budget) {
                            RetryDecision::Retry(delay) => {
                                budget.consume(err.kind);
                                self.events.record(
                                    "slot_retry_scheduled",
                                    map_object(json!({
                                        "slot": slot,
                                        "attempt": attempts,
                                        "kind": err.kind.as_str(),
                                        "delay_ms": delay.as_millis() as u64,
                                    })),
                                );
                                if !self.pacer.pause(delay, cancel) {
                                    return SlotRun {
                                        state: SlotState::Abandoned(err),
                                        attempts,
                                    };
                                }
                                SlotState::Retrying(err.kind)
                            }
                            RetryDecision::Abandon => SlotState::Abandoned(err),
                        },
                    }
                }
                done @ (SlotState::Succeeded(_) | SlotState::Abandoned(_)) => {
                    return SlotRun {
                        state: done,
                        attempts,
                    };
                }
            };
        }
    }
}

/// Turns the parts of one image reply into a data URI, or classifies why it
/// holds none. Inline image data wins over any accompanying text; inline data
/// that is not valid base64 counts as no image.
pub fn image_from_parts(parts: Vec<ContentPart>) -> Result<String, EndpointError> {
    let mut texts = Vec::new();
    let mut corrupt = false;
    for part in parts {
        match part {
            ContentPart::InlineData { mime_type, data } if !data.trim().is_empty() => {
                if BASE64.decode(data.trim().as_bytes()).is_err() {
                    corrupt = true;
                    continue;
                }
                return Ok(to_data_uri(mime_type.as_deref(), data.trim()));
            }
            ContentPart::InlineData { .. } => {}
            ContentPart::Text(text) => {
                if !text.trim().is_empty() {
                    texts.push(text);
                }
            }
        }
    }
    if corrupt {
        return Err(EndpointError::new(
            FailureKind::NoImageData,
            "Image data was not valid base64.",
        ));
    }
    if texts.is_empty() {
        return Err(EndpointError::no_image_data());
    }
    Err(EndpointError::chatty_text(texts.concat()))
}
