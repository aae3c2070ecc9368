use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Succeeded,
    Abandoned,
    /// Never attempted because the batch was cancelled first.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotReport {
    pub slot: u32,
    pub status: SlotStatus,
    pub attempts: u32,
    pub failure_kind: Option<String>,
    pub message: Option<String>,
    pub artifact: Option<String>,
}

impl SlotReport {
    pub fn skipped(slot: u32) -> Self {
        Self {
            slot,
            status: SlotStatus::Skipped,
            attempts: 0,
            failure_kind: None,
            message: None,
            artifact: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub model: String,
    pub style: String,
    pub requested: u32,
    pub produced: u32,
    pub cancelled: bool,
    pub slots: Vec<SlotReport>,
}

impl BatchSummary {
    pub fn abandoned(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.status == SlotStatus::Abandoned)
            .count()
    }
}

pub fn write_summary(
    path: &Path,
    summary: &BatchSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(summary)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}

pub fn new_session_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("session-{}", &id[..12])
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
