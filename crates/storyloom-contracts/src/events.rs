use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Structured diagnostics for a co-authoring session.
///
/// Every event is one compact JSON object:
/// - default fields are `type`, `session_id`, `ts`
/// - caller payload is merged last and can override defaults
///
/// Events go to an append-only `events.jsonl` file, an in-memory buffer, or
/// nowhere at all. Clones share the same sink.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    sink: EventSink,
    session_id: String,
    lock: Mutex<Vec<Value>>,
}

#[derive(Debug)]
enum EventSink {
    File(PathBuf),
    Memory,
    Disabled,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::with_sink(EventSink::File(path.into()), session_id.into())
    }

    pub fn in_memory(session_id: impl Into<String>) -> Self {
        Self::with_sink(EventSink::Memory, session_id.into())
    }

    pub fn disabled() -> Self {
        Self::with_sink(EventSink::Disabled, String::new())
    }

    fn with_sink(sink: EventSink, session_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                sink,
                session_id,
                lock: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.inner.sink {
            EventSink::File(path) => Some(path.as_path()),
            EventSink::Memory | EventSink::Disabled => None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }
        let event = Value::Object(event);

        let mut guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        match &self.inner.sink {
            EventSink::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let line = serde_json::to_string(&event)?;
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            EventSink::Memory => guard.push(event.clone()),
            EventSink::Disabled => {}
        }

        Ok(event)
    }

    /// Emits and swallows sink failures. Generation must not stop because the
    /// event log is unwritable.
    pub fn record(&self, event_type: &str, payload: EventPayload) {
        let _ = self.emit(event_type, payload);
    }

    /// Events captured by an in-memory writer, oldest first.
    pub fn recorded(&self) -> Vec<Value> {
        self.inner
            .lock
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn recorded_types(&self) -> Vec<String> {
        self.recorded()
            .iter()
            .filter_map(|event| event.get("type").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-7");

        let mut payload = EventPayload::new();
        payload.insert("count".to_string(), Value::from(3));
        let emitted = writer.emit("batch_started", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("batch_started".to_string()));
        assert_eq!(parsed["session_id"], Value::String("session-7".to_string()));
        assert_eq!(parsed["count"], Value::from(3));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let writer = EventWriter::in_memory("session-7");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::String("override".to_string()));
        let emitted = writer.emit("batch_started", payload)?;

        assert_eq!(emitted["type"], Value::String("override".to_string()));
        assert_eq!(emitted["session_id"], Value::String("session-7".to_string()));
        Ok(())
    }

    #[test]
    fn file_sink_appends_lines_and_creates_parent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-7");

        writer.emit("one", EventPayload::new())?;
        writer.emit("two", EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let types: Vec<String> = content
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(types, vec!["one", "two"]);
        assert!(writer.recorded().is_empty());
        Ok(())
    }

    #[test]
    fn memory_sink_is_shared_between_clones() {
        let writer = EventWriter::in_memory("session-7");
        let clone = writer.clone();
        clone.record("slot_succeeded", EventPayload::new());
        writer.record("batch_finished", EventPayload::new());

        assert_eq!(
            writer.recorded_types(),
            vec!["slot_succeeded", "batch_finished"]
        );
        assert!(writer.path().is_none());
    }

    #[test]
    fn disabled_sink_drops_events() -> anyhow::Result<()> {
        let writer = EventWriter::disabled();
        let emitted = writer.emit("batch_started", EventPayload::new())?;
        assert_eq!(emitted["type"], Value::String("batch_started".to_string()));
        assert!(writer.recorded().is_empty());
        Ok(())
    }
}
