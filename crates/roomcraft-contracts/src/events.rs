use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only writer for a studio `events.jsonl` log.
///
/// - default fields are `type`, `session_id`, `seq`, `ts`
/// - `seq` increases by one per emitted event, starting at 1
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
///
/// A disabled writer still builds and returns the event but touches no file.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: Option<PathBuf>,
    session_id: String,
    seq: AtomicU64,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::build(Some(path.into()), session_id.into())
    }

    pub fn disabled(session_id: impl Into<String>) -> Self {
        Self::build(None, session_id.into())
    }

    fn build(path: Option<PathBuf>, session_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path,
                session_id,
                seq: AtomicU64::new(0),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emitted(&self) -> u64 {
        self.inner.seq.load(Ordering::SeqCst)
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("seq".to_string(), Value::from(seq));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let Some(path) = self.inner.path.as_ref() else {
            return Ok(Value::Object(event));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
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
        let writer = EventWriter::new(&path, "studio-1");

        let mut payload = EventPayload::new();
        payload.insert("style".to_string(), Value::String("Modern".to_string()));
        let emitted = writer.emit("style_selected", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("style_selected".to_string()));
        assert_eq!(parsed["session_id"], Value::String("studio-1".to_string()));
        assert_eq!(parsed["seq"], Value::from(1));
        assert_eq!(parsed["style"], Value::String("Modern".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn sequence_numbers_follow_emit_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "studio-1");

        writer.emit("one", EventPayload::new())?;
        writer.clone().emit("two", EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let rows: Vec<Value> = content
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["type"], "one");
        assert_eq!(rows[0]["seq"], 1);
        assert_eq!(rows[1]["type"], "two");
        assert_eq!(rows[1]["seq"], 2);
        assert_eq!(writer.emitted(), 2);
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let writer = EventWriter::disabled("studio-1");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::String("override".to_string()));
        let emitted = writer.emit("status_changed", payload)?;

        assert_eq!(emitted["type"], Value::String("override".to_string()));
        assert_eq!(emitted["session_id"], Value::String("studio-1".to_string()));
        Ok(())
    }

    #[test]
    fn disabled_writer_has_no_path() -> anyhow::Result<()> {
        let writer = EventWriter::disabled("studio-1");
        writer.emit("error_changed", EventPayload::new())?;
        assert!(writer.path().is_none());
        assert_eq!(writer.emitted(), 1);
        Ok(())
    }
}
