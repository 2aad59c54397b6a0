use std::path::PathBuf;

use mission_types::{LogEntry, LogLevel};
use serde_json::json;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Append-only, session-scoped recorder: a plain-text log sink plus a
/// structured-events JSON-array sink. One mutex per sink (§2, §6.6); files
/// are opened lazily on first write.
///
/// `module_name` distinguishes the log file per process (`pld`, `planner`,
/// `drone`); a new [`Recorder::start_new_session`] call rotates both sinks
/// to a fresh session id, mirroring one PLD Off-state entry.
pub struct Recorder {
    module_name: String,
    base_dir: PathBuf,
    session_id: Mutex<Option<String>>,
    log_sink: Mutex<Option<File>>,
    json_sink: Mutex<Option<File>>,
}

impl Recorder {
    pub fn new(module_name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            module_name: module_name.into(),
            base_dir: base_dir.into(),
            session_id: Mutex::new(None),
            log_sink: Mutex::new(None),
            json_sink: Mutex::new(None),
        }
    }

    /// Boot-timestamp session id, `%Y%m%d_%H%M%S_<microseconds>` (§3).
    pub async fn start_new_session(&self) -> String {
        let now = chrono::Local::now();
        let id = format!("{}_{:06}", now.format("%Y%m%d_%H%M%S"), now.timestamp_subsec_micros());

        // Closing the previous session's json sink, if any, leaves a
        // well-formed array on disk before we rotate to a fresh one.
        self.close_json_sink().await;
        *self.json_sink.lock().await = None;
        *self.log_sink.lock().await = None;
        *self.session_id.lock().await = Some(id.clone());
        id
    }

    pub async fn write_state_transition(&self, from: &str, to: &str) {
        self.write_log(LogLevel::Info, &format!("state transition: {from} -> {to}"))
            .await;
        self.write_event("STATE_TRANSITION", json!({ "from": from, "to": to }))
            .await;
    }

    pub async fn write_message_received(&self, peer: &str, tag: &str, detail: &str) {
        self.write_log(LogLevel::Info, &format!("{peer} -> {tag}: {detail}"))
            .await;
        self.write_event("MESSAGE_RECEIVED", json!({ "peer": peer, "tag": tag, "detail": detail }))
            .await;
    }

    pub async fn write_raw_message(&self, peer: &str, raw: &str) {
        self.write_event("RAW_MESSAGE", json!({ "peer": peer, "raw": raw }))
            .await;
    }

    pub async fn write_error(&self, message: &str) {
        self.write_log(LogLevel::Error, message).await;
        self.write_event("ERROR", json!({ "message": message })).await;
    }

    /// Free-form structured event, matching the original recorder event
    /// names used by the drone engine (`TAKEOFF`, `MISSION_START`, ...).
    pub async fn write_event(&self, event_type: &str, data: serde_json::Value) {
        let entry = json!({
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "event_type": event_type,
            "data": data,
        });
        let line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("recorder: failed to serialize event {event_type}: {e}");
                return;
            }
        };

        let mut guard = self.json_sink.lock().await;
        if guard.is_none() {
            *guard = self.open_json_sink().await;
        }
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(format!("{line},\n").as_bytes()).await {
                warn!("recorder: write to json sink failed: {e}");
                return;
            }
            let _ = file.flush().await;
        }
    }

    pub async fn write_log(&self, level: LogLevel, message: &str) {
        let entry = LogEntry {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            level,
            message: message.to_string(),
        };
        self.write_log_entry(&entry).await;
    }

    async fn write_log_entry(&self, entry: &LogEntry) {
        let local = chrono::DateTime::from_timestamp_millis(entry.timestamp_ms)
            .unwrap_or_else(chrono::Utc::now)
            .with_timezone(&chrono::Local);
        let line = format!("{}  [{}]  {}\n", local.format("%d/%m/%YT%H:%M:%S"), entry.level, entry.message);

        let mut guard = self.log_sink.lock().await;
        if guard.is_none() {
            *guard = self.open_log_sink().await;
        }
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()).await {
                warn!("recorder: write to log sink failed: {e}");
                return;
            }
            let _ = file.flush().await;
        }
    }

    /// Flush and close every open sink, writing the JSON array's closing
    /// bytes. Called from the process-wide shutdown callback (§3).
    pub async fn flush(&self) {
        self.close_json_sink().await;
        if let Some(file) = self.log_sink.lock().await.as_mut() {
            let _ = file.flush().await;
        }
    }

    async fn open_log_sink(&self) -> Option<File> {
        if let Err(e) = fs::create_dir_all(&self.base_dir).await {
            warn!("recorder: cannot create log directory: {e}");
            return None;
        }
        let now = chrono::Local::now();
        let path = self
            .base_dir
            .join(format!("{}{}.log", self.module_name, now.format("%Y%j_%H%M")));
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| warn!("recorder: cannot open log sink {}: {e}", path.display()))
            .ok()
    }

    async fn open_json_sink(&self) -> Option<File> {
        if let Err(e) = fs::create_dir_all(&self.base_dir).await {
            warn!("recorder: cannot create recorder directory: {e}");
            return None;
        }
        let session = self
            .session_id
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| "unsessioned".to_string());
        let path = self.base_dir.join(format!("{}_{session}.json", self.module_name));
        let mut file = match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                warn!("recorder: cannot open json sink {}: {e}", path.display());
                return None;
            }
        };
        if let Err(e) = file.write_all(b"[\n").await {
            warn!("recorder: cannot write json sink header: {e}");
            return None;
        }
        Some(file)
    }

    async fn close_json_sink(&self) {
        let mut guard = self.json_sink.lock().await;
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(b"{}\n]\n").await {
                warn!("recorder: failed to close json sink: {e}");
            }
            let _ = file.flush().await;
        }
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_sink_is_a_well_formed_array_after_flush() {
        let dir = std::env::temp_dir().join(format!("recorder-test-{}", std::process::id()));
        let recorder = Recorder::new("testmod", dir.clone());
        recorder.start_new_session().await;
        recorder.write_event("UNIT_TEST", json!({"n": 1})).await;
        recorder.write_event("UNIT_TEST", json!({"n": 2})).await;
        recorder.flush().await;

        let entries = fs::read_dir(&dir).await.unwrap();
        let mut entries = entries;
        let mut found_json = false;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().into_string().unwrap();
            if name.ends_with(".json") {
                found_json = true;
                let contents = fs::read_to_string(entry.path()).await.unwrap();
                assert!(contents.starts_with("[\n"));
                assert!(contents.ends_with("{}\n]\n"));
                assert!(contents.contains("UNIT_TEST"));
            }
        }
        assert!(found_json);
        let _ = fs::remove_dir_all(&dir).await;
    }
}
