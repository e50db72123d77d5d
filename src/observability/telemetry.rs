//! Per-request access events and the sinks that receive them.
//!
//! # Responsibilities
//! - Define the access event emitted for every completed request
//! - Deliver events without ever failing or blocking the response
//!
//! # Design Decisions
//! - `record` is synchronous and infallible from the caller's side
//! - The file sink decouples disk I/O through a bounded channel and drops
//!   events when it is full

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Capacity of the file sink's queue.
const QUEUE_CAPACITY: usize = 1024;

/// How a request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Static,
    Php,
    Redirect,
    Error,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Php => "php",
            Self::Redirect => "redirect",
            Self::Error => "error",
        }
    }
}

/// One completed request.
#[derive(Debug, Clone, Serialize)]
pub struct AccessEvent {
    #[serde(serialize_with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub country_code: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub request_type: RequestType,
    pub virtual_host: String,
    pub user_agent: String,
    /// Milliseconds.
    pub response_time: f64,
    pub referer: String,
    pub protocol: String,
}

fn rfc3339<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Receiver of access events.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: AccessEvent);
}

/// Emits each event as a structured tracing record on target `access_log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, event: AccessEvent) {
        tracing::info!(
            target: "access_log",
            ip = %event.ip,
            country = %event.country_code,
            method = %event.method,
            path = %event.path,
            status = event.status_code,
            request_type = event.request_type.as_str(),
            virtual_host = %event.virtual_host,
            user_agent = %event.user_agent,
            referer = %event.referer,
            protocol = %event.protocol,
            response_time_ms = event.response_time,
            "request"
        );
    }
}

/// Appends events as JSON lines to a file from a background task.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    tx: mpsc::Sender<AccessEvent>,
}

impl JsonLinesSink {
    /// Spawn the writer task. Must be called inside the Tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(write_events(path, rx));
        Self { tx }
    }
}

impl TelemetrySink for JsonLinesSink {
    fn record(&self, event: AccessEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!(error = %e, "Access event dropped");
        }
    }
}

async fn write_events(path: PathBuf, mut rx: mpsc::Receiver<AccessEvent>) {
    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Cannot open access log, events will be discarded");
            while rx.recv().await.is_some() {}
            return;
        }
    };

    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize access event");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = file.write_all(&line).await {
            tracing::warn!(path = ?path, error = %e, "Failed to write access event");
            continue;
        }
        if rx.is_empty() {
            let _ = file.flush().await;
        }
    }
    let _ = file.flush().await;
}

/// Fan an event out to several sinks.
pub struct FanoutSink {
    sinks: Vec<Box<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for FanoutSink {
    fn record(&self, event: AccessEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event() -> AccessEvent {
        AccessEvent {
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T12:00:00.250Z")
                .unwrap()
                .with_timezone(&Utc),
            ip: "203.0.113.9".into(),
            country_code: "XX".into(),
            method: "GET".into(),
            path: "/index.php".into(),
            status_code: 200,
            request_type: RequestType::Php,
            virtual_host: "app.local".into(),
            user_agent: "curl/8".into(),
            response_time: 12.5,
            referer: "".into(),
            protocol: "HTTP/1.1".into(),
        }
    }

    #[test]
    fn event_serializes_with_interface_field_names() {
        let value = serde_json::to_value(event()).unwrap();
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00.250Z");
        assert_eq!(value["request_type"], "php");
        assert_eq!(value["status_code"], 200);
        assert_eq!(value["response_time"], 12.5);
        for field in [
            "ip", "country_code", "method", "path", "virtual_host", "user_agent", "referer", "protocol",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }

    #[tokio::test]
    async fn json_lines_sink_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("access.jsonl");
        let sink = JsonLinesSink::spawn(&path);

        sink.record(event());
        sink.record(event());

        let mut lines = 0;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            lines = content.lines().count();
            if lines == 2 {
                break;
            }
        }
        assert_eq!(lines, 2);
    }
}
