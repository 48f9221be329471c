//! The logging sink every supervisor transition and child output line lands in.

mod json_lines;
mod memory;

pub use json_lines::JsonLinesSink;
pub use memory::MemorySink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Origin of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogSource {
    Supervisor,
    ChildStdout,
    ChildStderr,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogSource::Supervisor => "supervisor",
            LogSource::ChildStdout => "child-stdout",
            LogSource::ChildStderr => "child-stderr",
        })
    }
}

/// Immutable log entry handed to a [`LogSink`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
}

impl LogRecord {
    pub fn new(level: LogLevel, source: LogSource, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, LogSource::Supervisor, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, LogSource::Supervisor, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, LogSource::Supervisor, message)
    }
}

/// Receiver of structured log records.
///
/// `emit` is called from supervisor tasks and must not block.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: LogRecord);

    /// Whether records emitted now will reach their destination
    fn is_available(&self) -> bool {
        true
    }
}

/// Forwards records to `tracing` under the `procward::sink` target
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: LogRecord) {
        let source = record.source.to_string();
        match record.level {
            LogLevel::Info => {
                tracing::info!(target: "procward::sink", source = %source, "{}", record.message)
            }
            LogLevel::Warning => {
                tracing::warn!(target: "procward::sink", source = %source, "{}", record.message)
            }
            LogLevel::Error => {
                tracing::error!(target: "procward::sink", source = %source, "{}", record.message)
            }
        }
    }
}

/// Sends every record to each inner sink
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn LogSink>) {
        self.sinks.push(sink);
    }
}

impl LogSink for FanoutSink {
    fn emit(&self, record: LogRecord) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(record.clone());
            }
            last.emit(record);
        }
    }

    /// Available while at least one inner sink is
    fn is_available(&self) -> bool {
        self.sinks.iter().any(|sink| sink.is_available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization() {
        let record = LogRecord::new(LogLevel::Warning, LogSource::ChildStderr, "disk full");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["source"], "child-stderr");
        assert_eq!(json["message"], "disk full");

        let back: LogRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_supervisor_constructors() {
        let record = LogRecord::error("boom");
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.source, LogSource::Supervisor);
        assert_eq!(LogRecord::info("x").level, LogLevel::Info);
        assert_eq!(LogRecord::warning("x").level, LogLevel::Warning);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(MemorySink::new());
        let second = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![first.clone(), second.clone()]);

        fanout.emit(LogRecord::info("started"));

        assert_eq!(first.messages(), vec!["started".to_string()]);
        assert_eq!(second.messages(), vec!["started".to_string()]);
        assert!(fanout.is_available());
        assert!(!FanoutSink::default().is_available());
    }

    #[test]
    fn test_tracing_sink_is_available() {
        let sink = TracingSink;
        sink.emit(LogRecord::info("hello"));
        assert!(sink.is_available());
    }
}
