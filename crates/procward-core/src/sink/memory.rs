use super::{LogLevel, LogRecord, LogSink, LogSource};
use std::sync::Mutex;

/// Keeps every record in memory, in emission order
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|r| r.message.clone()).collect()
    }

    /// Records matching both level and source
    pub fn filter(&self, level: LogLevel, source: LogSource) -> Vec<LogRecord> {
        self.lock()
            .iter()
            .filter(|r| r.level == level && r.source == source)
            .cloned()
            .collect()
    }

    pub fn count(&self, level: LogLevel, source: LogSource) -> usize {
        self.filter(level, source).len()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|r| r.message.contains(needle))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        // A panic while holding the lock cannot leave the Vec half-written
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: LogRecord) {
        self.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_and_count() {
        let sink = MemorySink::new();
        sink.emit(LogRecord::info("stopping"));
        sink.emit(LogRecord::new(LogLevel::Info, LogSource::ChildStdout, "ready"));
        sink.emit(LogRecord::info("stopped"));

        assert_eq!(sink.count(LogLevel::Info, LogSource::Supervisor), 2);
        assert_eq!(sink.count(LogLevel::Info, LogSource::ChildStdout), 1);
        assert!(sink.contains("ready"));

        sink.clear();
        assert!(sink.records().is_empty());
    }
}
