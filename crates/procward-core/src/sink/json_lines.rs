use super::{LogRecord, LogSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Appends one JSON object per record to a file.
///
/// Records are queued on an unbounded channel and written by a background
/// task, so `emit` never waits on disk I/O. The sink reports itself
/// unavailable once a write fails or the writer has been shut down.
pub struct JsonLinesSink {
    path: PathBuf,
    sender: Mutex<Option<mpsc::UnboundedSender<LogRecord>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    available: Arc<AtomicBool>,
}

impl JsonLinesSink {
    /// Open (or create) `path` for appending and start the writer task
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<LogRecord>();
        let available = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn({
            let available = available.clone();
            let path = path.clone();
            async move {
                while let Some(record) = rx.recv().await {
                    let mut line = match serde_json::to_vec(&record) {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping unserializable log record");
                            continue;
                        }
                    };
                    line.push(b'\n');

                    let mut written = file.write_all(&line).await;
                    if written.is_ok() {
                        written = file.flush().await;
                    }

                    if let Err(e) = written {
                        tracing::error!(path = %path.display(), error = %e, "Log file write failed");
                        available.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            path,
            sender: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            available,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting records and wait until queued ones are on disk
    pub async fn shutdown(&self) {
        self.available.store(false, Ordering::SeqCst);
        drop(self.sender.lock().ok().and_then(|mut s| s.take()));

        let writer = self.writer.lock().ok().and_then(|mut w| w.take());
        if let Some(writer) = writer {
            let _ = writer.await;
        }
    }
}

impl LogSink for JsonLinesSink {
    fn emit(&self, record: LogRecord) {
        let Ok(sender) = self.sender.lock() else {
            return;
        };
        let delivered = sender
            .as_ref()
            .map(|tx| tx.send(record).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.available.store(false, Ordering::SeqCst);
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
