use std::path::{Path, PathBuf};
use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use leadflow_core::event::{redact, Event, EventBus, EventKind};

/// JSONL run logger.
///
/// Subscribes to the EventBus and appends one JSON object per event. Each
/// line is flushed as written, so a crashed run still leaves a readable log.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step_id: Option<&'a str>,
    event_type: &'static str,
    detail: serde_json::Value,
}

impl RunLogger {
    /// `level`: 1 = env and step boundaries, 2 = plus provider calls and
    /// resolution errors, 3 = everything.
    pub fn new(log_dir: impl Into<PathBuf>, level: u8) -> Self {
        Self {
            log_dir: log_dir.into(),
            level,
        }
    }

    /// Path of the log file for a workflow started now.
    pub fn log_path(&self, workflow: &str) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        self.log_dir.join(format!("{}_{}.jsonl", workflow, timestamp))
    }

    /// Subscribe now and write in a background task until `cancel` fires or
    /// the bus closes. Events already queued at cancellation are still written.
    pub fn spawn(self, bus: &EventBus, path: PathBuf, cancel: CancellationToken) -> JoinHandle<()> {
        let rx = bus.subscribe();
        tokio::spawn(self.run(rx, path, cancel))
    }

    async fn run(self, mut rx: Receiver<Event>, path: PathBuf, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(parent_or_cwd(&path)).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %path.display(), "Failed to open run log");
                return;
            }
        };
        info!(path = %path.display(), "RunLogger started");
        let mut writer = BufWriter::new(file);

        loop {
            tokio::select! {
                biased;
                result = rx.recv() => match result {
                    Ok(event) => {
                        if !self.write(&mut writer, &event).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => debug!(skipped = n, "RunLogger lagged, skipped events"),
                    Err(RecvError::Closed) => break,
                },
                _ = cancel.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(event) => {
                                if !self.write(&mut writer, &event).await {
                                    break;
                                }
                            }
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %path.display(), "RunLogger finished");
    }

    fn wants(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::EnvLoading | EventKind::StepStart | EventKind::StepEnd => true,
            EventKind::ApiCall | EventKind::ApiSuccess | EventKind::ApiError | EventKind::ResolutionError => {
                self.level >= 2
            }
            EventKind::Reasoning | EventKind::Intermediate => self.level >= 3,
        }
    }

    /// Returns false once the file can no longer be written.
    async fn write(&self, writer: &mut BufWriter<tokio::fs::File>, event: &Event) -> bool {
        if !self.wants(event.kind) {
            return true;
        }
        let entry = LogEntry {
            timestamp: event.timestamp.to_rfc3339(),
            step_id: event.step_id.as_deref(),
            event_type: event.kind.as_str(),
            detail: redact(&event.payload),
        };
        let Ok(json) = serde_json::to_string(&entry) else {
            return true;
        };
        if let Err(e) = writer.write_all(format!("{}\n", json).as_bytes()).await {
            error!(error = %e, "Failed to write log entry");
            return false;
        }
        if let Err(e) = writer.flush().await {
            error!(error = %e, "Failed to flush log");
        }
        true
    }
}

fn parent_or_cwd(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
