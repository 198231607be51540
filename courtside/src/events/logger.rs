//! Trace Logger - persists run events to JSONL files
//!
//! The TraceLogger subscribes to the EventBus and writes every event to
//! `{dir}/trace_{run_id}.jsonl`, one `TraceEntry` per line.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{PipelineEvent, TraceEntry};

/// Path of the trace file for one run
pub fn trace_path(dir: impl AsRef<Path>, run_id: &str) -> PathBuf {
    dir.as_ref().join(format!("trace_{}.jsonl", run_id))
}

/// Trace logger that writes events to JSONL files
pub struct TraceLogger {
    dir: PathBuf,
    /// Open file writers per run
    writers: HashMap<String, BufWriter<File>>,
}

impl TraceLogger {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        debug!(?dir, "TraceLogger::new: creating logger");
        Self {
            dir,
            writers: HashMap::new(),
        }
    }

    /// Write an event to its run's trace file
    pub fn write_event(&mut self, event: &PipelineEvent) -> eyre::Result<()> {
        let run_id = event.run_id().to_string();
        debug!(%run_id, event_type = event.event_type(), "TraceLogger::write_event");

        if !self.writers.contains_key(&run_id) {
            fs::create_dir_all(&self.dir)?;
            let path = trace_path(&self.dir, &run_id);
            debug!(?path, "TraceLogger: creating new trace file");
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.writers.insert(run_id.clone(), BufWriter::new(file));
        }
        let writer = self
            .writers
            .get_mut(&run_id)
            .ok_or_else(|| eyre::eyre!("No trace writer for run {}", run_id))?;

        let entry = TraceEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Close the writer for a finished run
    pub fn close_run(&mut self, run_id: &str) {
        debug!(%run_id, "TraceLogger::close_run");
        if let Some(mut writer) = self.writers.remove(run_id) {
            let _ = writer.flush();
        }
    }

    /// Consume events until the channel closes
    ///
    /// With `stop_on_completion` the logger also returns after the first
    /// `RunCompleted`, which is how the CLI drains a single run.
    pub async fn run(mut self, mut rx: broadcast::Receiver<PipelineEvent>, stop_on_completion: bool) {
        debug!(stop_on_completion, "TraceLogger::run: starting trace logger");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let run_id = event.run_id().to_string();
                    let completed = matches!(event, PipelineEvent::RunCompleted { .. });

                    if let Err(e) = self.write_event(&event) {
                        error!(%run_id, error = %e, "TraceLogger: failed to write event");
                    }

                    if completed {
                        self.close_run(&run_id);
                        if stop_on_completion {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "TraceLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("TraceLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (run_id, mut writer) in self.writers.drain() {
            debug!(%run_id, "TraceLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read the entries of one run's trace file
pub fn read_trace(dir: impl AsRef<Path>, run_id: &str) -> eyre::Result<Vec<TraceEntry>> {
    let path = trace_path(dir, run_id);
    debug!(?path, "read_trace: reading trace file");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TraceEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "read_trace: failed to parse line"),
        }
    }

    debug!(count = entries.len(), "read_trace: loaded entries");
    Ok(entries)
}

/// Spawn a trace logger as a background task
///
/// Subscribes before spawning so no event emitted after this call is missed.
pub fn spawn_trace_logger(
    event_bus: &EventBus,
    dir: impl AsRef<Path>,
    stop_on_completion: bool,
) -> tokio::task::JoinHandle<()> {
    let rx = event_bus.subscribe();
    let logger = TraceLogger::new(dir);
    tokio::spawn(async move {
        logger.run(rx, stop_on_completion).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cache_hit(run_id: &str, task: &str) -> PipelineEvent {
        PipelineEvent::CacheHit {
            run_id: run_id.to_string(),
            task: task.to_string(),
        }
    }

    #[test]
    fn test_write_event_creates_trace_file() {
        let temp = tempdir().unwrap();
        let mut logger = TraceLogger::new(temp.path().join("logs"));

        logger.write_event(&cache_hit("run-123", "odds")).unwrap();

        let path = temp.path().join("logs").join("trace_run-123.jsonl");
        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("CacheHit"));
        assert!(content.contains("\"task\":\"odds\""));
    }

    #[test]
    fn test_multiple_runs_get_separate_files() {
        let temp = tempdir().unwrap();
        let mut logger = TraceLogger::new(temp.path());

        logger.write_event(&cache_hit("run-1", "a")).unwrap();
        logger.write_event(&cache_hit("run-2", "b")).unwrap();
        logger.write_event(&cache_hit("run-1", "c")).unwrap();

        assert_eq!(read_trace(temp.path(), "run-1").unwrap().len(), 2);
        assert_eq!(read_trace(temp.path(), "run-2").unwrap().len(), 1);
    }

    #[test]
    fn test_read_missing_trace() {
        let temp = tempdir().unwrap();
        assert!(read_trace(temp.path(), "nope").unwrap().is_empty());
    }

    #[test]
    fn test_close_run() {
        let temp = tempdir().unwrap();
        let mut logger = TraceLogger::new(temp.path());
        logger.write_event(&cache_hit("run-close", "a")).unwrap();
        assert!(logger.writers.contains_key("run-close"));
        logger.close_run("run-close");
        assert!(!logger.writers.contains_key("run-close"));
    }

    #[tokio::test]
    async fn test_spawned_logger_stops_on_completion() {
        let temp = tempdir().unwrap();
        let bus = EventBus::new(100);
        let handle = spawn_trace_logger(&bus, temp.path(), true);

        let emitter = bus.emitter_for("run-9");
        emitter.run_started("writer", "BOS", "NYK", "2025-01-15");
        emitter.for_task("odds").task_started("composite");
        emitter.run_completed(true, 42);

        handle.await.unwrap();

        let entries = read_trace(temp.path(), "run-9").unwrap();
        let types: Vec<_> = entries.iter().map(|e| e.event.event_type()).collect();
        assert_eq!(types, vec!["RunStarted", "TaskStarted", "RunCompleted"]);
        assert_eq!(entries[1].task.as_deref(), Some("odds"));
    }
}
