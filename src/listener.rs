//! Downstream sink contract (spec §6) and a couple of reference
//! implementations, the equivalent of the original's
//! `MonitoringDataListener` / `StdOutPrintMon`.

use std::io::Write;
use std::sync::Mutex;

/// A registered sink that receives filtered sample batches. One batch may
/// be multiple lines; empty batches are never delivered by the
/// multiplexer, so implementations don't need to guard against them.
pub trait Listener: Send + Sync {
    fn monitoring_data(&self, batch: &str);
}

/// Writes every batch straight to stdout.
#[derive(Debug, Default)]
pub struct StdoutListener;

impl Listener for StdoutListener {
    fn monitoring_data(&self, batch: &str) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(batch.as_bytes());
        let _ = stdout.flush();
    }
}

/// Accumulates every batch it receives, for tests and programmatic
/// consumers that want the raw filtered stream in memory.
#[derive(Debug, Default)]
pub struct RecordingListener {
    batches: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        RecordingListener::default()
    }

    pub fn batches(&self) -> Vec<String> {
        self.batches.lock().unwrap().clone()
    }

    pub fn joined(&self) -> String {
        self.batches.lock().unwrap().concat()
    }
}

impl Listener for RecordingListener {
    fn monitoring_data(&self, batch: &str) {
        self.batches.lock().unwrap().push(batch.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_listener_accumulates_batches() {
        let listener = RecordingListener::new();
        listener.monitoring_data("a;b\n");
        listener.monitoring_data("c;d\n");
        assert_eq!(listener.joined(), "a;b\nc;d\n");
    }
}
