//! Component E: owns many running agents' stdout/stderr, drains them
//! without blocking, applies each host's filter mask and fans batches out
//! to registered listeners.
//!
//! The source polls with a zero-timeout `select()`; this crate uses the
//! task-per-stream alternative spec §9 explicitly sanctions: one reader
//! thread per tracked stream feeds a single bounded channel, and `poll()`
//! drains whatever is already queued without blocking. Ordering within one
//! host's stdout is preserved because a single thread reads it line by
//! line in order; the channel doesn't reorder what it's given.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::process::Child;
use std::thread;

use crate::compiler::WantedColumns;
use crate::listener::Listener;

enum StreamKind {
    Stdout,
    Stderr,
}

struct StreamEvent {
    host: String,
    kind: StreamKind,
    /// `Some(line)` for a line of output, `None` for end-of-stream.
    line: Option<String>,
}

struct TrackedAgent {
    child: Child,
    /// Starts at 2 (stdout + stderr); reaped once both sides hit EOF.
    open_streams: u8,
}

/// Owns the running agents and the filter state derived from their
/// announcement lines.
pub struct Multiplexer {
    wanted: WantedColumns,
    filter_mask: HashMap<String, Vec<usize>>,
    listeners: Vec<Box<dyn Listener>>,

    streams: HashMap<String, TrackedAgent>,
    tx: flume::Sender<StreamEvent>,
    rx: flume::Receiver<StreamEvent>,

    output_buffer: String,
    first_data_received: bool,
}

impl Multiplexer {
    pub fn new(wanted: WantedColumns) -> Self {
        let (tx, rx) = flume::unbounded();
        Multiplexer {
            wanted,
            filter_mask: HashMap::new(),
            listeners: Vec::new(),
            streams: HashMap::new(),
            tx,
            rx,
            output_buffer: String::new(),
            first_data_received: false,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    /// Adopt a newly-started agent process, spawning one reader thread per
    /// stdio stream. From this point the Multiplexer owns `child`
    /// exclusively until it's reaped.
    pub fn register(&mut self, host: impl Into<String>, mut child: Child) {
        let host = host.into();

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(host.clone(), StreamKind::Stdout, stdout, self.tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(host.clone(), StreamKind::Stderr, stderr, self.tx.clone());
        }

        self.streams.insert(host, TrackedAgent { child, open_streams: 2 });
    }

    /// Send SIGINT to every still-tracked agent's process group. A no-op if
    /// every agent has already exited and been reaped.
    #[cfg(unix)]
    pub fn signal_all_sigint(&self) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        for (host, agent) in &self.streams {
            let pid = Pid::from_raw(agent.child.id() as i32);
            match killpg(pid, Signal::SIGINT) {
                Ok(()) => log::debug!("[{host}] sent SIGINT to process group {pid}"),
                Err(e) => log::warn!("[{host}] failed to signal process group {pid}: {e}"),
            }
        }
    }

    /// `nix`'s process-group signaling is POSIX-only; this crate doesn't
    /// support non-unix targets (`nix` itself is an unconditional
    /// dependency), but this stub keeps the call site in `stop()`
    /// unconditional rather than `#[cfg]`-gated, matching
    /// `transport::own_process_group`'s stub.
    #[cfg(not(unix))]
    pub fn signal_all_sigint(&self) {}

    pub fn tracked_count(&self) -> usize {
        self.streams.len()
    }

    /// Drain everything currently queued, reap exited children, and
    /// deliver a batch to listeners if one is due. Never blocks. Returns
    /// the number of agents still tracked.
    pub fn poll(&mut self) -> usize {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event);
        }

        self.reap_exited();
        self.maybe_deliver();

        self.streams.len()
    }

    fn handle_event(&mut self, event: StreamEvent) {
        match event.line {
            Some(line) => match event.kind {
                StreamKind::Stdout => {
                    if !line.is_empty() {
                        self.handle_stdout_line(&event.host, &line);
                    }
                }
                StreamKind::Stderr => {
                    if !line.is_empty() {
                        log::error!("[{}] {}", event.host, line);
                    }
                }
            },
            None => {
                if let Some(agent) = self.streams.get_mut(&event.host) {
                    agent.open_streams = agent.open_streams.saturating_sub(1);
                }
            }
        }
    }

    fn reap_exited(&mut self) {
        let ready: Vec<String> = self
            .streams
            .iter()
            .filter(|(_, a)| a.open_streams == 0)
            .map(|(host, _)| host.clone())
            .collect();

        for host in ready {
            if let Some(mut agent) = self.streams.remove(&host) {
                match agent.child.wait() {
                    Ok(status) => log::info!("[{host}] agent exited with {:?}", status.code()),
                    Err(e) => log::warn!("[{host}] failed to reap agent: {e}"),
                }
            }
        }
    }

    fn maybe_deliver(&mut self) {
        if self.output_buffer.is_empty() {
            return;
        }

        if !self.first_data_received {
            self.first_data_received = true;
            log::info!("monitoring received first data");
            return;
        }

        for listener in &self.listeners {
            listener.monitoring_data(&self.output_buffer);
        }
        self.output_buffer.clear();
    }

    fn handle_stdout_line(&mut self, host: &str, line: &str) {
        if let Some(rest) = line.strip_prefix("start;") {
            self.handle_announcement(host, rest);
        } else if line.starts_with("[debug]") {
            log::debug!("[{host}] agent debug: {line}");
        } else {
            self.handle_sample(host, line);
        }
    }

    /// `rest` is everything after the `start;` prefix: `<host>;<ts>;<label>;...`
    fn handle_announcement(&mut self, host: &str, rest: &str) {
        let record: Vec<&str> = rest.split(';').collect();
        // record is [host, ts, label_1, ...]; the raw line (with "start" at
        // index 0) has label_1 at index 3, i.e. at `offset + 1` here, so
        // the mask value the spec wants (raw index - 1) is just `offset`.
        let wanted = self.wanted.get(host).cloned().unwrap_or_default();
        let mut mask = Vec::new();
        for (offset, label) in record.iter().enumerate().skip(2) {
            if wanted.iter().any(|w| w == label) {
                mask.push(offset);
            }
        }
        self.filter_mask.insert(host.to_string(), mask.clone());

        match project(&mask, &record) {
            Some(projection) => {
                self.output_buffer.push_str("start;");
                self.output_buffer.push_str(&projection);
                self.output_buffer.push('\n');
            }
            None => log::warn!("[{host}] could not project announcement through filter mask"),
        }
    }

    fn handle_sample(&mut self, host: &str, line: &str) {
        let mask = match self.filter_mask.get(host) {
            Some(m) => m.clone(),
            None => return, // no announcement observed yet for this host
        };
        let record: Vec<&str> = line.split(';').collect();
        match project(&mask, &record) {
            Some(projection) => {
                self.output_buffer.push_str(&projection);
                self.output_buffer.push('\n');
            }
            None => log::warn!(
                "[{host}] dropping sample: filter mask index exceeds record length ({})",
                record.len()
            ),
        }
    }
}

/// Project `record` through `mask`, always prefixed with the implicit
/// `[0, 1]` (timestamp/host) columns. Returns `None`, logging nothing
/// itself, if any index is out of bounds.
fn project(mask: &[usize], record: &[&str]) -> Option<String> {
    let mut fields = Vec::with_capacity(mask.len() + 2);
    for idx in [0, 1].into_iter().chain(mask.iter().copied()) {
        fields.push(*record.get(idx)?);
    }
    Some(fields.join(";"))
}

fn spawn_reader(
    host: String,
    kind: StreamKind,
    stream: impl std::io::Read + Send + 'static,
    tx: flume::Sender<StreamEvent>,
) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    let _ = tx.send(StreamEvent { host: host.clone(), kind: kind_clone(&kind), line: None });
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx
                        .send(StreamEvent { host: host.clone(), kind: kind_clone(&kind), line: Some(trimmed) })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(_) => {
                    let _ = tx.send(StreamEvent { host: host.clone(), kind: kind_clone(&kind), line: None });
                    break;
                }
            }
        }
    });
}

fn kind_clone(kind: &StreamKind) -> StreamKind {
    match kind {
        StreamKind::Stdout => StreamKind::Stdout,
        StreamKind::Stderr => StreamKind::Stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wanted(pairs: &[(&str, &[&str])]) -> WantedColumns {
        pairs
            .iter()
            .map(|(h, labels)| (h.to_string(), labels.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    /// S4 — filter projection.
    #[test]
    fn announcement_builds_mask_and_projects() {
        let mut mux = Multiplexer::new(wanted(&[("h1", &["CPU_user", "CPU_system"])]));
        mux.handle_stdout_line("h1", "start;h1;1000;CPU_idle;CPU_user;CPU_system");
        assert_eq!(mux.filter_mask["h1"], vec![3, 4]);
        assert_eq!(mux.output_buffer, "start;h1;1000;CPU_user;CPU_system\n");

        mux.output_buffer.clear();
        mux.handle_stdout_line("h1", "1001;h1;50;30;20");
        assert_eq!(mux.output_buffer, "1001;h1;30;20\n");
    }

    /// S6 — debug passthrough.
    #[test]
    fn debug_lines_produce_no_output_and_no_mask_change() {
        let mut mux = Multiplexer::new(wanted(&[("h1", &["CPU_user"])]));
        mux.handle_stdout_line("h1", "[debug] hello");
        assert!(mux.output_buffer.is_empty());
        assert!(!mux.filter_mask.contains_key("h1"));
    }

    #[test]
    fn sample_before_announcement_is_dropped_silently() {
        let mut mux = Multiplexer::new(wanted(&[("h1", &["CPU_user"])]));
        mux.handle_stdout_line("h1", "1001;h1;50");
        assert!(mux.output_buffer.is_empty());
    }

    #[test]
    fn out_of_range_mask_index_drops_line() {
        let mut mux = Multiplexer::new(wanted(&[("h1", &["CPU_user"])]));
        mux.filter_mask.insert("h1".to_string(), vec![5]);
        mux.handle_sample("h1", "1001;h1;50");
        assert!(mux.output_buffer.is_empty());
    }

    #[test]
    fn first_batch_is_suppressed_then_delivered() {
        use crate::listener::RecordingListener;
        use std::sync::Arc;

        struct ArcListener(Arc<RecordingListener>);
        impl Listener for ArcListener {
            fn monitoring_data(&self, batch: &str) {
                self.0.monitoring_data(batch);
            }
        }

        let recorder = Arc::new(RecordingListener::new());
        let mut mux = Multiplexer::new(wanted(&[("h1", &["CPU_user"])]));
        mux.add_listener(Box::new(ArcListener(recorder.clone())));

        mux.handle_stdout_line("h1", "start;h1;1000;CPU_idle;CPU_user");
        mux.maybe_deliver();
        assert!(recorder.batches().is_empty());
        assert!(mux.first_data_received);

        mux.handle_stdout_line("h1", "1001;h1;50;30");
        mux.maybe_deliver();
        assert_eq!(recorder.batches(), vec!["start;h1;1000;CPU_user\n1001;h1;30\n"]);
    }
}
