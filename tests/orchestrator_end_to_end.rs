//! End-to-end exercise of the Orchestrator against `FakeTransport`, with a
//! tiny shell script standing in for the remote agent. No network or SSH
//! involved; `FakeTransport` runs everything as local subprocesses and
//! treats `host:path` endpoints as plain local paths.

use std::io::Write;
use std::time::{Duration, Instant};

use tele_collector::dom::{Element, LogLevel};
use tele_collector::listener::{Listener, RecordingListener};
use tele_collector::transport::FakeTransport;
use tele_collector::Orchestrator;

/// Writes a local payload directory named `agent/` containing `agent.py`:
/// a Python script standing in for the remote agent. Install's recursive
/// copy lands this directory, as-is, under the probed remote temp dir —
/// so the launch command's `<remote>/agent/agent.py` only resolves if the
/// payload directory handed to the Agent Client is itself named `agent`,
/// matching the original's `AGENT_LOCAL_FOLDER` convention. Returns that
/// `agent/` path, which is what gets passed to the Orchestrator.
fn write_payload(root: &std::path::Path) -> std::path::PathBuf {
    let agent_dir = root.join("agent");
    std::fs::create_dir_all(&agent_dir).unwrap();
    let script_path = agent_dir.join("agent.py");
    let mut f = std::fs::File::create(&script_path).unwrap();
    writeln!(
        f,
        "print('start;h1;1000;CPU_idle;CPU_user;CPU_system')\n\
         print('1001;h1;50;30;20')\n\
         print('[debug] tick')\n"
    )
    .unwrap();
    agent_dir
}

struct ArcListener(std::sync::Arc<RecordingListener>);
impl Listener for ArcListener {
    fn monitoring_data(&self, batch: &str) {
        self.0.monitoring_data(batch);
    }
}

#[test]
fn single_host_run_filters_and_delivers_samples() {
    let root = tempfile::tempdir().unwrap();
    let payload_dir = write_payload(root.path());

    let hosts = vec![Element::new("Host")
        .with_attr("address", "h1")
        .with_attr("python", "python3")
        .with_child(Element::new("CPU").with_attr("measure", "user,system"))];

    let recorder = std::sync::Arc::new(RecordingListener::new());
    let mut orchestrator =
        Orchestrator::new(payload_dir.clone(), LogLevel::Info, |_host, _port| FakeTransport::new());
    orchestrator.add_listener(Box::new(ArcListener(recorder.clone())));

    orchestrator.prepare(&hosts, None).expect("prepare");
    assert_eq!(orchestrator.artifacts().len(), 1);

    orchestrator.start().expect("start");

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline && !recorder.joined().contains("1001;h1") {
        orchestrator.poll();
        std::thread::sleep(Duration::from_millis(20));
    }

    let batches = recorder.joined();
    assert!(batches.contains("start;h1;1000;CPU_user;CPU_system"), "{batches}");
    assert!(batches.contains("1001;h1;30;20"), "{batches}");
    assert!(!batches.contains("debug"), "{batches}");

    orchestrator.stop().expect("stop");
    assert_eq!(orchestrator.artifacts().len(), 2);
}

#[test]
fn missing_target_hint_fails_prepare_before_any_agent_starts() {
    let root = tempfile::tempdir().unwrap();
    let payload_dir = write_payload(root.path());

    let hosts = vec![Element::new("Host").with_attr("address", "[target]")];
    let mut orchestrator =
        Orchestrator::new(payload_dir.clone(), LogLevel::Info, |_host, _port| FakeTransport::new());

    let err = orchestrator.prepare(&hosts, None).unwrap_err();
    assert!(matches!(err, tele_collector::CollectorError::Configuration(_)));
    assert!(orchestrator.artifacts().is_empty());
}
