//! Component F: composes Compiler → Agent Client → Multiplexer into the
//! collector's full lifecycle.
//!
//! Grounded on `MonCollector/collector.py`'s `MonitoringCollector`
//! top-level methods (`prepare`, `start`, `poll`, `stop`).

use std::path::PathBuf;

use crate::agent::AgentClient;
use crate::compiler::{self, WantedColumns};
use crate::dom::{Element, LogLevel};
use crate::error::Result;
use crate::listener::Listener;
use crate::multiplex::Multiplexer;
use crate::transport::Transport;

/// One collector run. `F` builds a `Transport` per `AgentSpec`; pass a
/// closure rather than a single instance so each host gets its own
/// `(host, port)` binding.
pub struct Orchestrator<T: Transport, F: Fn(&str, u16) -> T> {
    payload_dir: PathBuf,
    loglevel: LogLevel,
    make_transport: F,
    clients: Vec<AgentClient<T>>,
    multiplexer: Multiplexer,
    artifacts: Vec<PathBuf>,
}

impl<T: Transport, F: Fn(&str, u16) -> T> Orchestrator<T, F> {
    pub fn new(payload_dir: impl Into<PathBuf>, loglevel: LogLevel, make_transport: F) -> Self {
        Orchestrator {
            payload_dir: payload_dir.into(),
            loglevel,
            make_transport,
            clients: Vec::new(),
            multiplexer: Multiplexer::new(WantedColumns::new()),
            artifacts: Vec::new(),
        }
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Compile the DOM into agent specs and install one Agent Client per
    /// host, sequentially. The first install failure aborts the whole run.
    pub fn prepare(&mut self, hosts: &[Element], target_hint: Option<&str>) -> Result<()> {
        let (specs, wanted) = compiler::compile(hosts, target_hint)?;
        self.multiplexer = Multiplexer::new(wanted);

        let mut clients = Vec::with_capacity(specs.len());
        for spec in specs {
            let transport = (self.make_transport)(&spec.host, spec.port);
            let mut client = AgentClient::new(spec, transport, &self.payload_dir);
            let config_path = client.install(self.loglevel)?;
            self.artifacts.push(config_path);
            clients.push(client);
        }
        self.clients = clients;
        Ok(())
    }

    /// Launch every installed agent and register its streams with the
    /// Multiplexer.
    pub fn start(&mut self) -> Result<()> {
        for client in &self.clients {
            let child = client.start()?;
            log::info!("started monitoring agent at {}", client.host());
            self.multiplexer.register(client.host().to_string(), child);
        }
        Ok(())
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.multiplexer.add_listener(listener);
    }

    /// Tick the Multiplexer once. Returns the number of still-tracked
    /// output streams; callers drive their own cadence.
    pub fn poll(&mut self) -> usize {
        self.multiplexer.poll()
    }

    /// Signal every running agent, then uninstall each Agent Client
    /// (best-effort log fetch + remote cleanup), accumulating log paths
    /// into the artifact list. A no-op beyond bookkeeping if every child
    /// has already exited.
    pub fn stop(&mut self) -> Result<()> {
        self.multiplexer.signal_all_sigint();

        for client in &self.clients {
            match client.uninstall() {
                Ok(log_path) => self.artifacts.push(log_path),
                Err(e) => log::warn!("[{}] uninstall failed: {}", client.host(), e),
            }
        }
        Ok(())
    }
}
