//! Component D: the lifecycle of one remote agent — generate its config,
//! copy the agent payload and config to the remote host, launch it,
//! terminate it, fetch its log.
//!
//! Grounded on `MonCollector/collector.py`'s `AgentClient`.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::Builder as TempFileBuilder;

use crate::compiler::AgentSpec;
use crate::dom::LogLevel;
use crate::error::{CollectorError, Result};
use crate::transport::Transport;

const REMOTE_DIR_FALLBACK: &str = "/var/tmp/monitoring-agent";

/// One running (or not-yet-started) remote agent.
pub struct AgentClient<T: Transport> {
    spec: AgentSpec,
    transport: T,
    /// Local directory holding the agent executable + modules to deploy.
    payload_dir: PathBuf,
    /// Whether to force `DEBUG=1` into the remote env regardless of the
    /// ambient `DEBUG` variable. The source unconditionally does this
    /// (`os.getenv("DEBUG") or 1`); kept as a flag per the open question in
    /// the design notes rather than hardwired.
    force_debug_env: bool,

    remote_dir: Option<String>,
    local_config_path: Option<PathBuf>,
    launch_command: Option<Vec<String>>,
}

impl<T: Transport> AgentClient<T> {
    pub fn new(spec: AgentSpec, transport: T, payload_dir: impl Into<PathBuf>) -> Self {
        AgentClient {
            spec,
            transport,
            payload_dir: payload_dir.into(),
            force_debug_env: true,
            remote_dir: None,
            local_config_path: None,
            launch_command: None,
        }
    }

    pub fn with_force_debug_env(mut self, force: bool) -> Self {
        self.force_debug_env = force;
        self
    }

    pub fn host(&self) -> &str {
        &self.spec.host
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    /// Create the agent's local config file, probe the remote filesystem,
    /// copy the agent payload and config over, and compute the launch
    /// command. Returns the local config path (an artifact).
    pub fn install(&mut self, loglevel: LogLevel) -> Result<PathBuf> {
        log::info!("installing monitoring agent at {}...", self.spec.host);
        let config_path = self.write_local_config(loglevel)?;

        let remote_dir = self.probe_remote_dir()?;

        let payload_dest = format!("{}:{}", self.spec.host, remote_dir);
        self.run_copy(&self.payload_dir_str(), &payload_dest, true, "copy agent payload")?;

        let config_dest = format!("{}:{}/agent.cfg", self.spec.host, remote_dir);
        self.run_copy(
            config_path.to_str().unwrap_or_default(),
            &config_dest,
            false,
            "copy agent config",
        )?;

        let debug_flag = if self.force_debug_env {
            "DEBUG=1".to_string()
        } else {
            String::new()
        };
        self.launch_command = Some(vec![
            "/usr/bin/env".to_string(),
            debug_flag,
            self.spec.python.clone(),
            format!("{remote_dir}/agent/agent.py"),
            "-c".to_string(),
            format!("{remote_dir}/agent.cfg"),
        ]);
        self.remote_dir = Some(remote_dir);

        Ok(config_path)
    }

    /// Launch the agent. Appends `-t <epoch>` as the only synchronization
    /// signal to the remote side.
    pub fn start(&self) -> Result<Child> {
        let base = self.launch_command.as_ref().ok_or_else(|| {
            CollectorError::Install {
                host: self.spec.host.clone(),
                operation: "start".into(),
                detail: "install did not produce a launch command".into(),
            }
        })?;

        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut argv = base.clone();
        argv.push("-t".to_string());
        argv.push(epoch.to_string());

        log::debug!("starting monitoring agent at {}: {:?}", self.spec.host, argv);
        self.transport.exec_remote(&argv).map_err(CollectorError::Io)
    }

    /// Fetch the agent's log and best-effort remove its remote directory.
    /// Neither failure is fatal; both are logged.
    pub fn uninstall(&self) -> Result<PathBuf> {
        let log_path = TempFileBuilder::new()
            .prefix(&format!("agent_{}_", self.spec.host))
            .suffix(".log")
            .tempfile()
            .map_err(CollectorError::Io)?
            .into_temp_path()
            .keep()
            .map_err(|e| CollectorError::Io(e.error))?;

        if let Some(remote_dir) = &self.remote_dir {
            let log_source = format!("{}:{}_agent.log", self.spec.host, remote_dir);
            match self
                .transport
                .copy(&log_source, log_path.to_str().unwrap_or_default(), false)
                .and_then(|mut c| c.wait())
            {
                Ok(status) if status.success() => {}
                Ok(status) => log::warn!(
                    "[{}] fetching agent log exited with {:?}",
                    self.spec.host,
                    status.code()
                ),
                Err(e) => log::warn!("[{}] fetching agent log failed: {}", self.spec.host, e),
            }

            log::info!("removing agent from {}...", self.spec.host);
            let rm = vec!["rm".to_string(), "-r".to_string(), remote_dir.clone()];
            match self.transport.exec_remote(&rm).and_then(|mut c| c.wait()) {
                Ok(status) if status.success() => {}
                Ok(status) => log::warn!(
                    "[{}] removing remote agent dir exited with {:?}",
                    self.spec.host,
                    status.code()
                ),
                Err(e) => log::warn!("[{}] removing remote agent dir failed: {}", self.spec.host, e),
            }
        }

        Ok(log_path)
    }

    fn payload_dir_str(&self) -> String {
        self.payload_dir.to_string_lossy().into_owned()
    }

    fn write_local_config(&mut self, loglevel: LogLevel) -> Result<PathBuf> {
        let mut file = TempFileBuilder::new()
            .prefix("agent_")
            .suffix(".cfg")
            .tempfile()
            .map_err(CollectorError::Io)?;

        writeln!(file, "[main]")?;
        writeln!(file, "interval={}", self.spec.interval)?;
        writeln!(file, "host={}", self.spec.host)?;
        writeln!(file, "loglevel={}", loglevel.as_str())?;
        writeln!(file, "[metric]")?;
        writeln!(file, "names={}", self.spec.metric)?;
        writeln!(file, "[custom]")?;
        if !self.spec.custom.tail.is_empty() {
            writeln!(file, "tail={}", self.spec.custom.tail.join(","))?;
        }
        if !self.spec.custom.call.is_empty() {
            writeln!(file, "call={}", self.spec.custom.call.join(","))?;
        }
        file.flush().map_err(CollectorError::Io)?;

        let path = file.into_temp_path().keep().map_err(|e| CollectorError::Io(e.error))?;
        self.local_config_path = Some(path.clone());
        Ok(path)
    }

    fn probe_remote_dir(&self) -> Result<String> {
        let argv = vec![
            self.spec.python.clone(),
            "-c".to_string(),
            "import tempfile; print(tempfile.mkdtemp())".to_string(),
        ];

        let mut child = self
            .transport
            .exec_remote(&argv)
            .map_err(|e| CollectorError::Install {
                host: self.spec.host.clone(),
                operation: "probe remote temp dir".into(),
                detail: e.to_string(),
            })?;

        let mut stderr = String::new();
        if let Some(mut s) = child.stderr.take() {
            let _ = s.read_to_string(&mut stderr);
        }
        let stderr = stderr.trim().to_string();
        if !stderr.is_empty() {
            return Err(CollectorError::RuntimeTransport {
                host: self.spec.host.clone(),
                operation: "probe remote temp dir".into(),
                stderr,
            });
        }

        let mut stdout = String::new();
        if let Some(mut s) = child.stdout.take() {
            let _ = s.read_to_string(&mut stdout);
        }

        let status = child.wait().map_err(CollectorError::Io)?;
        if !status.success() {
            return Err(CollectorError::Install {
                host: self.spec.host.clone(),
                operation: "probe remote temp dir".into(),
                detail: format!("exit code {:?}", status.code()),
            });
        }

        let remote_dir = stdout.trim();
        if remote_dir.is_empty() {
            Ok(REMOTE_DIR_FALLBACK.to_string())
        } else {
            Ok(remote_dir.to_string())
        }
    }

    fn run_copy(&self, source: &str, dest: &str, recursive: bool, operation: &str) -> Result<()> {
        let mut child = self
            .transport
            .copy(source, dest, recursive)
            .map_err(|e| CollectorError::Install {
                host: self.spec.host.clone(),
                operation: operation.to_string(),
                detail: e.to_string(),
            })?;
        let status = child.wait().map_err(CollectorError::Io)?;
        if !status.success() {
            return Err(CollectorError::Install {
                host: self.spec.host.clone(),
                operation: operation.to_string(),
                detail: format!("exit code {:?}", status.code()),
            });
        }
        Ok(())
    }
}

/// Parse a local config file back into its `[section]` maps, for tests
/// asserting the generated grammar round-trips.
#[cfg(test)]
pub(crate) fn read_sections(path: &Path) -> std::collections::HashMap<String, std::collections::HashMap<String, String>> {
    use std::collections::HashMap;
    let content = std::fs::read_to_string(path).unwrap();
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current = String::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = line[1..line.len() - 1].to_string();
            sections.entry(current.clone()).or_default();
        } else if let Some((k, v)) = line.split_once('=') {
            sections.entry(current.clone()).or_default().insert(k.to_string(), v.to_string());
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CustomDescriptors;
    use crate::transport::FakeTransport;

    fn spec(host: &str) -> AgentSpec {
        AgentSpec {
            host: host.to_string(),
            port: 22,
            python: "/usr/bin/python".to_string(),
            interval: 1,
            priority: 0,
            metric: "cpu-stat,mem".to_string(),
            custom: CustomDescriptors::default(),
        }
    }

    #[test]
    fn generated_config_has_expected_sections() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = AgentClient::new(spec("h1"), FakeTransport::new(), dir.path());
        let path = client.write_local_config(LogLevel::Debug).unwrap();
        let sections = read_sections(&path);

        assert_eq!(sections["main"]["interval"], "1");
        assert_eq!(sections["main"]["host"], "h1");
        assert_eq!(sections["main"]["loglevel"], "debug");
        assert_eq!(sections["metric"]["names"], "cpu-stat,mem");
        assert!(!sections.contains_key("custom") || sections["custom"].is_empty());
    }

    #[test]
    fn generated_config_includes_custom_sections_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut custom = CustomDescriptors::default();
        custom.tail.push("abc:def:0".to_string());
        let mut s = spec("h1");
        s.custom = custom;
        let mut client = AgentClient::new(s, FakeTransport::new(), dir.path());
        let path = client.write_local_config(LogLevel::Info).unwrap();
        let sections = read_sections(&path);
        assert_eq!(sections["custom"]["tail"], "abc:def:0");
        assert!(!sections["custom"].contains_key("call"));
    }

    #[test]
    fn start_without_install_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let client = AgentClient::new(spec("h1"), FakeTransport::new(), dir.path());
        assert!(client.start().is_err());
    }
}
