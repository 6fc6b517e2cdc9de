//! Component A: an abstract SSH command-exec and SCP file-copy factory
//! bound to a `host:port`.
//!
//! The real implementation shells out to the system `ssh(1)`/`scp(1)`
//! clients exactly as `MonCollector/collector.py`'s `SSHWrapper` does,
//! which is what gives each invocation a real OS pid and its own process
//! group — load-bearing for the orchestrator's single-signal shutdown
//! (spec §9 "process-group signaling"). `FakeTransport` is the Rust
//! equivalent of the original's injectable `ssh_wrapper_class`, used by
//! this crate's own tests to drive the orchestrator without a network.

use std::io;
use std::process::{Child, Command, Stdio};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Mandatory SSH options: suppress banner, never prompt for host keys or
/// passwords, bound connect latency to 5 seconds.
pub const SSH_OPTS: &[&str] = &[
    "-q",
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "PasswordAuthentication=no",
    "-o",
    "NumberOfPasswordPrompts=0",
    "-o",
    "ConnectTimeout=5",
];

/// Factory for remote command execution and file copy against one
/// `host:port`. Holds no open sessions between calls.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Launch an SSH session executing `argv` on the bound host, stdio
    /// piped and unbuffered, in its own process group.
    fn exec_remote(&self, argv: &[String]) -> io::Result<Child>;

    /// Launch an SCP copy from `source` to `dest`. Either side may be a
    /// local path or `host:remote_path`. `recursive` requests `-r`.
    fn copy(&self, source: &str, dest: &str, recursive: bool) -> io::Result<Child>;
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| nix::unistd::setsid().map(|_| ()).map_err(io::Error::from));
    }
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// Joins argv tokens the way `ssh(1)` will: it concatenates everything
/// after the hostname with a single space before handing it to the remote
/// shell, without quoting. We quote ourselves so a value containing
/// whitespace or shell metacharacters still reaches the remote side intact.
#[cfg(feature = "ssh")]
fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|t| shell_escape::escape(std::borrow::Cow::Borrowed(t.as_str())).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The production transport: shells out to the system `ssh`/`scp` clients.
#[cfg(feature = "ssh")]
#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    port: u16,
}

#[cfg(feature = "ssh")]
impl SshTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        SshTransport {
            host: host.into(),
            port,
        }
    }
}

#[cfg(feature = "ssh")]
impl Transport for SshTransport {
    fn exec_remote(&self, argv: &[String]) -> io::Result<Child> {
        let mut cmd = Command::new("ssh");
        cmd.args(SSH_OPTS)
            .arg("-p")
            .arg(self.port.to_string())
            .arg(&self.host)
            .arg(shell_join(argv))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        own_process_group(&mut cmd);
        cmd.spawn()
    }

    fn copy(&self, source: &str, dest: &str, recursive: bool) -> io::Result<Child> {
        let mut cmd = Command::new("scp");
        cmd.args(SSH_OPTS).arg("-P").arg(self.port.to_string());
        if recursive {
            cmd.arg("-r");
        }
        cmd.arg(source)
            .arg(dest)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        own_process_group(&mut cmd);
        cmd.spawn()
    }
}

/// A transport that runs everything as local subprocesses, treating any
/// `host:path` endpoint as a plain local `path`. Used by tests so the
/// collector's lifecycle and streaming logic can be exercised without a
/// reachable SSH server.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport;

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport
    }

    fn strip_host_prefix(path: &str) -> &str {
        match path.split_once(':') {
            Some((_, rest)) if !path.starts_with('/') && !path.starts_with('.') => rest,
            _ => path,
        }
    }
}

impl Transport for FakeTransport {
    fn exec_remote(&self, argv: &[String]) -> io::Result<Child> {
        if argv.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty argv"));
        }
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        own_process_group(&mut cmd);
        cmd.spawn()
    }

    fn copy(&self, source: &str, dest: &str, recursive: bool) -> io::Result<Child> {
        let source = Self::strip_host_prefix(source);
        let dest = Self::strip_host_prefix(dest);
        let mut cmd = Command::new("cp");
        if recursive {
            cmd.arg("-r");
        }
        cmd.arg(source)
            .arg(dest)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn fake_transport_exec_runs_local_command() {
        let transport = FakeTransport::new();
        let mut child = transport
            .exec_remote(&["echo".to_string(), "hello".to_string()])
            .unwrap();
        let status = child.wait().unwrap();
        assert!(status.success());
        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn fake_transport_copy_strips_host_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("source.txt");
        std::fs::write(&src, b"payload").unwrap();
        let dest = dir.path().join("dest.txt");

        let transport = FakeTransport::new();
        let mut child = transport
            .copy(
                src.to_str().unwrap(),
                &format!("h1:{}", dest.to_str().unwrap()),
                false,
            )
            .unwrap();
        assert!(child.wait().unwrap().success());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "payload");
    }
}
