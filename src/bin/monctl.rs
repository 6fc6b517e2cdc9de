//! Thin CLI entry point. Parses arguments, wires up logging, and drives an
//! [`tele_collector::Orchestrator`] end to end — either against a single
//! host named on the command line, or a fleet described by a TOML
//! [`tele_collector::config_file::RunConfig`]. Signal handling of this
//! process and the DOM-syntax reader are deliberately kept out of the
//! library crate; this binary is the ambient surface that owns them, the
//! way `renoir` ships `rnctl` alongside its library without folding the
//! CLI into `renoir` itself.

use std::thread;
use std::time::Duration;

use clap::Parser;

use tele_collector::config_file::RunConfig;
use tele_collector::dom::{Element, LogLevel};
use tele_collector::listener::StdoutListener;
use tele_collector::transport::{FakeTransport, SshTransport};
use tele_collector::Orchestrator;

#[derive(Parser, Debug)]
#[command(name = "monctl", about = "Drive a monitoring collector run")]
struct Cli {
    /// Single remote host to monitor. Mutually exclusive with --config.
    host: Option<String>,

    /// SSH port, used only with a positional host.
    #[arg(long, default_value_t = 22)]
    port: u16,

    /// TOML run-configuration file describing a fleet of hosts. Mutually
    /// exclusive with a positional host.
    #[arg(long)]
    config: Option<String>,

    /// Hostname substituted for the `[target]` sentinel in --config.
    #[arg(long)]
    target: Option<String>,

    /// Local directory holding the agent payload (copied recursively to
    /// the remote host).
    #[arg(long)]
    payload_dir: String,

    /// How many seconds to poll before stopping.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Use FakeTransport (local subprocess) instead of real SSH. Useful
    /// for smoke-testing against localhost without a remote fleet.
    #[arg(long)]
    fake_transport: bool,

    #[arg(long, value_enum, default_value = "info")]
    loglevel: CliLogLevel,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CliLogLevel {
    Info,
    Debug,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.loglevel {
        CliLogLevel::Info => "info",
        CliLogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let loglevel = LogLevel::from_attr(Some(level));

    let hosts = match (&cli.host, &cli.config) {
        (Some(host), None) => vec![Element::new("Host")
            .with_attr("address", host.clone())
            .with_attr("port", cli.port.to_string())],
        (None, Some(config_path)) => match RunConfig::read_file(config_path) {
            Ok(cfg) => cfg.to_hosts(),
            Err(e) => {
                log::error!("failed to read {config_path}: {e}");
                std::process::exit(1);
            }
        },
        (Some(_), Some(_)) => {
            log::error!("pass either a single host or --config, not both");
            std::process::exit(1);
        }
        (None, None) => {
            log::error!("pass a host or --config");
            std::process::exit(1);
        }
    };

    if cli.fake_transport {
        run(
            hosts,
            cli.target.as_deref(),
            loglevel,
            cli.payload_dir,
            cli.duration_secs,
            |_host, _port| FakeTransport::new(),
        );
    } else {
        run(
            hosts,
            cli.target.as_deref(),
            loglevel,
            cli.payload_dir,
            cli.duration_secs,
            |host, port| SshTransport::new(host, port),
        );
    }
}

fn run<T, F>(
    hosts: Vec<Element>,
    target_hint: Option<&str>,
    loglevel: LogLevel,
    payload_dir: String,
    duration_secs: u64,
    make_transport: F,
) where
    T: tele_collector::transport::Transport,
    F: Fn(&str, u16) -> T,
{
    let mut orchestrator = Orchestrator::new(payload_dir, loglevel, make_transport);
    orchestrator.add_listener(Box::new(StdoutListener));

    if let Err(e) = orchestrator.prepare(&hosts, target_hint) {
        log::error!("prepare failed: {e}");
        std::process::exit(1);
    }
    if let Err(e) = orchestrator.start() {
        log::error!("start failed: {e}");
        std::process::exit(1);
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(duration_secs);
    while std::time::Instant::now() < deadline && orchestrator.poll() > 0 {
        thread::sleep(Duration::from_millis(200));
    }

    if let Err(e) = orchestrator.stop() {
        log::error!("stop failed: {e}");
    }
    log::info!("artifacts: {:?}", orchestrator.artifacts());
}
