use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use hytaleping::{StatusMonitor, settings::Settings, telemetry};
use log::info;

/// Check whether Hytale servers answer a QUIC Initial probe over UDP.
#[derive(Debug, Parser)]
#[command(name = "hytaleping", version)]
struct Opt {
    /// Servers to probe: host, host:port or a.b.c.d:port
    targets: Vec<String>,

    /// Port for targets given without one
    #[arg(short, long)]
    port: Option<u16>,

    /// Milliseconds to wait for a response
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Rounds of probes to run, 0 for until Ctrl-C
    #[arg(short, long)]
    count: Option<u32>,

    /// Milliseconds between rounds
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Print one JSON object per result
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Opt {
    fn apply(self, settings: &mut Settings) {
        if !self.targets.is_empty() {
            settings.targets = Some(self.targets);
        }
        settings.port = self.port.or(settings.port);
        settings.timeout_ms = self.timeout_ms.or(settings.timeout_ms);
        settings.count = self.count.or(settings.count);
        settings.interval_ms = self.interval_ms.or(settings.interval_ms);
        if self.json {
            settings.json = Some(true);
        }
    }
}

/// Targets may come from arguments, the settings file or the environment;
/// having none at all is a usage error.
fn require_targets(settings: &Settings) -> Result<(), clap::Error> {
    if settings.targets().is_empty() {
        return Err(Opt::command().error(
            ErrorKind::MissingRequiredArgument,
            "no targets given; pass them as arguments or set HYTALEPING_TARGETS",
        ));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if opt.verbose { "info" } else { "warn" }
    ))
    .init();

    let mut settings = Settings::new().context("Failed to load settings")?;
    opt.apply(&mut settings);

    if let Err(e) = require_targets(&settings) {
        e.exit();
    }
    let monitor = StatusMonitor::new(settings)?;

    telemetry::init_metrics()?;
    let summary = monitor.run().await;
    telemetry::shutdown_metrics();
    let summary = summary?;

    info!(
        "Done: {} online, {} offline",
        summary.online, summary.offline
    );
    if summary.offline > 0 {
        std::process::exit(1);
    }
    Ok(())
}
