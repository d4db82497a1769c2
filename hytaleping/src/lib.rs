pub mod probes;
pub mod settings;
pub mod telemetry;

use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use serde::Serialize;
use tokio::{
    signal,
    sync::watch,
    task::JoinSet,
    time::{Duration, sleep},
};

use crate::probes::{HytaleQuicClient, ProbeConfig, ProbeError, ServerStatus};
use crate::settings::Settings;

/// Online/offline counts of the last completed round. Cancelled probes
/// are counted in neither.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub online: usize,
    pub offline: usize,
}

/// Probes every configured target concurrently, round after round.
pub struct StatusMonitor {
    pub settings: Settings,
    clients: Vec<HytaleQuicClient>,
}

impl StatusMonitor {
    pub fn new(settings: Settings) -> Result<Self> {
        if settings.targets().is_empty() {
            bail!("no targets given; pass them as arguments or set HYTALEPING_TARGETS");
        }

        let clients = settings
            .targets()
            .iter()
            .map(|target| {
                ProbeConfig::from_target(target, settings.port(), settings.timeout_ms())
                    .map(HytaleQuicClient::from_config)
                    .with_context(|| format!("invalid target '{}'", target))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { settings, clients })
    }

    /// Run until the configured number of rounds is done or Ctrl-C.
    pub async fn run(self) -> Result<RunSummary> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling probes");
                let _ = shutdown_tx.send(true);
            }
        });

        self.run_until(shutdown_rx).await
    }

    pub async fn run_until(&self, shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let count = self.settings.count();
        let interval = Duration::from_millis(self.settings.interval_ms());
        let mut round = 0u32;

        loop {
            round += 1;
            let summary = self.probe_round(&shutdown).await?;

            if *shutdown.borrow() || (count != 0 && round >= count) {
                return Ok(summary);
            }

            let mut rx = shutdown.clone();
            tokio::select! {
                _ = sleep(interval) => {}
                _ = wait_for_shutdown(&mut rx) => return Ok(summary),
            }
        }
    }

    async fn probe_round(&self, shutdown: &watch::Receiver<bool>) -> Result<RunSummary> {
        let mut tasks = JoinSet::new();
        for (idx, client) in self.clients.iter().enumerate() {
            let client = client.clone();
            let mut rx = shutdown.clone();
            tasks.spawn(async move {
                let res = client
                    .check_server_status_until(async move { wait_for_shutdown(&mut rx).await })
                    .await;
                (idx, res)
            });
        }

        let mut results = Vec::with_capacity(self.clients.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.context("probe task failed")?);
        }
        results.sort_by_key(|(idx, _)| *idx);

        let mut summary = RunSummary::default();
        for (idx, res) in &results {
            let target = self.clients[*idx].config().to_string();
            if matches!(res, Err(ProbeError::Cancelled)) {
                continue;
            }
            match res {
                Ok(status) => {
                    summary.online += 1;
                    info!("{} online ping={}ms", target, status.ping_millis);
                    telemetry::record_probe(&target, "online", Some(status.ping_millis));
                }
                Err(e @ ProbeError::Timeout(_)) => {
                    summary.offline += 1;
                    info!("{} offline: {}", target, e);
                    telemetry::record_probe(&target, e.kind(), None);
                }
                Err(e) => {
                    summary.offline += 1;
                    warn!("{} probe failed: {}", target, e);
                    telemetry::record_probe(&target, e.kind(), None);
                }
            }
            println!("{}", render_result(&target, res, self.settings.json()));
        }

        Ok(summary)
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    // A dropped sender means nobody can ask for shutdown any more.
    let stopped = rx.wait_for(|stop| *stop).await.is_ok();
    if !stopped {
        std::future::pending::<()>().await;
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport<'a> {
    target: &'a str,
    online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ping_millis: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    responder: Option<SocketAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// One output line for a settled probe, plain text or JSON.
pub fn render_result(target: &str, res: &Result<ServerStatus, ProbeError>, json: bool) -> String {
    if json {
        let report = match res {
            Ok(status) => ProbeReport {
                target,
                online: status.online,
                ping_millis: Some(status.ping_millis),
                responder: Some(status.responder),
                response_bytes: Some(status.response_bytes),
                error: None,
                message: None,
            },
            Err(e) => ProbeReport {
                target,
                online: false,
                ping_millis: None,
                responder: None,
                response_bytes: None,
                error: Some(e.kind()),
                message: Some(e.to_string()),
            },
        };
        return serde_json::to_string(&report).expect("probe report is always serializable");
    }

    match res {
        Ok(status) => format!("{} online ping={}ms", target, status.ping_millis),
        Err(e @ ProbeError::Timeout(_)) => format!("{} offline ({})", target, e),
        Err(e) => format!("{} offline ({}: {})", target, e.kind(), e),
    }
}
