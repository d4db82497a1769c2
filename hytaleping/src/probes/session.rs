use std::{
    future::{Future, pending},
    io,
    net::{Ipv4Addr, SocketAddr},
};

use log::debug;
use rand::{TryCryptoRng, rngs::OsRng};
use tokio::{
    net::{UdpSocket, lookup_host},
    time::{Instant, timeout_at},
};

use super::{PacketBuilder, ProbeConfig, ProbeError, ServerStatus};

/// Largest possible UDP payload, so no reply is ever truncated.
const RECV_BUFFER_SIZE: usize = 65_536;

/// One probe against one target. `probe` consumes the session, so a
/// session can settle at most once.
pub struct ProbeSession<'a, R = OsRng> {
    config: &'a ProbeConfig,
    builder: PacketBuilder<R>,
}

impl<'a> ProbeSession<'a> {
    pub fn new(config: &'a ProbeConfig) -> Self {
        Self::with_builder(config, PacketBuilder::new())
    }
}

impl<'a, R: TryCryptoRng> ProbeSession<'a, R> {
    pub fn with_builder(config: &'a ProbeConfig, builder: PacketBuilder<R>) -> Self {
        Self { config, builder }
    }

    pub async fn probe(self) -> Result<ServerStatus, ProbeError> {
        self.probe_until(pending()).await
    }

    /// Like [`probe`](Self::probe), but settles with
    /// [`ProbeError::Cancelled`] if `cancel` completes first.
    pub async fn probe_until<C>(self, cancel: C) -> Result<ServerStatus, ProbeError>
    where
        C: Future<Output = ()>,
    {
        let Self {
            config,
            mut builder,
        } = self;
        let started = Instant::now();

        // Dropped on every return path below, including the losing
        // branches of the select.
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(ProbeError::Transport)?;
        let deadline = Instant::now() + config.timeout();

        debug!(
            "probe {}: bound {:?}, timeout {:?}",
            config,
            socket.local_addr().ok(),
            config.timeout()
        );

        let outcome = tokio::select! {
            res = timeout_at(deadline, exchange(config, &mut builder, &socket)) => match res {
                Ok(res) => res,
                Err(_) => Err(ProbeError::Timeout(config.timeout())),
            },
            _ = cancel => Err(ProbeError::Cancelled),
        };
        drop(socket);

        outcome.map(|(responder, response_bytes)| {
            let ping_millis = started.elapsed().as_millis() as u64;
            debug!("probe {}: online, {}ms", config, ping_millis);
            ServerStatus {
                online: true,
                ping_millis,
                responder,
                response_bytes,
            }
        })
    }
}

/// Sending → AwaitingResponse. Resolves with the first datagram's sender
/// and size, whoever sent it.
async fn exchange<R: TryCryptoRng>(
    config: &ProbeConfig,
    builder: &mut PacketBuilder<R>,
    socket: &UdpSocket,
) -> Result<(SocketAddr, usize), ProbeError> {
    let packet = builder.build()?;
    let target = resolve_ipv4(config).await.map_err(ProbeError::Send)?;

    socket
        .send_to(packet.as_bytes(), target)
        .await
        .map_err(ProbeError::Send)?;
    debug!(
        "probe {}: sent {} bytes to {} (dcid={:02x?})",
        config,
        packet.len(),
        target,
        packet.destination_cid()
    );
    drop(packet);

    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let (len, from) = socket
        .recv_from(&mut buf)
        .await
        .map_err(ProbeError::Transport)?;
    Ok((from, len))
}

async fn resolve_ipv4(config: &ProbeConfig) -> io::Result<SocketAddr> {
    lookup_host((config.host(), config.port()))
        .await?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no IPv4 address for {}", config.host()),
            )
        })
}

/// Status client for a single Hytale server.
///
/// Every call opens its own socket and sends a freshly built packet;
/// calls share nothing but the configuration.
#[derive(Debug, Clone)]
pub struct HytaleQuicClient {
    config: ProbeConfig,
}

impl HytaleQuicClient {
    pub fn new(host: impl Into<String>, port: u16, timeout_ms: u64) -> Result<Self, ProbeError> {
        Ok(Self::from_config(ProbeConfig::new(host, port, timeout_ms)?))
    }

    pub fn with_defaults(host: impl Into<String>) -> Result<Self, ProbeError> {
        Ok(Self::from_config(ProbeConfig::with_defaults(host)?))
    }

    pub fn from_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub async fn check_server_status(&self) -> Result<ServerStatus, ProbeError> {
        ProbeSession::new(&self.config).probe().await
    }

    pub async fn check_server_status_until<C>(&self, cancel: C) -> Result<ServerStatus, ProbeError>
    where
        C: Future<Output = ()>,
    {
        ProbeSession::new(&self.config).probe_until(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::packet::testing::BrokenRng;
    use std::time::Duration;

    #[test]
    fn test_client_defaults() {
        let client = HytaleQuicClient::with_defaults("127.0.0.1").unwrap();
        assert_eq!(client.config().port(), 5520);
        assert_eq!(client.config().timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        assert!(matches!(
            HytaleQuicClient::new("127.0.0.1", 0, 5000),
            Err(ProbeError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_ipv4_literal() {
        let config = ProbeConfig::new("127.0.0.1", 5520, 100).unwrap();
        let addr = resolve_ipv4(&config).await.unwrap();
        assert_eq!(addr, "127.0.0.1:5520".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_ipv6_literal_has_no_ipv4() {
        let config = ProbeConfig::new("::1", 5520, 100).unwrap();
        let err = resolve_ipv4(&config).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrNotAvailable);
    }

    #[tokio::test]
    async fn test_entropy_failure_settles_before_timeout() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();
        let config = ProbeConfig::new("127.0.0.1", port, 5000).unwrap();

        let started = std::time::Instant::now();
        let res = ProbeSession::with_builder(&config, PacketBuilder::with_rng(BrokenRng))
            .probe()
            .await;

        assert!(matches!(res, Err(ProbeError::PacketBuild(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_probe_cancelled() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();
        let client = HytaleQuicClient::new("127.0.0.1", port, 5000).unwrap();

        let started = std::time::Instant::now();
        let res = client
            .check_server_status_until(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert!(matches!(res, Err(ProbeError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
