use std::{fmt, io, net::SocketAddr, time::Duration};

use serde::Serialize;
use thiserror::Error;

pub mod packet;
pub mod session;

pub use packet::{InitialPacket, PacketBuilder, PacketError};
pub use session::{HytaleQuicClient, ProbeSession};

pub const DEFAULT_PORT: u16 = 5520;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Failure of a single probe. Every variant is reported to the caller
/// after the probe's socket has been released.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid probe configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build initial packet: {0}")]
    PacketBuild(#[from] PacketError),

    #[error("failed to send packet: {0}")]
    Send(#[source] io::Error),

    #[error("socket error: {0}")]
    Transport(#[source] io::Error),

    #[error("server did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("probe cancelled")]
    Cancelled,
}

impl ProbeError {
    /// Stable label used for metrics and machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::InvalidConfig(_) => "invalid_config",
            ProbeError::PacketBuild(_) => "packet_build",
            ProbeError::Send(_) => "send",
            ProbeError::Transport(_) => "transport",
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Cancelled => "cancelled",
        }
    }
}

/// Target and timing of a probe. Validated on construction and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ProbeConfig {
    pub fn new(host: impl Into<String>, port: u16, timeout_ms: u64) -> Result<Self, ProbeError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ProbeError::InvalidConfig("host must not be empty".into()));
        }
        if port == 0 {
            return Err(ProbeError::InvalidConfig("port must be positive".into()));
        }
        if timeout_ms == 0 {
            return Err(ProbeError::InvalidConfig("timeout must be positive".into()));
        }
        Ok(Self {
            host,
            port,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn with_defaults(host: impl Into<String>) -> Result<Self, ProbeError> {
        Self::new(host, DEFAULT_PORT, DEFAULT_TIMEOUT_MS)
    }

    /// Parse `host`, `host:port` or `a.b.c.d:port`. IPv6 targets, bare
    /// or bracketed, are rejected: probes go out over IPv4 only.
    pub fn from_target(target: &str, default_port: u16, timeout_ms: u64) -> Result<Self, ProbeError> {
        let target = target.trim();
        if target.starts_with('[') || target.matches(':').count() > 1 {
            return Err(ProbeError::InvalidConfig(format!(
                "IPv6 target '{}' is not supported",
                target
            )));
        }
        let (host, port) = match target.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ProbeError::InvalidConfig(format!("invalid port in target '{}'", target))
                })?;
                (host, port)
            }
            None => (target, default_port),
        };
        Self::new(host, port, timeout_ms)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Display for ProbeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Successful probe outcome.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub online: bool,
    pub ping_millis: u64,
    /// Sender of the first datagram; not necessarily the probed address.
    pub responder: SocketAddr,
    pub response_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ProbeConfig::with_defaults("play.example.com").unwrap();
        assert_eq!(config.host(), "play.example.com");
        assert_eq!(config.port(), 5520);
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert_eq!(config.to_string(), "play.example.com:5520");
    }

    #[test]
    fn test_config_rejects_zero_values() {
        assert!(matches!(
            ProbeConfig::new("host", 0, 100),
            Err(ProbeError::InvalidConfig(_))
        ));
        assert!(matches!(
            ProbeConfig::new("host", 5520, 0),
            Err(ProbeError::InvalidConfig(_))
        ));
        assert!(matches!(
            ProbeConfig::new("  ", 5520, 100),
            Err(ProbeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_target() {
        let c = ProbeConfig::from_target("mc.example.org", 5520, 1000).unwrap();
        assert_eq!((c.host(), c.port()), ("mc.example.org", 5520));

        let c = ProbeConfig::from_target("mc.example.org:5521", 5520, 1000).unwrap();
        assert_eq!((c.host(), c.port()), ("mc.example.org", 5521));

        let c = ProbeConfig::from_target("10.0.0.7:7000", 5520, 1000).unwrap();
        assert_eq!((c.host(), c.port()), ("10.0.0.7", 7000));

        assert!(ProbeConfig::from_target("host:notaport", 5520, 1000).is_err());
        assert!(ProbeConfig::from_target("host:0", 5520, 1000).is_err());
    }

    #[test]
    fn test_from_target_rejects_ipv6() {
        for target in ["::1", "[::1]:5520", "[fe80::1]", "2001:db8::7"] {
            assert!(
                matches!(
                    ProbeConfig::from_target(target, 5520, 1000),
                    Err(ProbeError::InvalidConfig(_))
                ),
                "accepted {}",
                target
            );
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ProbeError::Cancelled.kind(), "cancelled");
        assert_eq!(ProbeError::Timeout(Duration::from_millis(200)).kind(), "timeout");
        assert_eq!(
            ProbeError::Timeout(Duration::from_millis(200)).to_string(),
            "server did not respond within 200ms"
        );
        let err = ProbeError::Send(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), "send");
    }

    #[test]
    fn test_status_serialization() {
        let status = ServerStatus {
            online: true,
            ping_millis: 42,
            responder: "127.0.0.1:5520".parse().unwrap(),
            response_bytes: 3,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"online\":true"));
        assert!(json.contains("\"pingMillis\":42"));
        assert!(json.contains("\"responder\":\"127.0.0.1:5520\""));
        assert!(json.contains("\"responseBytes\":3"));
    }
}
