use config::{Config, ConfigError, Environment, File};
use log::debug;
use serde::Deserialize;

use crate::probes::{DEFAULT_PORT, DEFAULT_TIMEOUT_MS};

const DEFAULT_COUNT: u32 = 1;
const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Monitor configuration. Read from an optional `hytaleping.{yaml,yml}`
/// file, then `HYTALEPING_*` environment variables; unset values fall
/// back to the defaults through the accessors below.
#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
pub struct Settings {
    pub targets: Option<Vec<String>>,
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
    /// Rounds to run; 0 runs until interrupted.
    pub count: Option<u32>,
    pub interval_ms: Option<u64>,
    pub json: Option<bool>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let s = Config::builder()
            .add_source(File::with_name("hytaleping").required(false))
            .add_source(
                Environment::with_prefix("HYTALEPING")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("targets")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = s.try_deserialize()?;
        debug!("Parsed settings: {:?}", settings);
        Ok(settings)
    }

    pub fn targets(&self) -> &[String] {
        self.targets.as_deref().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn count(&self) -> u32 {
        self.count.unwrap_or(DEFAULT_COUNT)
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS)
    }

    pub fn json(&self) -> bool {
        self.json.unwrap_or(false)
    }
}
