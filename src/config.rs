//! Configuration types for minswap-rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Cardano network the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

impl Network {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "preprod" => Ok(Network::Preprod),
            "preview" => Ok(Network::Preview),
            other => Err(Error::Config(format!(
                "unknown network '{}', expected one of mainnet, preprod, preview",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Preprod => "preprod",
            Network::Preview => "preview",
        }
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(self, Network::Mainnet)
    }

    /// Network id nibble used in Shelley address headers.
    pub fn network_id(&self) -> u8 {
        if self.is_mainnet() {
            1
        } else {
            0
        }
    }

    pub fn blockfrost_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://cardano-mainnet.blockfrost.io/api/v0",
            Network::Preprod => "https://cardano-preprod.blockfrost.io/api/v0",
            Network::Preview => "https://cardano-preview.blockfrost.io/api/v0",
        }
    }

    /// Epoch containing `unix_secs`. Times before the first Shelley epoch map to it.
    pub fn epoch_at(&self, unix_secs: i64) -> u64 {
        // (first Shelley epoch, its start, epoch length)
        let (epoch, start, length) = match self {
            Network::Mainnet => (208, 1_596_059_091, 432_000),
            Network::Preprod => (4, 1_655_769_600, 432_000),
            Network::Preview => (0, 1_666_656_000, 86_400),
        };
        epoch + (unix_secs.saturating_sub(start).max(0) / length) as u64
    }
}

/// Limits enforced on outbound indexing API calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Calls admitted in any trailing `window`.
    pub max_calls_per_window: usize,
    #[serde(with = "duration_secs")]
    pub window: Duration,
    /// Hard cap for the whole session. `None` means unlimited.
    pub max_session_calls: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Blockfrost allows a burst of 500 and refills at 10 per second.
        Self {
            max_calls_per_window: 500,
            window: Duration::from_secs(50),
            max_session_calls: None,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Everything a session needs, passed explicitly at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Blockfrost project id.
    pub project_id: String,
    pub network: Network,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_wallet_dir")]
    pub wallet_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_wallet_dir() -> PathBuf {
    PathBuf::from(".wallet")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Config {
    pub fn new(project_id: &str, network: Network) -> Self {
        Self {
            project_id: project_id.to_string(),
            network,
            rate_limit: RateLimitConfig::default(),
            wallet_dir: default_wallet_dir(),
            cache_dir: default_cache_dir(),
        }
    }

    pub fn with_max_session_calls(mut self, max_calls: u64) -> Self {
        self.rate_limit.max_session_calls = Some(max_calls);
        self
    }

    /// Build a config from `PROJECT_ID`, `NETWORK` and `MAX_CALLS`.
    ///
    /// Only the CLI uses this; library callers construct `Config` directly.
    pub fn from_env() -> Result<Self> {
        let project_id = std::env::var("PROJECT_ID")
            .map_err(|_| Error::Config("PROJECT_ID is not set".to_string()))?;
        let network = match std::env::var("NETWORK") {
            Ok(n) => Network::parse(&n)?,
            Err(_) => Network::Mainnet,
        };
        let mut config = Config::new(&project_id, network);
        if let Ok(max) = std::env::var("MAX_CALLS") {
            let max = max
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("MAX_CALLS is not a number: {}", e)))?;
            config = config.with_max_session_calls(max);
        }
        Ok(config)
    }

    /// Path of the plaintext mnemonic for this network.
    pub fn mnemonic_path(&self) -> PathBuf {
        self.wallet_dir
            .join(format!("{}_mnemonic.txt", self.network.name()))
    }
}
