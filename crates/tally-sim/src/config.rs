//! Simulation configuration file.
//!
//! ```toml
//! [oracle]
//! max_staleness_seconds = 3600
//! min_price = "1_000000000000000000"
//!
//! [vault]
//! twap_window_seconds = 1800
//!
//! [access]
//! admins = ["admin"]
//!
//! [[account]]
//! name = "alice"
//! balance = 1_000_000
//!
//! [[feed.primary]]
//! at = 1_700_000_000
//! price = 2000_00000000
//!
//! [[step]]
//! action = "deposit"
//! at = 1_700_000_000
//! caller = "alice"
//! assets = 1000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use tally_types::price::OracleConfig;
use tally_vault::VaultConfig;

/// Complete simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Oracle validation parameters.
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Vault parameters.
    #[serde(default)]
    pub vault: VaultConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
    /// Administrator accounts.
    #[serde(default)]
    pub access: AccessConfig,
    /// Scheduled feed answers.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Initial asset balances.
    #[serde(default, rename = "account")]
    pub accounts: Vec<AccountFunding>,
    /// Scenario steps, applied in order.
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = `$TALLY_DATA_DIR` or `~/.tally`.
    #[serde(default)]
    pub data_dir: String,
    /// Skip the database entirely.
    #[serde(default)]
    pub ephemeral: bool,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Access configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Account labels holding the administrative role.
    #[serde(default)]
    pub admins: Vec<String>,
}

/// Feed schedules for the two simulated price sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Primary feed answers.
    #[serde(default)]
    pub primary: Vec<FeedPoint>,
    /// Fallback feed answers. Empty = no fallback source.
    #[serde(default)]
    pub fallback: Vec<FeedPoint>,
}

/// One scheduled feed answer, visible from `at` onwards.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPoint {
    /// Simulation time from which this answer is served.
    pub at: u64,
    /// Raw answer in the feed's own decimals.
    #[serde_as(as = "tally_types::codec::Decimal")]
    #[serde(default)]
    pub price: i128,
    /// Feed decimals.
    #[serde(default = "default_feed_decimals")]
    pub decimals: u8,
    /// Reported update time. Defaults to `at`.
    #[serde(default)]
    pub updated_at: Option<u64>,
    /// Answer carried over from the previous round.
    #[serde(default)]
    pub incomplete: bool,
    /// The feed does not answer at all.
    #[serde(default)]
    pub offline: bool,
}

/// Initial asset balance of a labelled account.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFunding {
    /// Account label.
    pub name: String,
    /// Asset balance.
    #[serde_as(as = "tally_types::codec::Decimal")]
    pub balance: u128,
}

/// A scenario step.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Deposit exact assets.
    Deposit {
        at: u64,
        caller: String,
        #[serde(default)]
        receiver: Option<String>,
        #[serde_as(as = "tally_types::codec::Decimal")]
        assets: u128,
    },
    /// Mint exact shares.
    Mint {
        at: u64,
        caller: String,
        #[serde(default)]
        receiver: Option<String>,
        #[serde_as(as = "tally_types::codec::Decimal")]
        shares: u128,
    },
    /// Withdraw exact assets.
    Withdraw {
        at: u64,
        caller: String,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        receiver: Option<String>,
        #[serde_as(as = "tally_types::codec::Decimal")]
        assets: u128,
    },
    /// Redeem exact shares.
    Redeem {
        at: u64,
        caller: String,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        receiver: Option<String>,
        #[serde_as(as = "tally_types::codec::Decimal")]
        shares: u128,
    },
    /// Donate assets to the pool.
    Donate {
        at: u64,
        from: String,
        #[serde_as(as = "tally_types::codec::Decimal")]
        assets: u128,
    },
    /// Toggle emergency shutdown.
    Shutdown {
        at: u64,
        caller: String,
        #[serde(default = "default_true")]
        active: bool,
    },
    /// Redeem during shutdown.
    EmergencyWithdraw {
        at: u64,
        owner: String,
        #[serde(default)]
        receiver: Option<String>,
        #[serde_as(as = "tally_types::codec::Decimal")]
        shares: u128,
    },
    /// Query the oracle.
    Price { at: u64 },
}

impl Step {
    /// Simulation time of the step.
    pub fn at(&self) -> u64 {
        match self {
            Self::Deposit { at, .. }
            | Self::Mint { at, .. }
            | Self::Withdraw { at, .. }
            | Self::Redeem { at, .. }
            | Self::Donate { at, .. }
            | Self::Shutdown { at, .. }
            | Self::EmergencyWithdraw { at, .. }
            | Self::Price { at } => *at,
        }
    }

    /// Action name as written in the config file.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Mint { .. } => "mint",
            Self::Withdraw { .. } => "withdraw",
            Self::Redeem { .. } => "redeem",
            Self::Donate { .. } => "donate",
            Self::Shutdown { .. } => "shutdown",
            Self::EmergencyWithdraw { .. } => "emergency_withdraw",
            Self::Price { .. } => "price",
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_feed_decimals() -> u8 {
    8
}

fn default_true() -> bool {
    true
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl SimConfig {
    /// Load configuration from `path`, or from the default location.
    ///
    /// Falls back to defaults if the default file does not exist. An
    /// explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (config_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path(), false),
        };
        if !required && !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", config_path.display()))?;
        Self::parse(&content)
    }

    /// Parse and validate a configuration document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: SimConfig = toml::from_str(content)?;
        config.oracle.validate()?;
        if config.feed.primary.is_empty() && !config.steps.is_empty() {
            tracing::warn!("config: no primary feed answers, every oracle call will fail");
        }
        Ok(config)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TALLY_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".tally"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/tally"))
    }
}
