use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default weights for the channel opening heuristics.
pub const DEFAULT_OPEN_WEIGHTS: OpenWeights = OpenWeights {
    capacity: 1.0,
    features: 1.0,
    hybrid: 0.8,
    base_fee: 1.0,
    fee_rate: 0.7,
    inbound_base_fee: 0.8,
    inbound_fee_rate: 0.7,
    min_htlc: 1.0,
    max_htlc: 0.6,
    degree_centrality: 0.4,
    betweenness_centrality: 0.8,
    eigenvector_centrality: 0.5,
    closeness_centrality: 0.8,
    block_height: 0.0,
};

/// Default weights for the channel closing heuristics.
pub const DEFAULT_CLOSE_WEIGHTS: CloseWeights = CloseWeights {
    capacity: 0.5,
    active: 1.0,
    num_forwards: 0.8,
    forwards_amount: 1.0,
    fees: 1.0,
    age: 0.6,
    ping_time: 0.4,
    flap_count: 0.2,
};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub lightning: Lightning,
    #[serde(default)]
    pub agent: Agent,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Deserialize)]
pub struct Lightning {
    pub rpc: Rpc,
}

#[derive(Debug, Deserialize)]
pub struct Rpc {
    /// lnd gRPC endpoint, e.g. "https://127.0.0.1:10009"
    pub address: String,
    pub tls_cert_path: PathBuf,
    pub macaroon_path: PathBuf,
    /// RPC timeout in seconds
    #[serde(default)]
    pub timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Agent {
    /// Log decisions but execute nothing
    #[serde(default)]
    pub dry_run: bool,
    /// Allow unilateral closes of inactive channels
    #[serde(default)]
    pub allow_force_closes: bool,
    /// Node identity keys to never open channels with
    #[serde(default)]
    pub blocklist: Vec<String>,
    /// Channel points to never close
    #[serde(default)]
    pub keeplist: Vec<String>,
    #[serde(default)]
    pub channel_manager: ChannelManager,
    #[serde(default)]
    pub heuristic_weights: HeuristicWeights,
    /// Percentage of the confirmed wallet balance allocated to channels
    #[serde(default)]
    pub allocation_percent: u64,
    /// Minimum number of channels per funding transaction
    #[serde(default)]
    pub min_batch_size: u64,
    #[serde(default)]
    pub min_channels: u64,
    #[serde(default)]
    pub max_channels: u64,
    /// Minimum channel size in satoshis
    #[serde(default)]
    pub min_channel_size: u64,
    /// Maximum channel size in satoshis
    #[serde(default)]
    pub max_channel_size: u64,
    /// Confirmation target for fee estimations
    #[serde(default)]
    pub target_conf: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChannelManager {
    /// Maximum sat/vB at which on-chain actions are still executed
    #[serde(default)]
    pub max_sat_vb: u64,
    /// Minimum confirmations for the UTXOs funding a transaction
    #[serde(default)]
    pub min_conf: i32,
    /// Base fee for newly opened channels
    #[serde(default)]
    pub base_fee_msat: u64,
    /// Fee rate for newly opened channels
    #[serde(default)]
    pub fee_rate_ppm: u64,
    /// Forwards window used when retuning routing policies, in days
    #[serde(default)]
    pub activity_period_days: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct HeuristicWeights {
    #[serde(default)]
    pub close: CloseWeights,
    #[serde(default)]
    pub open: OpenWeights,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
pub struct CloseWeights {
    #[serde(default)]
    pub capacity: f64,
    #[serde(default)]
    pub active: f64,
    #[serde(default)]
    pub num_forwards: f64,
    #[serde(default)]
    pub forwards_amount: f64,
    #[serde(default)]
    pub fees: f64,
    #[serde(default)]
    pub age: f64,
    #[serde(default)]
    pub ping_time: f64,
    #[serde(default)]
    pub flap_count: f64,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
pub struct OpenWeights {
    #[serde(default)]
    pub capacity: f64,
    #[serde(default)]
    pub features: f64,
    #[serde(default)]
    pub hybrid: f64,
    #[serde(default)]
    pub base_fee: f64,
    #[serde(default)]
    pub fee_rate: f64,
    #[serde(default)]
    pub inbound_base_fee: f64,
    #[serde(default)]
    pub inbound_fee_rate: f64,
    #[serde(default)]
    pub min_htlc: f64,
    #[serde(default)]
    pub max_htlc: f64,
    #[serde(default)]
    pub degree_centrality: f64,
    #[serde(default)]
    pub betweenness_centrality: f64,
    #[serde(default)]
    pub eigenvector_centrality: f64,
    #[serde(default)]
    pub closeness_centrality: f64,
    #[serde(default)]
    pub block_height: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Logging {
    #[serde(default)]
    pub level: String,
}

impl CloseWeights {
    /// The weights by dimension name, in scoring order.
    pub fn values(&self) -> [(&'static str, f64); 8] {
        [
            ("capacity", self.capacity),
            ("active", self.active),
            ("num_forwards", self.num_forwards),
            ("forwards_amount", self.forwards_amount),
            ("fees", self.fees),
            ("age", self.age),
            ("ping_time", self.ping_time),
            ("flap_count", self.flap_count),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.values().iter().map(|(_, weight)| weight).sum()
    }
}

impl OpenWeights {
    /// The weights by dimension name, in scoring order.
    pub fn values(&self) -> [(&'static str, f64); 14] {
        [
            ("capacity", self.capacity),
            ("features", self.features),
            ("hybrid", self.hybrid),
            ("base_fee", self.base_fee),
            ("fee_rate", self.fee_rate),
            ("inbound_base_fee", self.inbound_base_fee),
            ("inbound_fee_rate", self.inbound_fee_rate),
            ("min_htlc", self.min_htlc),
            ("max_htlc", self.max_htlc),
            ("degree_centrality", self.degree_centrality),
            ("betweenness_centrality", self.betweenness_centrality),
            ("eigenvector_centrality", self.eigenvector_centrality),
            ("closeness_centrality", self.closeness_centrality),
            ("block_height", self.block_height),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.values().iter().map(|(_, weight)| weight).sum()
    }
}

impl Config {
    /// Loads the configuration from the given path, falling back to
    /// `~/hydrus.yml`. The `HYDRUS_CONFIG` environment variable is resolved
    /// by the CLI before this is called.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_path()?,
        };

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::ConfigInvalid(format!("reading {}: {e}", path.display())))?;

        let mut config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| Error::ConfigInvalid(format!("decoding configuration: {e}")))?;

        config.set_defaults();
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let agent = &self.agent;

        if agent.allocation_percent == 0 || agent.allocation_percent > 100 {
            return Err(Error::ConfigInvalid(format!(
                "invalid allocation percentage {}, it must be between 1 and 100",
                agent.allocation_percent
            )));
        }

        if agent.min_channel_size < 20_000 {
            return Err(Error::ConfigInvalid(
                "minimum channel size must be at least 20,000 satoshis".to_string(),
            ));
        }

        if agent.min_channel_size > agent.max_channel_size {
            return Err(Error::ConfigInvalid(
                "minimum channel size is higher than the maximum value".to_string(),
            ));
        }

        if agent.min_channels > agent.max_channels {
            return Err(Error::ConfigInvalid(
                "minimum number of channels is higher than the maximum value".to_string(),
            ));
        }

        if agent.channel_manager.min_conf < 1 {
            return Err(Error::ConfigInvalid(
                "channel manager minimum confirmations must be at least 1".to_string(),
            ));
        }

        if agent.target_conf < 2 {
            return Err(Error::ConfigInvalid(
                "target confirmations must be greater than 1".to_string(),
            ));
        }

        let weights = agent
            .heuristic_weights
            .open
            .values()
            .into_iter()
            .chain(agent.heuristic_weights.close.values());
        for (name, weight) in weights {
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::ConfigInvalid(format!(
                    "heuristic weight {name:?} must be between 0 and 1"
                )));
            }
        }

        if !self.lightning.rpc.tls_cert_path.is_file() {
            return Err(Error::ConfigInvalid(format!(
                "TLS certificate not found at {}",
                self.lightning.rpc.tls_cert_path.display()
            )));
        }

        if !self.lightning.rpc.macaroon_path.is_file() {
            return Err(Error::ConfigInvalid(format!(
                "macaroon not found at {}",
                self.lightning.rpc.macaroon_path.display()
            )));
        }

        Ok(())
    }

    fn set_defaults(&mut self) {
        let agent = &mut self.agent;

        if agent.allocation_percent == 0 {
            agent.allocation_percent = 60;
        }
        if agent.min_channels == 0 {
            agent.min_channels = 2;
        }
        if agent.max_channels == 0 {
            agent.max_channels = 200;
        }
        if agent.target_conf == 0 {
            agent.target_conf = 6;
        }
        if agent.min_channel_size == 0 {
            agent.min_channel_size = 1_000_000;
        }
        if agent.max_channel_size == 0 {
            agent.max_channel_size = 10_000_000;
        }

        let manager = &mut agent.channel_manager;
        if manager.min_conf == 0 {
            manager.min_conf = 2;
        }
        if manager.max_sat_vb == 0 {
            manager.max_sat_vb = 50;
        }
        if manager.fee_rate_ppm == 0 {
            manager.fee_rate_ppm = 100;
        }
        if manager.activity_period_days == 0 {
            manager.activity_period_days = 7;
        }

        if agent.heuristic_weights.open == OpenWeights::default() {
            agent.heuristic_weights.open = DEFAULT_OPEN_WEIGHTS;
        }
        if agent.heuristic_weights.close == CloseWeights::default() {
            agent.heuristic_weights.close = DEFAULT_CLOSE_WEIGHTS;
        }

        if self.lightning.rpc.timeout_secs == 0 {
            self.lightning.rpc.timeout_secs = 30;
        }

        if self.logging.level.is_empty() {
            self.logging.level = "info".to_string();
        }
    }

    /// Create a config with all defaults for testing purposes. The TLS and
    /// macaroon paths are set to the provided path (must exist for
    /// validation).
    #[cfg(test)]
    pub fn test_default(credentials_path: PathBuf) -> Self {
        let mut config = Config {
            lightning: Lightning {
                rpc: Rpc {
                    address: "https://localhost:10009".to_string(),
                    tls_cert_path: credentials_path.clone(),
                    macaroon_path: credentials_path,
                    timeout_secs: 0,
                },
            },
            agent: Agent::default(),
            logging: Logging::default(),
        };
        config.set_defaults();
        config
    }
}

impl Logging {
    /// Maps the configured level to the logging backend's filter.
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        match self.level.to_lowercase().as_str() {
            "disabled" => Ok(log::LevelFilter::Off),
            "fatal" | "error" => Ok(log::LevelFilter::Error),
            "warning" => Ok(log::LevelFilter::Warn),
            "info" => Ok(log::LevelFilter::Info),
            "debug" => Ok(log::LevelFilter::Debug),
            "trace" => Ok(log::LevelFilter::Trace),
            level => Err(Error::ConfigInvalid(format!(
                "logging level {level:?} not found"
            ))),
        }
    }
}

fn default_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .ok_or_else(|| Error::ConfigInvalid("cannot determine the home directory".to_string()))?;
    Ok(PathBuf::from(home).join("hydrus.yml"))
}
