/// Network and client configuration
/// Resolves the Stellar network, RPC endpoint and polling behaviour from the environment
use crate::error::ConfigError;
use crate::keypair::Keypair;
use crate::transaction::sha256;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";
pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";
pub const FUTURENET_PASSPHRASE: &str = "Test SDF Future Network ; October 2022";
pub const STANDALONE_PASSPHRASE: &str = "Standalone Network ; February 2017";

pub const TESTNET_RPC: &str = "https://soroban-testnet.stellar.org";
pub const MAINNET_RPC: &str = "https://mainnet.stellar.validationcloud.io/v1/soroban/rpc";
pub const FUTURENET_RPC: &str = "https://rpc-futurenet.stellar.org";
pub const STANDALONE_RPC: &str = "http://localhost:8000/soroban/rpc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Futurenet,
    Standalone,
}

impl Network {
    pub fn passphrase(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_PASSPHRASE,
            Network::Testnet => TESTNET_PASSPHRASE,
            Network::Futurenet => FUTURENET_PASSPHRASE,
            Network::Standalone => STANDALONE_PASSPHRASE,
        }
    }

    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_RPC,
            Network::Testnet => TESTNET_RPC,
            Network::Futurenet => FUTURENET_RPC,
            Network::Standalone => STANDALONE_RPC,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Futurenet => write!(f, "futurenet"),
            Network::Standalone => write!(f, "standalone"),
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "public" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "futurenet" => Ok(Network::Futurenet),
            "standalone" | "local" => Ok(Network::Standalone),
            _ => Err(ConfigError::InvalidNetwork(format!(
                "{}. Allowed values: mainnet, testnet, futurenet, standalone",
                s
            ))),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network: Network,
    pub rpc_url: String,
    pub network_passphrase: String,
}

impl NetworkConfig {
    /// Defaults for a well-known network
    pub fn new(network: Network) -> Self {
        NetworkConfig {
            network,
            rpc_url: network.default_rpc_url().to_string(),
            network_passphrase: network.passphrase().to_string(),
        }
    }

    pub fn testnet() -> Self {
        Self::new(Network::Testnet)
    }

    pub fn mainnet() -> Self {
        Self::new(Network::Mainnet)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`NetworkConfig::from_env`] with an explicit variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let network = lookup("STELLAR_NETWORK")
            .unwrap_or_else(|| "testnet".to_string())
            .parse::<Network>()?;

        let rpc_url = lookup("STELLAR_RPC_URL")
            .unwrap_or_else(|| network.default_rpc_url().to_string());
        if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
            return Err(ConfigError::InvalidConfig(format!(
                "RPC URL must be http(s): {}",
                rpc_url
            )));
        }

        let network_passphrase = lookup("STELLAR_NETWORK_PASSPHRASE")
            .unwrap_or_else(|| network.passphrase().to_string());

        info!(
            network = %network,
            rpc_url = %rpc_url,
            "Network configuration loaded"
        );

        Ok(NetworkConfig {
            network,
            rpc_url,
            network_passphrase,
        })
    }

    /// SHA-256 of the passphrase, mixed into every signature payload
    pub fn network_id(&self) -> [u8; 32] {
        sha256(self.network_passphrase.as_bytes())
    }
}

/// Transaction status polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let interval_ms = lookup("SOROBAN_POLL_INTERVAL_MS")
            .unwrap_or_else(|| "1000".to_string())
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidConfig(format!("Invalid poll interval: {}", e)))?;

        // 10ms to 1 minute
        if !(10..=60_000).contains(&interval_ms) {
            return Err(ConfigError::InvalidConfig(
                "Poll interval must be between 10 and 60000 milliseconds".to_string(),
            ));
        }

        let timeout_secs = lookup("SOROBAN_TX_TIMEOUT_SECS")
            .unwrap_or_else(|| "300".to_string())
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidConfig(format!("Invalid transaction timeout: {}", e))
            })?;

        if !(1..=3600).contains(&timeout_secs) {
            return Err(ConfigError::InvalidConfig(
                "Transaction timeout must be between 1 and 3600 seconds".to_string(),
            ));
        }

        Ok(PollConfig {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Identity, network and target contract shared by every call a client makes
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Invoking account (G...)
    pub source_account: String,
    /// Secret for the invoking account; read-only use needs none
    pub signer: Option<Keypair>,
    /// Target contract (C...)
    pub contract_id: String,
    pub network: NetworkConfig,
    pub poll: PollConfig,
}

impl ClientOptions {
    pub fn new(source_account: impl Into<String>, contract_id: impl Into<String>) -> Self {
        ClientOptions {
            source_account: source_account.into(),
            signer: None,
            contract_id: contract_id.into(),
            network: NetworkConfig::testnet(),
            poll: PollConfig::default(),
        }
    }

    /// Options whose source account is the signer's own
    pub fn with_signer(signer: Keypair, contract_id: impl Into<String>) -> Self {
        let mut options = Self::new(signer.account_id(), contract_id);
        options.signer = Some(signer);
        options
    }

    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Per-call defaults with the configured transaction timeout
    pub fn method_options(&self) -> MethodOptions {
        MethodOptions {
            timeout_secs: self.poll.timeout.as_secs(),
            ..MethodOptions::default()
        }
    }
}

/// Per-call knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodOptions {
    /// Inclusion fee in stroops; the simulated resource fee is added on top
    pub fee: u32,
    /// Upper time bound of the transaction and polling deadline
    pub timeout_secs: u64,
    pub simulate: bool,
    /// Restore archived state automatically when simulation asks for it
    pub restore: bool,
    /// Sign read calls and transactions with unsigned auth entries anyway
    pub force: bool,
}

impl Default for MethodOptions {
    fn default() -> Self {
        MethodOptions {
            fee: 100,
            timeout_secs: 300,
            simulate: true,
            restore: true,
            force: false,
        }
    }
}
