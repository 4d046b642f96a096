use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::OnceCell;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::{AdapterError, AdapterResult};
use crate::gateway::RetryPolicy;

const ENV_NETWORK: &str = "STELLAR_NETWORK";
const ENV_HORIZON_URL: &str = "HORIZON_URL";
const ENV_MAX_RETRIES: &str = "STELLAR_MAX_RETRIES";
const ENV_REQUEST_TIMEOUT: &str = "STELLAR_REQUEST_TIMEOUT_SECS";
const ENV_SPONSOR_PREFIX: &str = "STELLAR_FOUNDATION_SPONSOR_SECRET_";
const ENV_SPONSOR_LEGACY: &str = "STELLAR_FOUNDATION_SPONSOR_SECRET_KEY";

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Stellar networks the adapter can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Futurenet,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Testnet, Network::Futurenet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Futurenet => "futurenet",
        }
    }

    /// Passphrase hashed into every transaction signature payload.
    pub fn passphrase(&self) -> &'static str {
        match self {
            Network::Mainnet => "Public Global Stellar Network ; September 2015",
            Network::Testnet => "Test SDF Network ; September 2015",
            Network::Futurenet => "Test SDF Future Network ; October 2022",
        }
    }

    pub fn default_horizon_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://horizon.stellar.org",
            Network::Testnet => "https://horizon-testnet.stellar.org",
            Network::Futurenet => "https://horizon-futurenet.stellar.org",
        }
    }

    fn env_suffix(&self) -> &'static str {
        match self {
            Network::Mainnet => "MAINNET",
            Network::Testnet => "TESTNET",
            Network::Futurenet => "FUTURENET",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = AdapterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "public" | "pubnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "futurenet" => Ok(Network::Futurenet),
            other => Err(AdapterError::Config(format!("Unknown network '{}'", other))),
        }
    }
}

/// Immutable adapter configuration handed to the orchestrator at construction.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub network: Network,
    pub horizon_url: Option<String>,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    sponsor_secrets: HashMap<Network, SecretString>,
}

impl AdapterConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            horizon_url: None,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            sponsor_secrets: HashMap::new(),
        }
    }

    /// Defaults overridden by process environment variables.
    pub fn from_env() -> AdapterResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults, then the JSON file at `path`, then process environment variables.
    pub fn load(path: impl AsRef<Path>) -> AdapterResult<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> AdapterResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            AdapterError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file: ConfigFile = serde_json::from_slice(&bytes).map_err(|e| {
            AdapterError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        file.into_config()
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AdapterResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| -> Option<String> {
            let value = lookup(key)?;
            if value.trim().is_empty() {
                log::warn!("Environment variable {} is empty", key);
                return None;
            }
            if value.chars().any(|c| c.is_control()) {
                log::warn!(
                    "Environment variable {} contains control characters, ignoring",
                    key
                );
                return None;
            }
            Some(value.trim().to_string())
        };

        if let Some(network) = read(ENV_NETWORK) {
            self.network = network.parse()?;
        }
        if let Some(url) = read(ENV_HORIZON_URL) {
            self.horizon_url = Some(url);
        }
        if let Some(retries) = read(ENV_MAX_RETRIES) {
            self.max_retries = parse_number(&retries, ENV_MAX_RETRIES)?;
        }
        if let Some(timeout) = read(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = parse_number(&timeout, ENV_REQUEST_TIMEOUT)?;
        }

        for network in Network::ALL {
            let key = format!("{}{}", ENV_SPONSOR_PREFIX, network.env_suffix());
            if let Some(secret) = read(&key) {
                self.sponsor_secrets
                    .insert(network, SecretString::from(secret));
                log::debug!("Loaded sponsor secret for {} from {}", network, key);
            }
        }

        // The unscoped key only ever applies to the selected network.
        if !self.sponsor_secrets.contains_key(&self.network) {
            if let Some(secret) = read(ENV_SPONSOR_LEGACY) {
                self.sponsor_secrets
                    .insert(self.network, SecretString::from(secret));
            }
        }

        Ok(())
    }

    pub fn with_horizon_url(mut self, url: impl Into<String>) -> Self {
        self.horizon_url = Some(url.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_sponsor_secret(mut self, network: Network, secret: SecretString) -> Self {
        self.sponsor_secrets.insert(network, secret);
        self
    }

    pub fn horizon_url(&self) -> &str {
        self.horizon_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_horizon_url())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }

    pub fn sponsor_secret(&self, network: Network) -> Option<&SecretString> {
        self.sponsor_secrets.get(&network)
    }

    pub fn sponsor_secrets(&self) -> &HashMap<Network, SecretString> {
        &self.sponsor_secrets
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new(Network::Testnet)
    }
}

/// On-disk shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    network: Option<String>,
    horizon_url: Option<String>,
    max_retries: Option<u32>,
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    sponsor_secrets: HashMap<String, String>,
}

impl ConfigFile {
    fn into_config(self) -> AdapterResult<AdapterConfig> {
        let network = match self.network {
            Some(name) => name.parse()?,
            None => Network::Testnet,
        };

        let mut config = AdapterConfig::new(network);
        config.horizon_url = self.horizon_url;
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(timeout) = self.request_timeout_secs {
            config.request_timeout_secs = timeout;
        }
        for (name, secret) in self.sponsor_secrets {
            let network: Network = name.parse()?;
            config
                .sponsor_secrets
                .insert(network, SecretString::from(secret));
        }
        Ok(config)
    }
}

static ADAPTER_CONFIG: OnceCell<AdapterConfig> = OnceCell::new();

/// Initialize the process-wide configuration from defaults and the environment.
/// Later calls return the configuration from the first successful call.
pub fn init_config_from_env() -> AdapterResult<&'static AdapterConfig> {
    ADAPTER_CONFIG.get_or_try_init(|| {
        let config = AdapterConfig::from_env()?;
        log::info!(
            "Adapter configuration initialized for {} ({})",
            config.network,
            config.horizon_url()
        );
        Ok(config)
    })
}

pub fn global_config() -> AdapterResult<&'static AdapterConfig> {
    ADAPTER_CONFIG
        .get()
        .ok_or_else(|| AdapterError::Config("Adapter configuration not initialized".to_string()))
}

fn parse_number<T: FromStr>(value: &str, key: &str) -> AdapterResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        AdapterError::Config(format!(
            "Invalid numeric value '{}' for key '{}'",
            value, key
        ))
    })
}
