use std::collections::HashMap;

use secrecy::SecretString;

use crate::config::{AdapterConfig, Network};

/// Supplies the default fee-bump sponsor secret for a network.
pub trait SponsorResolver: Send + Sync {
    fn sponsor_secret(&self, network: Network) -> Option<SecretString>;
}

/// Fixed per-network sponsor secrets, usually taken from [`AdapterConfig`].
#[derive(Debug, Clone, Default)]
pub struct StaticSponsorResolver {
    secrets: HashMap<Network, SecretString>,
}

impl StaticSponsorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self {
            secrets: config.sponsor_secrets().clone(),
        }
    }

    pub fn with_secret(mut self, network: Network, secret: SecretString) -> Self {
        self.secrets.insert(network, secret);
        self
    }
}

impl SponsorResolver for StaticSponsorResolver {
    fn sponsor_secret(&self, network: Network) -> Option<SecretString> {
        self.secrets.get(&network).cloned()
    }
}
