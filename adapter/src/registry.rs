//! In-memory stores owned by the orchestrator.
//!
//! Nothing here is persisted: wallets and their key material live only for
//! the lifetime of the process.
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::types::{TransactionRecord, Wallet};
use crate::keys::KeyPair;

#[derive(Debug, Clone)]
pub struct WalletEntry {
    pub wallet: Wallet,
    pub keypair: KeyPair,
}

/// Address -> (wallet, key pair).
#[derive(Debug, Clone, Default)]
pub struct WalletRegistry {
    entries: Arc<RwLock<HashMap<String, WalletEntry>>>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the address is already registered; returns the stored wallet.
    pub fn insert_if_absent(&self, wallet: Wallet, keypair: KeyPair) -> (Wallet, bool) {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&wallet.address) {
            return (existing.wallet.clone(), false);
        }
        entries.insert(
            wallet.address.clone(),
            WalletEntry {
                wallet: wallet.clone(),
                keypair,
            },
        );
        (wallet, true)
    }

    pub fn get(&self, address: &str) -> Option<Wallet> {
        self.entries
            .read()
            .get(address)
            .map(|entry| entry.wallet.clone())
    }

    pub fn keypair(&self, address: &str) -> Option<KeyPair> {
        self.entries
            .read()
            .get(address)
            .map(|entry| entry.keypair.clone())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.read().contains_key(address)
    }

    pub fn remove(&self, address: &str) -> Option<WalletEntry> {
        self.entries.write().remove(address)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<String, TransactionRecord>,
    by_hash: HashMap<String, String>,
}

/// Transaction records by id, indexed by hash. Records are never dropped.
#[derive(Debug, Clone, Default)]
pub struct TransactionStore {
    state: Arc<RwLock<StoreState>>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record with the same id.
    pub fn upsert(&self, record: &TransactionRecord) {
        let mut state = self.state.write();
        state
            .by_hash
            .insert(record.hash.clone(), record.id.clone());
        state.records.insert(record.id.clone(), record.clone());
    }

    pub fn get(&self, id: &str) -> Option<TransactionRecord> {
        self.state.read().records.get(id).cloned()
    }

    /// Latest record submitted under `hash`.
    pub fn get_by_hash(&self, hash: &str) -> Option<TransactionRecord> {
        let state = self.state.read();
        state
            .by_hash
            .get(hash)
            .and_then(|id| state.records.get(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }
}
