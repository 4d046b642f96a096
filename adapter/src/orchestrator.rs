use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::api::types::{
    FeeBumpRequest, PaymentRequest, TransactionRecord, TransactionStatus, Wallet,
};
use crate::config::{AdapterConfig, Network};
use crate::envelope::{format_amount, parse_amount, Envelope, EnvelopeBuilder, FeeBumpConfig};
use crate::errors::{AdapterError, AdapterResult};
use crate::events::{EventNormalizer, EventSink};
use crate::fees::FeeOracle;
use crate::gateway::types::LedgerTransaction;
use crate::gateway::NetworkGateway;
use crate::keys::{KeyManager, KeyPair};
use crate::registry::{TransactionStore, WalletRegistry};
use crate::sponsor::{SponsorResolver, StaticSponsorResolver};
use crate::validation::PaymentValidator;

/// One async mutex per source address; held from account load through submission.
/// An entry lives only while some task holds or waits on it.
#[derive(Default)]
struct AddressLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AddressLocks {
    async fn acquire(&self, address: &str) -> AddressGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.entry(address.to_string()).or_default().clone()
        };
        AddressGuard {
            locks: self,
            address: address.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

struct AddressGuard<'a> {
    locks: &'a AddressLocks,
    address: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AddressGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // waiters clone the Arc under the table lock, so a count of one is stable here
        let mut locks = self.locks.locks.lock();
        if locks
            .get(&self.address)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.address);
        }
    }
}

/// Drives wallets and transactions through their lifecycle.
///
/// Operations on the same source address are serialized so that every
/// envelope is built from a fresh sequence number; different addresses
/// proceed independently.
pub struct TransactionOrchestrator {
    network: Network,
    keys: KeyManager,
    fees: FeeOracle,
    builder: EnvelopeBuilder,
    gateway: NetworkGateway,
    wallets: WalletRegistry,
    transactions: TransactionStore,
    sponsors: Arc<dyn SponsorResolver>,
    sink: Arc<dyn EventSink>,
    events: EventNormalizer,
    locks: AddressLocks,
    validator: PaymentValidator,
}

impl TransactionOrchestrator {
    pub fn new(
        network: Network,
        gateway: NetworkGateway,
        sponsors: Arc<dyn SponsorResolver>,
        sink: Arc<dyn EventSink>,
    ) -> AdapterResult<Self> {
        Ok(Self {
            network,
            keys: KeyManager::new(),
            fees: FeeOracle::new(gateway.clone()),
            builder: EnvelopeBuilder::new(network),
            gateway,
            wallets: WalletRegistry::new(),
            transactions: TransactionStore::new(),
            sponsors,
            sink,
            events: EventNormalizer,
            locks: AddressLocks::default(),
            validator: PaymentValidator::new()?,
        })
    }

    /// Orchestrator talking to the configured Horizon endpoint.
    pub fn from_config(config: &AdapterConfig, sink: Arc<dyn EventSink>) -> AdapterResult<Self> {
        let gateway = NetworkGateway::horizon(config)?;
        log::info!(
            "Stellar adapter targeting {} via {}",
            config.network,
            config.horizon_url()
        );
        Self::new(
            config.network,
            gateway,
            Arc::new(StaticSponsorResolver::from_config(config)),
            sink,
        )
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn gateway(&self) -> &NetworkGateway {
        &self.gateway
    }

    pub fn builder(&self) -> &EnvelopeBuilder {
        &self.builder
    }

    pub fn fee_oracle(&self) -> &FeeOracle {
        &self.fees
    }

    pub fn create_wallet(&self) -> Wallet {
        let keypair = self.keys.generate();
        self.register(keypair)
    }

    /// Register a wallet from an existing secret. Importing an address that
    /// is already registered returns the existing wallet.
    pub fn import_wallet(&self, secret: &SecretString) -> AdapterResult<Wallet> {
        let keypair = self.keys.load(secret)?;
        Ok(self.register(keypair))
    }

    pub fn get_wallet(&self, address: &str) -> AdapterResult<Wallet> {
        self.wallets
            .get(address)
            .ok_or_else(|| AdapterError::WalletNotFound(address.to_string()))
    }

    /// Key pair of a registered wallet, including its secret.
    pub fn export_keypair(&self, address: &str) -> AdapterResult<KeyPair> {
        self.wallets
            .keypair(address)
            .ok_or_else(|| AdapterError::WalletNotFound(address.to_string()))
    }

    /// Public address of the default fee-bump sponsor, if one is configured.
    pub fn sponsor_address(&self) -> AdapterResult<Option<String>> {
        self.sponsors
            .sponsor_secret(self.network)
            .map(|secret| self.keys.derive_public(&secret))
            .transpose()
    }

    fn register(&self, keypair: KeyPair) -> Wallet {
        let wallet = Wallet::new(keypair.public_key().to_string(), self.network);
        let (wallet, inserted) = self.wallets.insert_if_absent(wallet, keypair);
        if inserted {
            log::info!("Registered wallet {} ({})", wallet.id, wallet.address);
            self.sink.emit(self.events.wallet_created(&wallet));
        } else {
            log::debug!("Wallet {} already registered", wallet.address);
        }
        wallet
    }

    /// Build, sign and submit a single payment from a registered wallet.
    pub async fn send(&self, request: PaymentRequest) -> AdapterResult<TransactionRecord> {
        self.validator.validate_payment(&request)?;
        let keypair = self.export_keypair(&request.from)?;

        let _guard = self.locks.acquire(&request.from).await;

        let account = self.gateway.load_account(&request.from).await?;
        let fee = self.fees.estimate(1).await?;
        let envelope = self.builder.build_payment(&request, &account, fee)?;
        let envelope = self.keys.sign(envelope, keypair.secret_key())?;

        let record = TransactionRecord::pending(
            envelope.hash_hex()?,
            request.from.clone(),
            Some(request.to.clone()),
            Some(format_amount(parse_amount(&request.amount)?)),
            Some(request.asset_or_native().to_string()),
            fee.to_string(),
        );
        self.submit_tracked(envelope, record).await
    }

    /// Wrap a previously submitted transaction in a sponsor-paid fee bump.
    ///
    /// `max_fee` is a per-operation rate; the bump pays it for every inner
    /// operation plus one.
    /// The original's record is left untouched; the bump gets its own record.
    pub async fn fee_bump(&self, request: FeeBumpRequest) -> AdapterResult<TransactionRecord> {
        let max_fee = parse_max_fee(&request.max_fee)?;
        self.validator
            .validate_transaction_hash(&request.original_hash)?;

        let original = self.gateway.get_transaction(&request.original_hash).await?;
        if original.successful == Some(true) {
            return Err(AdapterError::AlreadyConfirmed(request.original_hash));
        }
        let inner = Envelope::from_base64(&original.envelope_xdr, self.network)?;
        let source = inner.source_account();

        let _guard = self.locks.acquire(&source).await;

        let sponsor_secret = match request.sponsor_secret {
            Some(secret) => secret,
            None => self
                .sponsors
                .sponsor_secret(self.network)
                .ok_or(AdapterError::SponsorNotConfigured(self.network))?,
        };
        let sponsor = self.keys.derive_public(&sponsor_secret)?;

        let envelope = self.builder.build_fee_bump(
            &original.envelope_xdr,
            &FeeBumpConfig { max_fee },
            &sponsor,
        )?;
        let envelope = self.keys.sign(envelope, &sponsor_secret)?;

        let (to, amount, asset) = match inner.single_payment() {
            Some((to, amount, asset)) => (Some(to), Some(amount), Some(asset)),
            None => (None, None, None),
        };
        let total_fee = envelope.fee();
        let record = TransactionRecord::pending(
            envelope.hash_hex()?,
            source,
            to,
            amount,
            asset,
            total_fee.to_string(),
        );
        log::info!(
            "Fee-bumping {} at {} per operation ({} total) paid by {}",
            request.original_hash,
            max_fee,
            total_fee,
            sponsor
        );
        self.submit_tracked(envelope, record).await
    }

    /// Record for `hash`: the local one when this adapter submitted it,
    /// otherwise one reconstructed from the ledger.
    pub async fn get_transaction(&self, hash: &str) -> AdapterResult<TransactionRecord> {
        if let Some(record) = self.transactions.get_by_hash(hash) {
            return Ok(record);
        }
        self.validator.validate_transaction_hash(hash)?;
        let transaction = self.gateway.get_transaction(hash).await?;
        self.record_from_ledger(transaction)
    }

    async fn submit_tracked(
        &self,
        envelope: Envelope,
        mut record: TransactionRecord,
    ) -> AdapterResult<TransactionRecord> {
        self.transactions.upsert(&record);
        log::info!(
            "Transaction {} pending ({}, fee {})",
            record.id,
            record.hash,
            record.fee
        );
        self.sink.emit(self.events.transaction_pending(&record));

        let outcome = if envelope.is_fee_bump() {
            self.gateway.submit_fee_bump(&envelope).await
        } else {
            self.gateway.submit(&envelope).await
        };

        match outcome {
            Ok(result) => {
                if result.hash != record.hash {
                    log::warn!(
                        "Network reported hash {} for transaction {} ({})",
                        result.hash,
                        record.id,
                        record.hash
                    );
                }
                if result.successful {
                    record.mark_success(result.ledger)?;
                } else {
                    record.mark_failed(Some(result.ledger))?;
                }
                self.transactions.upsert(&record);
                self.sink
                    .emit(self.events.for_outcome(&record, result.successful));

                if result.successful {
                    log::info!(
                        "Transaction {} confirmed in ledger {}",
                        record.id,
                        result.ledger
                    );
                    Ok(record)
                } else {
                    log::warn!(
                        "Transaction {} failed in ledger {}",
                        record.id,
                        result.ledger
                    );
                    let err = AdapterError::SubmissionRejected {
                        status: None,
                        result_codes: None,
                        message: format!(
                            "Transaction included in ledger {} but failed",
                            result.ledger
                        ),
                    };
                    Err(err.with_record(record))
                }
            }
            Err(err) => {
                record.mark_failed(None)?;
                self.transactions.upsert(&record);
                log::warn!("Transaction {} failed: {}", record.id, err);
                self.sink.emit(self.events.transaction_failed(&record));
                Err(err.with_record(record))
            }
        }
    }

    fn record_from_ledger(&self, transaction: LedgerTransaction) -> AdapterResult<TransactionRecord> {
        let envelope = Envelope::from_base64(&transaction.envelope_xdr, self.network)?;
        let status = match transaction.successful {
            Some(true) => TransactionStatus::Success,
            Some(false) => TransactionStatus::Failed,
            None => TransactionStatus::Pending,
        };
        let created_at = transaction
            .created_at
            .as_deref()
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let fee = transaction
            .fee_charged
            .or(transaction.max_fee)
            .map(|fee| fee.to_string())
            .unwrap_or_else(|| envelope.fee().to_string());
        let (to, amount, asset) = match envelope.single_payment() {
            Some((to, amount, asset)) => (Some(to), Some(amount), Some(asset)),
            None => (None, None, None),
        };

        Ok(TransactionRecord {
            id: format!("tx_{}", transaction.hash),
            hash: transaction.hash,
            status,
            from: envelope.source_account(),
            to,
            amount,
            asset,
            fee,
            created_at,
            confirmed_at: status.is_terminal().then_some(created_at),
            ledger: transaction.ledger,
        })
    }
}

fn parse_max_fee(value: &str) -> AdapterResult<i64> {
    match value.trim().parse::<i64>() {
        Ok(fee) if fee > 0 => Ok(fee),
        _ => Err(AdapterError::InvalidArgument(format!(
            "Max fee must be a positive integer number of stroops, got '{}'",
            value
        ))),
    }
}
