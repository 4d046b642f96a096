#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::SecretString;

use stellar_wallet_adapter::gateway::types::{FeeDistribution, LedgerTransaction};
use stellar_wallet_adapter::{
    AccountState, Envelope, EnvelopeBuilder, EventSink, EventType, FeeStats, KeyManager,
    LedgerRpc, LifecycleEvent, Network, NetworkGateway, PaymentRequest, ResultCodes,
    RetryPolicy, RpcError, StaticSponsorResolver, SubmissionResult, TransactionOrchestrator,
};

pub const SENDER_SECRET: &str = "SBZVMB74Z76QZ3ZOY7UTDFYKMEGKW5XFJEB6PFKBF4UYSSWHG4EDH7PY";
pub const SENDER: &str = "GB7BDSZU2Y27LYNLALKKALB52WS2IZWYBDGY6EQBLEED3TJOCVMZRH7H";
pub const SPONSOR_SECRET: &str = "SABAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAFNE7";
pub const SPONSOR: &str = "GCATS5YOVB6ROX2WUNKGNQ2MP3GMXDMKSG2O4N5CLX3A6W4PZGZZI55U";
pub const DESTINATION: &str = "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7";

/// Scripted response for one submission attempt.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Included and successful.
    Accept,
    /// Included in a ledger but failed.
    FailInLedger,
    Error(RpcError),
}

impl SubmitOutcome {
    pub fn status(status: u16) -> Self {
        SubmitOutcome::Error(RpcError::Status {
            status,
            message: format!("HTTP {}", status),
            result_codes: None,
        })
    }

    pub fn rejected(code: &str) -> Self {
        SubmitOutcome::Error(RpcError::Status {
            status: 400,
            message: "Transaction Failed".to_string(),
            result_codes: Some(ResultCodes {
                transaction: Some(code.to_string()),
                operations: Vec::new(),
            }),
        })
    }
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<String, i64>,
    outcomes: VecDeque<SubmitOutcome>,
    submitted: Vec<String>,
    transactions: HashMap<String, LedgerTransaction>,
    fee_mode: Option<u64>,
    ledger: u32,
}

/// In-memory ledger that enforces sequence numbers like the real network.
pub struct ScriptedRpc {
    network: Network,
    state: Mutex<LedgerState>,
}

impl ScriptedRpc {
    pub fn new(network: Network) -> Arc<Self> {
        Arc::new(Self {
            network,
            state: Mutex::new(LedgerState {
                fee_mode: Some(100),
                ledger: 1000,
                ..LedgerState::default()
            }),
        })
    }

    pub fn fund(&self, address: &str, sequence: i64) {
        self.state.lock().accounts.insert(address.to_string(), sequence);
    }

    pub fn sequence(&self, address: &str) -> Option<i64> {
        self.state.lock().accounts.get(address).copied()
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = SubmitOutcome>) {
        self.state.lock().outcomes.extend(outcomes);
    }

    pub fn set_fee_mode(&self, mode: Option<u64>) {
        self.state.lock().fee_mode = mode;
    }

    pub fn put_transaction(&self, transaction: LedgerTransaction) {
        self.state
            .lock()
            .transactions
            .insert(transaction.hash.clone(), transaction);
    }

    /// Every envelope posted, including failed attempts.
    pub fn submitted(&self) -> Vec<Envelope> {
        self.state
            .lock()
            .submitted
            .iter()
            .map(|xdr| Envelope::from_base64(xdr, self.network).unwrap())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().submitted.len()
    }

    fn include(
        &self,
        state: &mut LedgerState,
        envelope_xdr: &str,
        successful: bool,
    ) -> Result<SubmissionResult, RpcError> {
        let envelope = Envelope::from_base64(envelope_xdr, self.network)
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        let source = envelope.source_account();

        let current = match state.accounts.get(&source) {
            Some(sequence) => *sequence,
            None => return Err(bad_request("tx_no_source_account")),
        };
        if envelope.sequence() != current + 1 {
            return Err(bad_request("tx_bad_seq"));
        }
        state.accounts.insert(source.clone(), envelope.sequence());
        state.ledger += 1;

        let hash = envelope.hash_hex().map_err(|e| RpcError::Decode(e.to_string()))?;
        state.transactions.insert(
            hash.clone(),
            LedgerTransaction {
                hash: hash.clone(),
                ledger: Some(state.ledger),
                successful: Some(successful),
                source_account: Some(source),
                envelope_xdr: envelope_xdr.to_string(),
                result_xdr: None,
                fee_charged: Some(envelope.fee() as u64),
                max_fee: Some(envelope.fee() as u64),
                created_at: Some("2024-05-01T12:00:00Z".to_string()),
            },
        );

        Ok(SubmissionResult {
            hash,
            ledger: state.ledger,
            successful,
            result_xdr: None,
            envelope_xdr: Some(envelope_xdr.to_string()),
        })
    }
}

fn bad_request(code: &str) -> RpcError {
    RpcError::Status {
        status: 400,
        message: "Transaction Failed".to_string(),
        result_codes: Some(ResultCodes {
            transaction: Some(code.to_string()),
            operations: Vec::new(),
        }),
    }
}

fn not_found() -> RpcError {
    RpcError::Status {
        status: 404,
        message: "Resource Missing".to_string(),
        result_codes: None,
    }
}

#[async_trait]
impl LedgerRpc for ScriptedRpc {
    async fn get_account(&self, address: &str) -> Result<AccountState, RpcError> {
        let state = self.state.lock();
        match state.accounts.get(address) {
            Some(sequence) => Ok(AccountState {
                address: address.to_string(),
                sequence: *sequence,
                balances: Vec::new(),
            }),
            None => Err(not_found()),
        }
    }

    async fn post_transaction(&self, envelope_xdr: &str) -> Result<SubmissionResult, RpcError> {
        let mut state = self.state.lock();
        state.submitted.push(envelope_xdr.to_string());
        match state.outcomes.pop_front().unwrap_or(SubmitOutcome::Accept) {
            SubmitOutcome::Accept => self.include(&mut state, envelope_xdr, true),
            SubmitOutcome::FailInLedger => self.include(&mut state, envelope_xdr, false),
            SubmitOutcome::Error(err) => Err(err),
        }
    }

    async fn get_transaction(&self, hash: &str) -> Result<LedgerTransaction, RpcError> {
        self.state
            .lock()
            .transactions
            .get(hash)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn get_fee_stats(&self) -> Result<FeeStats, RpcError> {
        match self.state.lock().fee_mode {
            Some(mode) => Ok(FeeStats {
                last_ledger_base_fee: Some(100),
                fee_charged: Some(FeeDistribution {
                    mode,
                    ..FeeDistribution::default()
                }),
            }),
            None => Err(RpcError::Status {
                status: 503,
                message: "fee stats unavailable".to_string(),
                result_codes: None,
            }),
        }
    }

    async fn latest_ledger(&self) -> Result<u32, RpcError> {
        Ok(self.state.lock().ledger)
    }
}

/// Collects every emitted event in order.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn types(&self) -> Vec<EventType> {
        self.events.lock().iter().map(|e| e.event_type).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

/// Every posted attempt carried the same signed envelope with the given hash.
pub fn assert_same_envelope_resent(rpc: &ScriptedRpc, hash: &str) {
    let submitted = rpc.submitted();
    let first = submitted.first().expect("at least one submission");
    let first_xdr = first.to_base64().unwrap();
    for envelope in &submitted {
        assert_eq!(envelope.to_base64().unwrap(), first_xdr);
        assert_eq!(envelope.hash_hex().unwrap(), hash);
        assert_eq!(envelope.fee(), first.fee());
        assert_eq!(envelope.sequence(), first.sequence());
    }
}

pub fn gateway(rpc: &Arc<ScriptedRpc>, max_retries: u32) -> NetworkGateway {
    NetworkGateway::new(rpc.clone(), RetryPolicy::no_backoff(max_retries))
}

pub fn orchestrator(
    rpc: &Arc<ScriptedRpc>,
    sponsor_secret: Option<&str>,
    sink: &RecordingSink,
) -> TransactionOrchestrator {
    let mut sponsors = StaticSponsorResolver::new();
    if let Some(secret) = sponsor_secret {
        sponsors = sponsors.with_secret(Network::Testnet, SecretString::from(secret));
    }
    TransactionOrchestrator::new(
        Network::Testnet,
        gateway(rpc, 2),
        Arc::new(sponsors),
        Arc::new(sink.clone()),
    )
    .unwrap()
}

/// Signed payment envelope from [`SENDER`] that was never confirmed.
pub fn stuck_payment(rpc: &Arc<ScriptedRpc>, sequence: i64, fee: u32) -> Envelope {
    let account = AccountState {
        address: SENDER.to_string(),
        sequence,
        balances: Vec::new(),
    };
    let envelope = EnvelopeBuilder::new(Network::Testnet)
        .build_payment(
            &PaymentRequest::native(SENDER, DESTINATION, "10"),
            &account,
            fee,
        )
        .unwrap();
    let envelope = KeyManager::new()
        .sign(envelope, &SecretString::from(SENDER_SECRET))
        .unwrap();

    rpc.put_transaction(LedgerTransaction {
        hash: envelope.hash_hex().unwrap(),
        ledger: None,
        successful: None,
        source_account: Some(SENDER.to_string()),
        envelope_xdr: envelope.to_base64().unwrap(),
        result_xdr: None,
        fee_charged: None,
        max_fee: Some(u64::from(fee)),
        created_at: None,
    });
    envelope
}
