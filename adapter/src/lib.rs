// lib.rs - Wallet and payment adapter for the Stellar network

pub mod api;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod fees;
pub mod gateway;
pub mod keys;
pub mod orchestrator;
pub mod registry;
pub mod sponsor;
pub mod validation;

// Re-export common types
pub use api::types::*;
pub use config::{AdapterConfig, Network};
pub use envelope::{Envelope, EnvelopeBuilder, EnvelopeSummary, FeeBumpConfig, OperationSummary};
pub use errors::{AdapterError, AdapterResult};
pub use events::{EventNormalizer, EventPayload, EventSink, EventType, LifecycleEvent, NoopSink};
pub use fees::{FeeOracle, BASE_FEE};
pub use gateway::types::{AccountState, FeeStats, LedgerTransaction, ResultCodes, SubmissionResult};
pub use gateway::{HorizonClient, LedgerRpc, NetworkGateway, RetryPolicy, RpcError};
pub use keys::{KeyManager, KeyPair};
pub use orchestrator::TransactionOrchestrator;
pub use registry::{TransactionStore, WalletRegistry};
pub use sponsor::{SponsorResolver, StaticSponsorResolver};
pub use validation::PaymentValidator;
