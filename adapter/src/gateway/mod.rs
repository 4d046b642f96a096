pub mod horizon;
pub mod types;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AdapterConfig;
use crate::envelope::Envelope;
use crate::errors::{AdapterError, AdapterResult};

pub use horizon::HorizonClient;
use types::{AccountState, FeeStats, LedgerTransaction, ResultCodes, SubmissionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    Connect,
    Other,
}

/// Failure reported by a ledger RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The endpoint answered with a non-success HTTP status.
    Status {
        status: u16,
        message: String,
        result_codes: Option<ResultCodes>,
    },
    /// The request never produced an HTTP response.
    Transport {
        kind: TransportFailure,
        message: String,
    },
    /// The endpoint answered but the body could not be understood.
    Decode(String),
}

impl RpcError {
    /// Server-side faults and transport failures may succeed on resubmission.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Status { status, .. } => *status >= 500,
            RpcError::Transport { .. } => true,
            RpcError::Decode(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RpcError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RpcError::Status {
                status, message, ..
            } => write!(f, "HTTP {}: {}", status, message),
            RpcError::Transport { kind, message } => write!(f, "{:?}: {}", kind, message),
            RpcError::Decode(msg) => write!(f, "Malformed response: {}", msg),
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return RpcError::Status {
                status: status.as_u16(),
                message: error.to_string(),
                result_codes: None,
            };
        }
        if error.is_decode() {
            return RpcError::Decode(error.to_string());
        }
        let kind = if error.is_timeout() {
            TransportFailure::Timeout
        } else if error.is_connect() {
            TransportFailure::Connect
        } else {
            TransportFailure::Other
        };
        RpcError::Transport {
            kind,
            message: error.to_string(),
        }
    }
}

/// Raw ledger endpoint. Envelopes cross this boundary base64-encoded.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_account(&self, address: &str) -> Result<AccountState, RpcError>;

    async fn post_transaction(&self, envelope_xdr: &str) -> Result<SubmissionResult, RpcError>;

    async fn get_transaction(&self, hash: &str) -> Result<LedgerTransaction, RpcError>;

    async fn get_fee_stats(&self) -> Result<FeeStats, RpcError>;

    async fn latest_ledger(&self) -> Result<u32, RpcError>;
}

/// Retry behaviour for submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_step: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn no_backoff(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_step: Duration::ZERO,
        }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/// Submits envelopes and queries ledger state through a [`LedgerRpc`].
#[derive(Clone)]
pub struct NetworkGateway {
    rpc: Arc<dyn LedgerRpc>,
    retry: RetryPolicy,
}

impl NetworkGateway {
    pub fn new(rpc: Arc<dyn LedgerRpc>, retry: RetryPolicy) -> Self {
        Self { rpc, retry }
    }

    /// Gateway over the configured Horizon endpoint.
    pub fn horizon(config: &AdapterConfig) -> AdapterResult<Self> {
        let client = HorizonClient::new(config.horizon_url(), config.request_timeout())?;
        Ok(Self::new(Arc::new(client), config.retry_policy()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn load_account(&self, address: &str) -> AdapterResult<AccountState> {
        match self.rpc.get_account(address).await {
            Ok(account) => Ok(account),
            Err(RpcError::Status { status: 404, .. }) => {
                Err(AdapterError::AccountNotFound(address.to_string()))
            }
            Err(err) => Err(AdapterError::NetworkQueryFailed(format!(
                "Failed to load account {}: {}",
                address, err
            ))),
        }
    }

    pub async fn account_exists(&self, address: &str) -> AdapterResult<bool> {
        match self.load_account(address).await {
            Ok(_) => Ok(true),
            Err(AdapterError::AccountNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Submit a signed envelope, retrying transient failures per the retry policy.
    pub async fn submit(&self, envelope: &Envelope) -> AdapterResult<SubmissionResult> {
        let encoded = envelope.to_base64()?;
        let rpc = self.rpc.clone();
        retry_with_backoff(self.retry, || {
            let rpc = rpc.clone();
            let encoded = encoded.clone();
            async move { rpc.post_transaction(&encoded).await }
        })
        .await
        .map_err(submission_error)
    }

    pub async fn submit_fee_bump(&self, envelope: &Envelope) -> AdapterResult<SubmissionResult> {
        if !envelope.is_fee_bump() {
            return Err(AdapterError::InvalidArgument(
                "Envelope is not a fee-bump transaction".to_string(),
            ));
        }
        self.submit(envelope).await
    }

    pub async fn get_transaction(&self, hash: &str) -> AdapterResult<LedgerTransaction> {
        self.rpc.get_transaction(hash).await.map_err(|err| {
            AdapterError::NetworkQueryFailed(format!(
                "Failed to fetch transaction {}: {}",
                hash, err
            ))
        })
    }

    pub async fn get_fee_stats(&self) -> AdapterResult<FeeStats> {
        self.rpc.get_fee_stats().await.map_err(|err| {
            AdapterError::NetworkQueryFailed(format!("Failed to fetch fee stats: {}", err))
        })
    }

    pub async fn latest_ledger(&self) -> AdapterResult<u32> {
        self.rpc.latest_ledger().await.map_err(|err| {
            AdapterError::NetworkQueryFailed(format!("Failed to fetch latest ledger: {}", err))
        })
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `policy.max_retries` additional attempts have been spent.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt > policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "Attempt {} of {} failed ({}), retrying in {:?}",
                    attempt,
                    policy.max_retries + 1,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn submission_error(err: RpcError) -> AdapterError {
    match err {
        RpcError::Status {
            status,
            message,
            result_codes,
        } if status < 500 => AdapterError::SubmissionRejected {
            status: Some(status),
            result_codes,
            message,
        },
        RpcError::Status {
            status, message, ..
        } => AdapterError::NetworkTransient {
            status: Some(status),
            message,
        },
        RpcError::Transport { message, .. } => AdapterError::NetworkTransient {
            status: None,
            message,
        },
        RpcError::Decode(msg) => AdapterError::Encoding(msg),
    }
}
