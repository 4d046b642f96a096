use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::types::{TransactionRecord, TransactionStatus};
use crate::config::Network;
use crate::gateway::types::ResultCodes;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdapterError {
    // Request errors
    InvalidArgument(String),
    InvalidRequest(String),
    InvalidAsset(String),
    InvalidKeyMaterial(String),

    // Registry errors
    WalletNotFound(String),

    // Ledger errors
    AccountNotFound(String),
    FeeTooLow {
        max_fee: i64,
        inner_fee: i64,
    },
    AlreadyConfirmed(String),
    SponsorNotConfigured(Network),
    Encoding(String),

    // Network errors
    SubmissionRejected {
        status: Option<u16>,
        result_codes: Option<ResultCodes>,
        message: String,
    },
    NetworkTransient {
        status: Option<u16>,
        message: String,
    },
    NetworkQueryFailed(String),

    // Configuration errors
    Config(String),

    // Lifecycle errors
    IllegalTransition {
        id: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },
    TransactionFailed {
        record: Box<TransactionRecord>,
        source: Box<AdapterError>,
    },
}

impl AdapterError {
    /// Only transient network failures are worth resubmitting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::NetworkTransient { .. })
    }

    /// Attach the record of the transaction this failure ended.
    pub fn with_record(self, record: TransactionRecord) -> Self {
        AdapterError::TransactionFailed {
            record: Box::new(record),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping any lifecycle wrapping.
    pub fn root_cause(&self) -> &AdapterError {
        match self {
            AdapterError::TransactionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            AdapterError::TransactionFailed { record, .. } => Some(record),
            _ => None,
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AdapterError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            AdapterError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            AdapterError::InvalidAsset(msg) => write!(f, "Invalid asset: {}", msg),
            AdapterError::InvalidKeyMaterial(msg) => write!(f, "Invalid key material: {}", msg),

            AdapterError::WalletNotFound(address) => write!(f, "Wallet not found: {}", address),

            AdapterError::AccountNotFound(address) => {
                write!(f, "Account not found on ledger: {}", address)
            }
            AdapterError::FeeTooLow { max_fee, inner_fee } => write!(
                f,
                "Fee too low: max fee {} is below the inner transaction fee of {} per operation",
                max_fee, inner_fee
            ),
            AdapterError::AlreadyConfirmed(hash) => {
                write!(f, "Transaction {} is already confirmed", hash)
            }
            AdapterError::SponsorNotConfigured(network) => {
                write!(f, "No fee-bump sponsor configured for {}", network)
            }
            AdapterError::Encoding(msg) => write!(f, "Encoding error: {}", msg),

            AdapterError::SubmissionRejected {
                status,
                result_codes,
                message,
            } => {
                write!(f, "Submission rejected: {}", message)?;
                if let Some(status) = status {
                    write!(f, " (HTTP {})", status)?;
                }
                if let Some(codes) = result_codes {
                    write!(f, " [{}]", codes)?;
                }
                Ok(())
            }
            AdapterError::NetworkTransient { status, message } => match status {
                Some(status) => write!(f, "Transient network error (HTTP {}): {}", status, message),
                None => write!(f, "Transient network error: {}", message),
            },
            AdapterError::NetworkQueryFailed(msg) => write!(f, "Network query failed: {}", msg),

            AdapterError::Config(msg) => write!(f, "Configuration error: {}", msg),

            AdapterError::IllegalTransition { id, from, to } => write!(
                f,
                "Illegal status transition for {}: {} -> {}",
                id,
                from.as_str(),
                to.as_str()
            ),
            AdapterError::TransactionFailed { record, source } => {
                write!(f, "Transaction {} failed: {}", record.id, source)
            }
        }
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdapterError::TransactionFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

// Conversion helpers
impl From<std::io::Error> for AdapterError {
    fn from(error: std::io::Error) -> Self {
        AdapterError::Config(error.to_string())
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(error: serde_json::Error) -> Self {
        AdapterError::Encoding(format!("JSON error: {}", error))
    }
}

impl From<stellar_xdr::curr::Error> for AdapterError {
    fn from(error: stellar_xdr::curr::Error) -> Self {
        AdapterError::Encoding(format!("XDR error: {}", error))
    }
}
