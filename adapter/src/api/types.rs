use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Network;
use crate::errors::{AdapterError, AdapterResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: String,
    pub address: String,
    pub network: Network,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(address: String, network: Network) -> Self {
        Self {
            id: format!("wallet_{}", Uuid::new_v4()),
            address,
            network,
            created_at: Utc::now(),
        }
    }
}

/// Memo kind attached to a payment. Unknown kinds fall back to `text`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum MemoType {
    #[default]
    Text,
    Id,
    Hash,
    Return,
}

impl MemoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoType::Text => "text",
            MemoType::Id => "id",
            MemoType::Hash => "hash",
            MemoType::Return => "return",
        }
    }
}

impl From<String> for MemoType {
    fn from(value: String) -> Self {
        MemoType::from(value.as_str())
    }
}

impl From<&str> for MemoType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "id" => MemoType::Id,
            "hash" => MemoType::Hash,
            "return" => MemoType::Return,
            _ => MemoType::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub memo_type: Option<MemoType>,
}

impl PaymentRequest {
    /// Native-asset payment without a memo.
    pub fn native(from: impl Into<String>, to: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount: amount.into(),
            asset: None,
            memo: None,
            memo_type: None,
        }
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>, memo_type: MemoType) -> Self {
        self.memo = Some(memo.into());
        self.memo_type = Some(memo_type);
        self
    }

    pub fn asset_or_native(&self) -> &str {
        self.asset.as_deref().unwrap_or("native")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Lifecycle record for one submitted envelope.
///
/// Status only ever moves `pending -> success` or `pending -> failed`.
/// Fee-bump records leave `to`/`amount`/`asset` empty when the inner
/// transaction is not a single payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub hash: String,
    pub status: TransactionStatus,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub asset: Option<String>,
    pub fee: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ledger: Option<u32>,
}

impl TransactionRecord {
    pub fn pending(
        hash: String,
        from: String,
        to: Option<String>,
        amount: Option<String>,
        asset: Option<String>,
        fee: String,
    ) -> Self {
        Self {
            id: format!("tx_{}", Uuid::new_v4()),
            hash,
            status: TransactionStatus::Pending,
            from,
            to,
            amount,
            asset,
            fee,
            created_at: Utc::now(),
            confirmed_at: None,
            ledger: None,
        }
    }

    pub fn mark_success(&mut self, ledger: u32) -> AdapterResult<()> {
        self.transition(TransactionStatus::Success)?;
        self.ledger = Some(ledger);
        self.confirmed_at = Some(Utc::now());
        Ok(())
    }

    /// `ledger` is known only when the network included the failed envelope.
    pub fn mark_failed(&mut self, ledger: Option<u32>) -> AdapterResult<()> {
        self.transition(TransactionStatus::Failed)?;
        if ledger.is_some() {
            self.ledger = ledger;
            self.confirmed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: TransactionStatus) -> AdapterResult<()> {
        if self.status != TransactionStatus::Pending {
            return Err(AdapterError::IllegalTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FeeBumpRequest {
    pub original_hash: String,
    /// Per-operation fee in stroops, as a decimal integer string.
    pub max_fee: String,
    pub sponsor_secret: Option<SecretString>,
}

impl FeeBumpRequest {
    pub fn new(original_hash: impl Into<String>, max_fee: impl Into<String>) -> Self {
        Self {
            original_hash: original_hash.into(),
            max_fee: max_fee.into(),
            sponsor_secret: None,
        }
    }

    pub fn with_sponsor_secret(mut self, secret: SecretString) -> Self {
        self.sponsor_secret = Some(secret);
        self
    }
}
