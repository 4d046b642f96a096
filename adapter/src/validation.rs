use regex::Regex;

use crate::api::types::{MemoType, PaymentRequest};
use crate::envelope::{parse_amount, MAX_MEMO_TEXT_BYTES};
use crate::errors::{AdapterError, AdapterResult};

/// Request-shape validation applied before any ledger work starts.
pub struct PaymentValidator {
    address_pattern: Regex,
    amount_pattern: Regex,
    hex_hash_pattern: Regex,
}

impl PaymentValidator {
    pub fn new() -> AdapterResult<Self> {
        let address_pattern = Regex::new(r"^G[A-Z2-7]{55}$")
            .map_err(|e| AdapterError::Config(format!("Invalid address regex: {}", e)))?;

        let amount_pattern = Regex::new(r"^\d+(\.\d+)?$")
            .map_err(|e| AdapterError::Config(format!("Invalid amount regex: {}", e)))?;

        let hex_hash_pattern = Regex::new(r"^[0-9a-fA-F]{64}$")
            .map_err(|e| AdapterError::Config(format!("Invalid hash regex: {}", e)))?;

        Ok(PaymentValidator {
            address_pattern,
            amount_pattern,
            hex_hash_pattern,
        })
    }

    /// Validate a public account address (`G...` StrKey with a valid checksum).
    pub fn validate_address(&self, address: &str) -> AdapterResult<()> {
        if address.is_empty() {
            return Err(AdapterError::InvalidRequest(
                "Address cannot be empty".to_string(),
            ));
        }

        if !self.address_pattern.is_match(address) {
            return Err(AdapterError::InvalidRequest(format!(
                "Address format is invalid: {}",
                address
            )));
        }

        stellar_strkey::ed25519::PublicKey::from_string(address).map_err(|_| {
            AdapterError::InvalidRequest(format!("Address checksum is invalid: {}", address))
        })?;

        Ok(())
    }

    /// Validate a decimal amount in whole units.
    pub fn validate_amount(&self, amount: &str) -> AdapterResult<()> {
        if amount.is_empty() {
            return Err(AdapterError::InvalidRequest(
                "Amount cannot be empty".to_string(),
            ));
        }

        if !self.amount_pattern.is_match(amount) {
            return Err(AdapterError::InvalidRequest(format!(
                "Amount format is invalid: {}",
                amount
            )));
        }

        let stroops = parse_amount(amount)
            .map_err(|e| AdapterError::InvalidRequest(e.to_string()))?;
        if stroops == 0 {
            return Err(AdapterError::InvalidRequest(
                "Amount must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_memo(&self, memo: &str, memo_type: MemoType) -> AdapterResult<()> {
        match memo_type {
            MemoType::Text => {
                if memo.len() > MAX_MEMO_TEXT_BYTES {
                    return Err(AdapterError::InvalidRequest(format!(
                        "Text memo exceeds {} bytes",
                        MAX_MEMO_TEXT_BYTES
                    )));
                }
            }
            MemoType::Id => {
                memo.parse::<u64>().map_err(|_| {
                    AdapterError::InvalidRequest(format!(
                        "Id memo must be an unsigned 64-bit integer: {}",
                        memo
                    ))
                })?;
            }
            MemoType::Hash | MemoType::Return => {
                if !self.hex_hash_pattern.is_match(memo) {
                    return Err(AdapterError::InvalidRequest(format!(
                        "{} memo must be 32 bytes of hex",
                        memo_type.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn validate_transaction_hash(&self, hash: &str) -> AdapterResult<()> {
        if !self.hex_hash_pattern.is_match(hash) {
            return Err(AdapterError::InvalidArgument(format!(
                "Transaction hash must be 64 hex characters: {}",
                hash
            )));
        }
        Ok(())
    }

    pub fn validate_payment(&self, request: &PaymentRequest) -> AdapterResult<()> {
        self.validate_address(&request.from)?;
        self.validate_address(&request.to)?;
        self.validate_amount(&request.amount)?;

        if let Some(memo) = &request.memo {
            self.validate_memo(memo, request.memo_type.unwrap_or_default())?;
        }

        Ok(())
    }
}
