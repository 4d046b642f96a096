use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub asset: String,
    pub balance: String,
}

/// Ledger view of an account, as needed to build its next envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    pub address: String,
    /// Sequence number of the account's last consumed transaction.
    pub sequence: i64,
    #[serde(default)]
    pub balances: Vec<Balance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub hash: String,
    pub ledger: u32,
    pub successful: bool,
    #[serde(default)]
    pub result_xdr: Option<String>,
    #[serde(default)]
    pub envelope_xdr: Option<String>,
}

/// Structured result codes returned with a rejected submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCodes {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub operations: Vec<String>,
}

impl ResultCodes {
    pub fn is_empty(&self) -> bool {
        self.transaction.is_none() && self.operations.is_empty()
    }
}

impl fmt::Display for ResultCodes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.transaction {
            Some(code) => write!(f, "transaction: {}", code)?,
            None => write!(f, "transaction: -")?,
        }
        if !self.operations.is_empty() {
            write!(f, "; operations: {}", self.operations.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDistribution {
    #[serde(deserialize_with = "string_or_number")]
    pub mode: u64,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub min: Option<u64>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub max: Option<u64>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub p50: Option<u64>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub p90: Option<u64>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub p99: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeStats {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub last_ledger_base_fee: Option<u64>,
    #[serde(default)]
    pub fee_charged: Option<FeeDistribution>,
}

impl FeeStats {
    /// Most common fee charged per operation recently, if the network reported one.
    pub fn mode_fee(&self) -> Option<u32> {
        self.fee_charged
            .as_ref()
            .and_then(|dist| u32::try_from(dist.mode).ok())
            .filter(|fee| *fee > 0)
    }
}

/// Raw transaction record as stored by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub hash: String,
    #[serde(default)]
    pub ledger: Option<u32>,
    #[serde(default)]
    pub successful: Option<bool>,
    #[serde(default)]
    pub source_account: Option<String>,
    pub envelope_xdr: String,
    #[serde(default)]
    pub result_xdr: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub fee_charged: Option<u64>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub max_fee: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(u64),
}

impl StringOrNumber {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            StringOrNumber::Number(n) => Ok(n),
            StringOrNumber::String(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid numeric string '{}'", s))),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer)?.into_u64()
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<StringOrNumber>::deserialize(deserializer)?
        .map(StringOrNumber::into_u64)
        .transpose()
}
