//! Horizon REST client.
//!
//! Speaks the subset of the Horizon API the adapter needs: account lookup,
//! transaction submission and lookup, fee statistics and the latest ledger.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::types::{AccountState, Balance, FeeStats, LedgerTransaction, ResultCodes, SubmissionResult};
use super::{LedgerRpc, RpcError};
use crate::errors::{AdapterError, AdapterResult};

/// HTTP client for a single Horizon instance
pub struct HorizonClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct HorizonAccount {
    account_id: String,
    sequence: String,
    #[serde(default)]
    balances: Vec<HorizonBalance>,
}

#[derive(Debug, Deserialize)]
struct HorizonBalance {
    balance: String,
    asset_type: String,
    #[serde(default)]
    asset_code: Option<String>,
    #[serde(default)]
    asset_issuer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HorizonSubmitResponse {
    hash: String,
    ledger: u32,
    #[serde(default)]
    successful: Option<bool>,
    #[serde(default)]
    envelope_xdr: Option<String>,
    #[serde(default)]
    result_xdr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HorizonProblem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    extras: Option<HorizonProblemExtras>,
}

#[derive(Debug, Deserialize)]
struct HorizonProblemExtras {
    #[serde(default)]
    result_codes: Option<ResultCodes>,
}

#[derive(Debug, Deserialize)]
struct HorizonPage<T> {
    #[serde(rename = "_embedded")]
    embedded: HorizonRecords<T>,
}

#[derive(Debug, Deserialize)]
struct HorizonRecords<T> {
    records: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct HorizonLedger {
    sequence: u32,
}

impl HorizonBalance {
    fn into_balance(self) -> Balance {
        let asset = match (self.asset_type.as_str(), self.asset_code, self.asset_issuer) {
            ("native", _, _) => "native".to_string(),
            (_, Some(code), Some(issuer)) => format!("{}:{}", code, issuer),
            (other, _, _) => other.to_string(),
        };
        Balance {
            asset,
            balance: self.balance,
        }
    }
}

impl HorizonAccount {
    fn into_state(self) -> Result<AccountState, RpcError> {
        let sequence = self.sequence.parse::<i64>().map_err(|_| {
            RpcError::Decode(format!("Invalid account sequence '{}'", self.sequence))
        })?;
        Ok(AccountState {
            address: self.account_id,
            sequence,
            balances: self
                .balances
                .into_iter()
                .map(HorizonBalance::into_balance)
                .collect(),
        })
    }
}

/// Turn a Horizon problem document into a status error, keeping its result codes.
pub(crate) fn parse_problem(status: u16, body: &str) -> RpcError {
    let problem: HorizonProblem = serde_json::from_str(body).unwrap_or_default();
    let message = match (problem.title, problem.detail) {
        (Some(title), Some(detail)) => format!("{}: {}", title, detail),
        (Some(title), None) => title,
        (None, Some(detail)) => detail,
        (None, None) if body.trim().is_empty() => format!("HTTP {}", status),
        (None, None) => body.trim().chars().take(200).collect(),
    };
    RpcError::Status {
        status,
        message,
        result_codes: problem
            .extras
            .and_then(|extras| extras.result_codes)
            .filter(|codes| !codes.is_empty()),
    }
}

impl HorizonClient {
    pub fn new(base_url: &str, timeout: Duration) -> AdapterResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AdapterError::Config(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(HorizonClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RpcError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RpcError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_problem(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| RpcError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LedgerRpc for HorizonClient {
    async fn get_account(&self, address: &str) -> Result<AccountState, RpcError> {
        let account: HorizonAccount = self.get_json(&format!("/accounts/{}", address)).await?;
        account.into_state()
    }

    async fn post_transaction(&self, envelope_xdr: &str) -> Result<SubmissionResult, RpcError> {
        let url = format!("{}/transactions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[("tx", envelope_xdr)])
            .send()
            .await?;
        let submitted: HorizonSubmitResponse = Self::decode(response).await?;
        Ok(SubmissionResult {
            hash: submitted.hash,
            ledger: submitted.ledger,
            successful: submitted.successful.unwrap_or(true),
            result_xdr: submitted.result_xdr,
            envelope_xdr: submitted.envelope_xdr,
        })
    }

    async fn get_transaction(&self, hash: &str) -> Result<LedgerTransaction, RpcError> {
        self.get_json(&format!("/transactions/{}", hash)).await
    }

    async fn get_fee_stats(&self) -> Result<FeeStats, RpcError> {
        self.get_json("/fee_stats").await
    }

    async fn latest_ledger(&self) -> Result<u32, RpcError> {
        let page: HorizonPage<HorizonLedger> =
            self.get_json("/ledgers?order=desc&limit=1").await?;
        Ok(page
            .embedded
            .records
            .first()
            .map(|ledger| ledger.sequence)
            .unwrap_or(0))
    }
}
