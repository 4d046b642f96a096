use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    AccountId, AlphaNum12, AlphaNum4, Asset, AssetCode12, AssetCode4, DecoratedSignature,
    FeeBumpTransaction, FeeBumpTransactionEnvelope, FeeBumpTransactionExt,
    FeeBumpTransactionInnerTx, Hash, Limits, Memo, MuxedAccount, Operation, OperationBody,
    PaymentOp, Preconditions, PublicKey, ReadXdr, SequenceNumber, StringM, TimeBounds, TimePoint,
    Transaction, TransactionEnvelope, TransactionExt, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, TransactionV0, TransactionV1Envelope, Uint256,
    VecM, WriteXdr,
};

use crate::api::types::{MemoType, PaymentRequest};
use crate::config::Network;
use crate::errors::{AdapterError, AdapterResult};
use crate::gateway::types::AccountState;

/// Validity window attached to every payment envelope.
pub const TX_TIMEOUT_SECS: u64 = 300;
pub const STROOPS_PER_UNIT: i64 = 10_000_000;
pub const MAX_MEMO_TEXT_BYTES: usize = 28;
const AMOUNT_DECIMALS: usize = 7;

/// Network id mixed into every signature payload: `sha256(passphrase)`.
pub fn network_id(network: Network) -> [u8; 32] {
    Sha256::digest(network.passphrase().as_bytes()).into()
}

/// Parse a decimal amount in whole units into stroops.
pub fn parse_amount(amount: &str) -> AdapterResult<i64> {
    let invalid = || AdapterError::InvalidArgument(format!("Invalid amount: {}", amount));

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if amount.contains('.') && fraction.is_empty() {
        return Err(invalid());
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > AMOUNT_DECIMALS {
        return Err(AdapterError::InvalidArgument(format!(
            "Amount {} has more than {} decimal places",
            amount, AMOUNT_DECIMALS
        )));
    }

    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let fraction: i64 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<width$}", fraction, width = AMOUNT_DECIMALS)
            .parse()
            .map_err(|_| invalid())?
    };

    whole
        .checked_mul(STROOPS_PER_UNIT)
        .and_then(|stroops| stroops.checked_add(fraction))
        .ok_or_else(invalid)
}

/// Render stroops as a fixed seven-decimal amount, e.g. `10.0000000`.
pub fn format_amount(stroops: i64) -> String {
    let sign = if stroops < 0 { "-" } else { "" };
    let abs = stroops.unsigned_abs();
    let unit = STROOPS_PER_UNIT as u64;
    format!("{}{}.{:07}", sign, abs / unit, abs % unit)
}

pub fn account_id_from_address(address: &str) -> AdapterResult<AccountId> {
    let key = decode_public_key(address)?;
    Ok(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key))))
}

pub fn muxed_from_address(address: &str) -> AdapterResult<MuxedAccount> {
    Ok(MuxedAccount::Ed25519(Uint256(decode_public_key(address)?)))
}

/// Base `G...` address of a (possibly multiplexed) account.
pub fn address_from_muxed(account: &MuxedAccount) -> String {
    let key = match account {
        MuxedAccount::Ed25519(Uint256(key)) => *key,
        MuxedAccount::MuxedEd25519(muxed) => muxed.ed25519.0,
    };
    stellar_strkey::ed25519::PublicKey(key).to_string()
}

pub fn address_from_account_id(account: &AccountId) -> String {
    let AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key))) = account;
    stellar_strkey::ed25519::PublicKey(*key).to_string()
}

fn decode_public_key(address: &str) -> AdapterResult<[u8; 32]> {
    stellar_strkey::ed25519::PublicKey::from_string(address)
        .map(|key| key.0)
        .map_err(|_| AdapterError::InvalidArgument(format!("Invalid account address: {}", address)))
}

/// Resolve `native`/`XLM` or a `CODE:ISSUER` pair.
pub fn parse_asset(asset: &str) -> AdapterResult<Asset> {
    let trimmed = asset.trim();
    if trimmed.eq_ignore_ascii_case("native") || trimmed.eq_ignore_ascii_case("xlm") {
        return Ok(Asset::Native);
    }

    let (code, issuer) = trimmed
        .split_once(':')
        .ok_or_else(|| AdapterError::InvalidAsset(format!("Expected CODE:ISSUER, got '{}'", asset)))?;

    if code.is_empty() || code.len() > 12 || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(AdapterError::InvalidAsset(format!(
            "Invalid asset code '{}'",
            code
        )));
    }
    let issuer = account_id_from_address(issuer)
        .map_err(|_| AdapterError::InvalidAsset(format!("Invalid asset issuer '{}'", issuer)))?;

    if code.len() <= 4 {
        let mut bytes = [0u8; 4];
        bytes[..code.len()].copy_from_slice(code.as_bytes());
        Ok(Asset::CreditAlphanum4(AlphaNum4 {
            asset_code: AssetCode4(bytes),
            issuer,
        }))
    } else {
        let mut bytes = [0u8; 12];
        bytes[..code.len()].copy_from_slice(code.as_bytes());
        Ok(Asset::CreditAlphanum12(AlphaNum12 {
            asset_code: AssetCode12(bytes),
            issuer,
        }))
    }
}

pub fn format_asset(asset: &Asset) -> String {
    fn code(bytes: &[u8]) -> String {
        bytes
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| *b as char)
            .collect()
    }

    match asset {
        Asset::Native => "native".to_string(),
        Asset::CreditAlphanum4(a) => format!(
            "{}:{}",
            code(&a.asset_code.0),
            address_from_account_id(&a.issuer)
        ),
        Asset::CreditAlphanum12(a) => format!(
            "{}:{}",
            code(&a.asset_code.0),
            address_from_account_id(&a.issuer)
        ),
    }
}

pub fn parse_memo(memo: Option<&str>, memo_type: Option<MemoType>) -> AdapterResult<Memo> {
    let memo = match memo {
        Some(memo) => memo,
        None => return Ok(Memo::None),
    };

    match memo_type.unwrap_or_default() {
        MemoType::Text => {
            if memo.len() > MAX_MEMO_TEXT_BYTES {
                return Err(AdapterError::InvalidArgument(format!(
                    "Text memo exceeds {} bytes",
                    MAX_MEMO_TEXT_BYTES
                )));
            }
            let text = StringM::<28>::try_from(memo)?;
            Ok(Memo::Text(text))
        }
        MemoType::Id => memo
            .parse::<u64>()
            .map(Memo::Id)
            .map_err(|_| AdapterError::InvalidArgument(format!("Invalid id memo: {}", memo))),
        MemoType::Hash => Ok(Memo::Hash(Hash(decode_hash(memo)?))),
        MemoType::Return => Ok(Memo::Return(Hash(decode_hash(memo)?))),
    }
}

fn describe_memo(memo: &Memo) -> Option<String> {
    match memo {
        Memo::None => None,
        Memo::Text(text) => Some(text.to_utf8_string_lossy()),
        Memo::Id(id) => Some(id.to_string()),
        Memo::Hash(hash) | Memo::Return(hash) => Some(hex::encode(hash.0)),
    }
}

fn decode_hash(value: &str) -> AdapterResult<[u8; 32]> {
    let bytes = hex::decode(value)
        .map_err(|e| AdapterError::InvalidArgument(format!("Invalid hex digest: {}", e)))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| AdapterError::InvalidArgument("Digest must be 32 bytes".to_string()))
}

fn v0_to_transaction(tx: &TransactionV0) -> Transaction {
    Transaction {
        source_account: MuxedAccount::Ed25519(tx.source_account_ed25519.clone()),
        fee: tx.fee,
        seq_num: tx.seq_num.clone(),
        cond: match &tx.time_bounds {
            Some(bounds) => Preconditions::Time(bounds.clone()),
            None => Preconditions::None,
        },
        memo: tx.memo.clone(),
        operations: tx.operations.clone(),
        ext: TransactionExt::V0,
    }
}

/// Strictly decoded operation from an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OperationSummary {
    Payment {
        destination: String,
        amount: String,
        asset: String,
    },
    Unsupported {
        #[serde(rename = "type")]
        operation_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSummary {
    pub hash: String,
    pub source_account: String,
    pub fee_source: Option<String>,
    pub fee: i64,
    pub sequence: i64,
    pub memo: Option<String>,
    pub operations: Vec<OperationSummary>,
    pub signature_count: usize,
    pub fee_bump: bool,
}

/// A transaction envelope bound to the network whose id it is signed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    xdr: TransactionEnvelope,
    network_id: [u8; 32],
}

impl Envelope {
    pub fn new(xdr: TransactionEnvelope, network: Network) -> Self {
        Self {
            xdr,
            network_id: network_id(network),
        }
    }

    pub fn from_base64(encoded: &str, network: Network) -> AdapterResult<Self> {
        let xdr = TransactionEnvelope::from_xdr_base64(encoded.trim(), Limits::none())?;
        Ok(Self::new(xdr, network))
    }

    pub fn to_base64(&self) -> AdapterResult<String> {
        Ok(self.xdr.to_xdr_base64(Limits::none())?)
    }

    pub fn as_xdr(&self) -> &TransactionEnvelope {
        &self.xdr
    }

    pub fn is_fee_bump(&self) -> bool {
        matches!(self.xdr, TransactionEnvelope::TxFeeBump(_))
    }

    /// Total fee declared by the outermost transaction, in stroops.
    pub fn fee(&self) -> i64 {
        match &self.xdr {
            TransactionEnvelope::TxV0(env) => i64::from(env.tx.fee),
            TransactionEnvelope::Tx(env) => i64::from(env.tx.fee),
            TransactionEnvelope::TxFeeBump(env) => env.tx.fee,
        }
    }

    pub fn sequence(&self) -> i64 {
        match &self.xdr {
            TransactionEnvelope::TxV0(env) => env.tx.seq_num.0,
            TransactionEnvelope::Tx(env) => env.tx.seq_num.0,
            TransactionEnvelope::TxFeeBump(env) => match &env.tx.inner_tx {
                FeeBumpTransactionInnerTx::Tx(inner) => inner.tx.seq_num.0,
            },
        }
    }

    /// Source account of the (inner) transaction whose sequence is consumed.
    pub fn source_account(&self) -> String {
        match &self.xdr {
            TransactionEnvelope::TxV0(env) => {
                stellar_strkey::ed25519::PublicKey(env.tx.source_account_ed25519.0).to_string()
            }
            TransactionEnvelope::Tx(env) => address_from_muxed(&env.tx.source_account),
            TransactionEnvelope::TxFeeBump(env) => match &env.tx.inner_tx {
                FeeBumpTransactionInnerTx::Tx(inner) => address_from_muxed(&inner.tx.source_account),
            },
        }
    }

    pub fn fee_source(&self) -> Option<String> {
        match &self.xdr {
            TransactionEnvelope::TxFeeBump(env) => Some(address_from_muxed(&env.tx.fee_source)),
            _ => None,
        }
    }

    fn memo(&self) -> &Memo {
        match &self.xdr {
            TransactionEnvelope::TxV0(env) => &env.tx.memo,
            TransactionEnvelope::Tx(env) => &env.tx.memo,
            TransactionEnvelope::TxFeeBump(env) => match &env.tx.inner_tx {
                FeeBumpTransactionInnerTx::Tx(inner) => &inner.tx.memo,
            },
        }
    }

    fn raw_operations(&self) -> &[Operation] {
        match &self.xdr {
            TransactionEnvelope::TxV0(env) => env.tx.operations.as_slice(),
            TransactionEnvelope::Tx(env) => env.tx.operations.as_slice(),
            TransactionEnvelope::TxFeeBump(env) => match &env.tx.inner_tx {
                FeeBumpTransactionInnerTx::Tx(inner) => inner.tx.operations.as_slice(),
            },
        }
    }

    /// Transaction hash: `sha256(network_id || tagged transaction)` in XDR.
    pub fn hash(&self) -> AdapterResult<[u8; 32]> {
        let tagged_transaction = match &self.xdr {
            TransactionEnvelope::TxV0(env) => {
                TransactionSignaturePayloadTaggedTransaction::Tx(v0_to_transaction(&env.tx))
            }
            TransactionEnvelope::Tx(env) => {
                TransactionSignaturePayloadTaggedTransaction::Tx(env.tx.clone())
            }
            TransactionEnvelope::TxFeeBump(env) => {
                TransactionSignaturePayloadTaggedTransaction::TxFeeBump(env.tx.clone())
            }
        };
        let payload = TransactionSignaturePayload {
            network_id: Hash(self.network_id),
            tagged_transaction,
        };
        let bytes = payload.to_xdr(Limits::none())?;
        Ok(Sha256::digest(&bytes).into())
    }

    pub fn hash_hex(&self) -> AdapterResult<String> {
        Ok(hex::encode(self.hash()?))
    }

    pub fn signatures(&self) -> &[DecoratedSignature] {
        match &self.xdr {
            TransactionEnvelope::TxV0(env) => env.signatures.as_slice(),
            TransactionEnvelope::Tx(env) => env.signatures.as_slice(),
            TransactionEnvelope::TxFeeBump(env) => env.signatures.as_slice(),
        }
    }

    pub fn push_signature(&mut self, signature: DecoratedSignature) -> AdapterResult<()> {
        let signatures = match &mut self.xdr {
            TransactionEnvelope::TxV0(env) => &mut env.signatures,
            TransactionEnvelope::Tx(env) => &mut env.signatures,
            TransactionEnvelope::TxFeeBump(env) => &mut env.signatures,
        };
        let mut updated = signatures.to_vec();
        updated.push(signature);
        *signatures = VecM::try_from(updated)?;
        Ok(())
    }

    pub fn operations(&self) -> Vec<OperationSummary> {
        self.raw_operations()
            .iter()
            .map(|operation| match &operation.body {
                OperationBody::Payment(payment) => OperationSummary::Payment {
                    destination: address_from_muxed(&payment.destination),
                    amount: format_amount(payment.amount),
                    asset: format_asset(&payment.asset),
                },
                other => OperationSummary::Unsupported {
                    operation_type: other.name().to_string(),
                },
            })
            .collect()
    }

    /// `(destination, amount, asset)` when the envelope carries exactly one payment.
    pub fn single_payment(&self) -> Option<(String, String, String)> {
        match self.operations().as_slice() {
            [OperationSummary::Payment {
                destination,
                amount,
                asset,
            }] => Some((destination.clone(), amount.clone(), asset.clone())),
            _ => None,
        }
    }

    pub fn summary(&self) -> AdapterResult<EnvelopeSummary> {
        Ok(EnvelopeSummary {
            hash: self.hash_hex()?,
            source_account: self.source_account(),
            fee_source: self.fee_source(),
            fee: self.fee(),
            sequence: self.sequence(),
            memo: describe_memo(self.memo()),
            operations: self.operations(),
            signature_count: self.signatures().len(),
            fee_bump: self.is_fee_bump(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBumpConfig {
    /// Fee per operation the sponsor is willing to pay, in stroops. The
    /// bump itself counts as one extra operation.
    pub max_fee: i64,
}

/// Builds unsigned envelopes for one network.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    network: Network,
}

impl EnvelopeBuilder {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Single-payment envelope consuming `account.sequence + 1`.
    pub fn build_payment(
        &self,
        request: &PaymentRequest,
        account: &AccountState,
        fee: u32,
    ) -> AdapterResult<Envelope> {
        if account.address != request.from {
            return Err(AdapterError::InvalidArgument(format!(
                "Account state for {} does not match payment source {}",
                account.address, request.from
            )));
        }

        let source_account = muxed_from_address(&request.from)?;
        let destination = muxed_from_address(&request.to)?;
        let amount = parse_amount(&request.amount)?;
        let asset = parse_asset(request.asset_or_native())?;
        let memo = parse_memo(request.memo.as_deref(), request.memo_type)?;
        let seq_num = account.sequence.checked_add(1).ok_or_else(|| {
            AdapterError::InvalidArgument(format!(
                "Sequence number overflow for {}",
                account.address
            ))
        })?;

        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let cond = Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(now + TX_TIMEOUT_SECS),
        });

        let operation = Operation {
            source_account: None,
            body: OperationBody::Payment(PaymentOp {
                destination,
                asset,
                amount,
            }),
        };

        let tx = Transaction {
            source_account,
            fee,
            seq_num: SequenceNumber(seq_num),
            cond,
            memo,
            operations: VecM::try_from(vec![operation])?,
            ext: TransactionExt::V0,
        };

        log::debug!(
            "Built payment envelope from {} at sequence {} with fee {}",
            request.from,
            seq_num,
            fee
        );

        Ok(Envelope::new(TransactionEnvelope::from(tx), self.network))
    }

    /// Wrap an encoded envelope in a fee bump paid by `fee_source`.
    ///
    /// The inner transaction and its signatures are carried unmodified.
    pub fn build_fee_bump(
        &self,
        inner_envelope: &str,
        config: &FeeBumpConfig,
        fee_source: &str,
    ) -> AdapterResult<Envelope> {
        let inner = Envelope::from_base64(inner_envelope, self.network)?;
        let inner = match inner.xdr {
            TransactionEnvelope::Tx(env) => env,
            // v0 and v1 of the same transaction share a hash, so signatures stay valid
            TransactionEnvelope::TxV0(env) => TransactionV1Envelope {
                tx: v0_to_transaction(&env.tx),
                signatures: env.signatures,
            },
            TransactionEnvelope::TxFeeBump(_) => {
                return Err(AdapterError::InvalidArgument(
                    "Cannot fee-bump a fee-bump envelope".to_string(),
                ))
            }
        };

        if config.max_fee <= 0 {
            return Err(AdapterError::InvalidArgument(format!(
                "Max fee must be positive, got {}",
                config.max_fee
            )));
        }
        // the network compares per-operation rates, rounding the inner rate up
        let inner_ops = inner.tx.operations.len().max(1) as i64;
        let inner_rate = (i64::from(inner.tx.fee) + inner_ops - 1) / inner_ops;
        if config.max_fee < inner_rate {
            return Err(AdapterError::FeeTooLow {
                max_fee: config.max_fee,
                inner_fee: inner_rate,
            });
        }
        let fee = config
            .max_fee
            .checked_mul(inner_ops + 1)
            .ok_or_else(|| {
                AdapterError::InvalidArgument(format!(
                    "Max fee {} overflows for {} operations",
                    config.max_fee,
                    inner_ops + 1
                ))
            })?;

        let tx = FeeBumpTransaction {
            fee_source: muxed_from_address(fee_source)?,
            fee,
            inner_tx: FeeBumpTransactionInnerTx::Tx(inner),
            ext: FeeBumpTransactionExt::V0,
        };

        Ok(Envelope::new(
            TransactionEnvelope::TxFeeBump(FeeBumpTransactionEnvelope {
                tx,
                signatures: VecM::default(),
            }),
            self.network,
        ))
    }

    pub fn summarize(&self, envelope: &Envelope) -> AdapterResult<EnvelopeSummary> {
        envelope.summary()
    }
}
