use crate::errors::{AdapterError, AdapterResult};
use crate::gateway::NetworkGateway;

/// Network minimum fee per operation, in stroops.
pub const BASE_FEE: u32 = 100;

/// Per-operation fee estimation from recent network fee statistics.
#[derive(Clone)]
pub struct FeeOracle {
    gateway: NetworkGateway,
}

impl FeeOracle {
    pub fn new(gateway: NetworkGateway) -> Self {
        Self { gateway }
    }

    pub fn base_fee(&self) -> u32 {
        BASE_FEE
    }

    /// Fee for a transaction with `operation_count` operations.
    ///
    /// Uses the network's mode fee when available and falls back to
    /// [`BASE_FEE`] when statistics are unavailable or unusable.
    pub async fn estimate(&self, operation_count: u32) -> AdapterResult<u32> {
        if operation_count == 0 {
            return Err(AdapterError::InvalidArgument(
                "Operation count must be a positive integer".to_string(),
            ));
        }

        let per_operation = match self.gateway.get_fee_stats().await {
            Ok(stats) => match stats.mode_fee() {
                Some(fee) => fee,
                None => {
                    log::debug!("Fee stats carried no usable mode fee, using base fee");
                    BASE_FEE
                }
            },
            Err(err) => {
                log::debug!("Fee stats unavailable ({}), using base fee", err);
                BASE_FEE
            }
        };

        per_operation.checked_mul(operation_count).ok_or_else(|| {
            AdapterError::InvalidArgument(format!(
                "Fee for {} operations overflows",
                operation_count
            ))
        })
    }
}
