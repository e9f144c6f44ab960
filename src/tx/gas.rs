//! Fee snapshots and the fee policy applied to a pending transaction

use crate::chain::ProviderClient;
use crate::error::{WalletError, WalletResult};

use ethers::types::U256;
use serde::Deserialize;
use tracing::debug;

/// Which fee model the wallet may use
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
    /// EIP-1559 when the network quotes it, legacy otherwise
    #[default]
    Auto,
    /// Always legacy; a 1559-only quote is collapsed to its max fee
    Legacy,
    /// EIP-1559 only; a legacy-only quote is an error
    Eip1559,
}

/// One fee quote from the network, in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSnapshot {
    gas_price: Option<U256>,
    max_fee_per_gas: Option<U256>,
    max_priority_fee_per_gas: Option<U256>,
}

impl FeeSnapshot {
    /// Build a snapshot; at least one complete fee model is required
    pub fn new(
        gas_price: Option<U256>,
        max_fee_per_gas: Option<U256>,
        max_priority_fee_per_gas: Option<U256>,
    ) -> WalletResult<Self> {
        let snapshot = Self {
            gas_price,
            max_fee_per_gas,
            max_priority_fee_per_gas,
        };

        if !snapshot.has_legacy() && !snapshot.has_eip1559() {
            return Err(WalletError::FeeData(
                "quote has neither gasPrice nor both EIP-1559 fields".to_string(),
            ));
        }

        if let (Some(max_fee), Some(tip)) = (max_fee_per_gas, max_priority_fee_per_gas) {
            if tip > max_fee {
                return Err(WalletError::FeeData(format!(
                    "priority fee {} exceeds max fee {}",
                    tip, max_fee
                )));
            }
        }

        Ok(snapshot)
    }

    pub fn legacy(gas_price: U256) -> Self {
        Self {
            gas_price: Some(gas_price),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        }
    }

    pub fn eip1559(max_fee_per_gas: U256, max_priority_fee_per_gas: U256) -> WalletResult<Self> {
        Self::new(None, Some(max_fee_per_gas), Some(max_priority_fee_per_gas))
    }

    pub fn gas_price(&self) -> Option<U256> {
        self.gas_price
    }

    pub fn max_fee_per_gas(&self) -> Option<U256> {
        self.max_fee_per_gas
    }

    pub fn max_priority_fee_per_gas(&self) -> Option<U256> {
        self.max_priority_fee_per_gas
    }

    pub fn has_legacy(&self) -> bool {
        self.gas_price.is_some()
    }

    pub fn has_eip1559(&self) -> bool {
        self.max_fee_per_gas.is_some() && self.max_priority_fee_per_gas.is_some()
    }
}

/// Fee fields placed on a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl FeePolicy {
    /// Highest price per gas unit this policy can pay
    pub fn max_price_per_gas(&self) -> U256 {
        match self {
            FeePolicy::Legacy(price) => *price,
            FeePolicy::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
        }
    }
}

/// Turns network fee data into a fee policy
#[derive(Debug, Clone)]
pub struct FeeEstimator {
    mode: FeeMode,
}

impl FeeEstimator {
    pub fn new(mode: FeeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> FeeMode {
        self.mode
    }

    /// Single fee query, no retries
    pub async fn snapshot(&self, provider: &dyn ProviderClient) -> WalletResult<FeeSnapshot> {
        let snapshot = provider.get_fee_data().await?;
        debug!(
            gas_price = ?snapshot.gas_price,
            max_fee_per_gas = ?snapshot.max_fee_per_gas,
            max_priority_fee_per_gas = ?snapshot.max_priority_fee_per_gas,
            "Fee snapshot"
        );
        Ok(snapshot)
    }

    /// Select the fee fields for a transaction from a snapshot
    pub fn policy(&self, snapshot: &FeeSnapshot) -> WalletResult<FeePolicy> {
        match self.mode {
            FeeMode::Auto => {
                if let (Some(max_fee), Some(tip)) =
                    (snapshot.max_fee_per_gas, snapshot.max_priority_fee_per_gas)
                {
                    Ok(FeePolicy::Eip1559 {
                        max_fee_per_gas: max_fee,
                        max_priority_fee_per_gas: tip,
                    })
                } else if let Some(price) = snapshot.gas_price {
                    Ok(FeePolicy::Legacy(price))
                } else {
                    Err(WalletError::FeeData("no usable fee model in quote".to_string()))
                }
            }
            FeeMode::Legacy => match (snapshot.gas_price, snapshot.max_fee_per_gas) {
                (Some(price), _) => Ok(FeePolicy::Legacy(price)),
                (None, Some(max_fee)) => {
                    debug!("Legacy mode requested, pricing at EIP-1559 max fee {}", max_fee);
                    Ok(FeePolicy::Legacy(max_fee))
                }
                (None, None) => Err(WalletError::FeeData("no gas price in quote".to_string())),
            },
            FeeMode::Eip1559 => match (snapshot.max_fee_per_gas, snapshot.max_priority_fee_per_gas) {
                (Some(max_fee), Some(tip)) => Ok(FeePolicy::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: tip,
                }),
                _ => Err(WalletError::FeeData(
                    "network did not quote EIP-1559 fees".to_string(),
                )),
            },
        }
    }

    /// Calculate the maximum fee in wei
    pub fn max_cost(gas_limit: u64, policy: &FeePolicy) -> U256 {
        U256::from(gas_limit).saturating_mul(policy.max_price_per_gas())
    }
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new(FeeMode::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockProviderClient;

    fn gwei(n: u64) -> U256 {
        U256::from(n) * U256::exp10(9)
    }

    #[test]
    fn snapshot_requires_a_complete_model() {
        assert!(FeeSnapshot::new(None, None, None).is_err());
        assert!(FeeSnapshot::new(None, Some(gwei(30)), None).is_err());
        assert!(FeeSnapshot::new(Some(gwei(20)), None, None).is_ok());
        assert!(FeeSnapshot::new(None, Some(gwei(30)), Some(gwei(2))).is_ok());
        assert!(FeeSnapshot::new(Some(gwei(20)), Some(gwei(30)), Some(gwei(2))).is_ok());
    }

    #[test]
    fn snapshot_rejects_tip_above_max_fee() {
        assert!(matches!(
            FeeSnapshot::eip1559(gwei(1), gwei(2)),
            Err(WalletError::FeeData(_))
        ));
    }

    #[test]
    fn auto_prefers_eip1559() {
        let snapshot = FeeSnapshot::new(Some(gwei(20)), Some(gwei(30)), Some(gwei(2))).unwrap();
        let policy = FeeEstimator::default().policy(&snapshot).unwrap();
        assert_eq!(
            policy,
            FeePolicy::Eip1559 {
                max_fee_per_gas: gwei(30),
                max_priority_fee_per_gas: gwei(2),
            }
        );
    }

    #[test]
    fn auto_falls_back_to_legacy() {
        let snapshot = FeeSnapshot::legacy(gwei(20));
        let policy = FeeEstimator::default().policy(&snapshot).unwrap();
        assert_eq!(policy, FeePolicy::Legacy(gwei(20)));
    }

    #[test]
    fn legacy_collapse_needs_explicit_mode() {
        let snapshot = FeeSnapshot::eip1559(gwei(30), gwei(2)).unwrap();

        let auto = FeeEstimator::default().policy(&snapshot).unwrap();
        assert!(matches!(auto, FeePolicy::Eip1559 { .. }));

        let legacy = FeeEstimator::new(FeeMode::Legacy).policy(&snapshot).unwrap();
        assert_eq!(legacy, FeePolicy::Legacy(gwei(30)));
    }

    #[test]
    fn strict_eip1559_rejects_legacy_quote() {
        let snapshot = FeeSnapshot::legacy(gwei(20));
        assert!(matches!(
            FeeEstimator::new(FeeMode::Eip1559).policy(&snapshot),
            Err(WalletError::FeeData(_))
        ));
    }

    #[test]
    fn cost_uses_max_price() {
        let policy = FeePolicy::Eip1559 {
            max_fee_per_gas: gwei(30),
            max_priority_fee_per_gas: gwei(2),
        };
        assert_eq!(FeeEstimator::max_cost(21_000, &policy), gwei(630_000));
    }

    #[tokio::test]
    async fn snapshot_queries_network_once() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_get_fee_data()
            .times(1)
            .returning(|| Ok(FeeSnapshot::legacy(U256::from(7u64))));

        let snapshot = FeeEstimator::default().snapshot(&provider).await.unwrap();
        assert_eq!(snapshot.gas_price(), Some(U256::from(7u64)));
    }
}
