//! Unsigned transaction assembly

use super::gas::{FeeEstimator, FeePolicy};
use crate::error::{WalletError, WalletResult};
use crate::utils::codec::parse_address;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, U256};

/// Gas limit of a plain value transfer
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// Anything that can name a recipient
pub trait ToAddress {
    fn to_address(&self) -> WalletResult<Address>;
}

impl ToAddress for Address {
    fn to_address(&self) -> WalletResult<Address> {
        Ok(*self)
    }
}

impl ToAddress for str {
    fn to_address(&self) -> WalletResult<Address> {
        parse_address(self)
    }
}

impl ToAddress for String {
    fn to_address(&self) -> WalletResult<Address> {
        parse_address(self)
    }
}

/// A complete transaction, not yet signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub to: Address,
    pub value: U256,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fee: FeePolicy,
    pub data: Option<Bytes>,
    pub chain_id: u64,
}

impl UnsignedTransaction {
    /// Worst-case wei leaving the account: value plus the full fee
    pub fn max_cost(&self) -> U256 {
        self.value
            .saturating_add(FeeEstimator::max_cost(self.gas_limit, &self.fee))
    }

    /// Typed transaction matching the fee policy
    pub fn to_typed(&self) -> TypedTransaction {
        match self.fee {
            FeePolicy::Legacy(price) => {
                let mut tx = TransactionRequest::new()
                    .to(self.to)
                    .value(self.value)
                    .nonce(self.nonce)
                    .gas(self.gas_limit)
                    .gas_price(price)
                    .chain_id(self.chain_id);
                if let Some(data) = &self.data {
                    tx = tx.data(data.clone());
                }
                TypedTransaction::Legacy(tx)
            }
            FeePolicy::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let mut tx = Eip1559TransactionRequest::new()
                    .to(self.to)
                    .value(self.value)
                    .nonce(self.nonce)
                    .gas(self.gas_limit)
                    .max_fee_per_gas(max_fee_per_gas)
                    .max_priority_fee_per_gas(max_priority_fee_per_gas)
                    .chain_id(self.chain_id);
                if let Some(data) = &self.data {
                    tx = tx.data(data.clone());
                }
                TypedTransaction::Eip1559(tx)
            }
        }
    }
}

/// Assembles unsigned transactions for one chain. Performs no I/O.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    chain_id: u64,
}

impl TransactionBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn build<T: ToAddress + ?Sized>(
        &self,
        to: &T,
        value: U256,
        nonce: u64,
        fee: &FeePolicy,
        gas_limit: u64,
        data: Option<Bytes>,
    ) -> WalletResult<UnsignedTransaction> {
        let to = to.to_address()?;

        if gas_limit == 0 {
            return Err(WalletError::InvalidGasLimit(
                "gas limit must be positive".to_string(),
            ));
        }

        Ok(UnsignedTransaction {
            to,
            value,
            nonce,
            gas_limit,
            fee: *fee,
            // Empty calldata is the same as none on the wire
            data: data.filter(|d| !d.is_empty()),
            chain_id: self.chain_id,
        })
    }
}
