//! Chain module - the network client consumed by the wallet
//!
//! This module provides:
//! - The `ProviderClient` trait the transaction pipeline is written against
//! - An `ethers` HTTP implementation with multi-RPC failover for reads
//! - Classification of node rejection messages into wallet error kinds

pub mod provider;

pub use provider::{classify_rpc_error, ChainProvider};

use crate::error::WalletResult;
use crate::tx::FeeSnapshot;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use ethers::types::transaction::eip2718::TypedTransaction;

/// Network operations the wallet depends on.
///
/// Implementations must not retry broadcasts on their own; the wallet relies
/// on every rejection reaching the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Live balance in wei
    async fn get_balance(&self, address: Address) -> WalletResult<U256>;

    /// Transaction count including pending transactions
    async fn get_transaction_count(&self, address: Address) -> WalletResult<U256>;

    /// Current fee quote
    async fn get_fee_data(&self) -> WalletResult<FeeSnapshot>;

    /// Broadcast a signed, RLP-encoded transaction
    async fn send_raw_transaction(&self, raw: Bytes) -> WalletResult<H256>;

    /// Receipt for a transaction, `None` while it is unknown or pending
    async fn get_transaction_receipt(&self, tx_hash: H256)
        -> WalletResult<Option<TransactionReceipt>>;

    async fn get_chain_id(&self) -> WalletResult<u64>;

    async fn get_block_number(&self) -> WalletResult<u64>;

    async fn get_code(&self, address: Address) -> WalletResult<Bytes>;

    /// Read-only `eth_call` against the latest block
    async fn call(&self, tx: TypedTransaction) -> WalletResult<Bytes>;

    async fn resolve_name(&self, name: String) -> WalletResult<Address>;

    async fn resolve_avatar(&self, name: String) -> WalletResult<String>;
}
