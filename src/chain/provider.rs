//! Chain provider with multi-RPC support and automatic failover

use super::ProviderClient;
use crate::config::NetworkConfig;
use crate::error::{WalletError, WalletResult};
use crate::tx::FeeSnapshot;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, TransactionReceipt, H256, U256};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const GWEI: u64 = 1_000_000_000;

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Network configuration
    config: NetworkConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: NetworkConfig) -> WalletResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(WalletError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        info!(
            "Connected {} RPC endpoint(s) for {} (chain {})",
            http_providers.len(),
            config.name,
            config.chain_id
        );

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!(
            "Chain {} failover to provider {}",
            self.config.chain_id, next
        );
    }

    /// Configured chain ID
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Run a read-only call, rotating through providers on failure
    async fn read<T, F, Fut>(&self, operation: &str, call: F) -> WalletResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = String::new();

        for _ in 0..self.http_providers.len() {
            match call(self.http().clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "{} failed on chain {}: {}",
                        operation, self.config.chain_id, e
                    );
                    last_error = e.to_string();
                    self.failover();
                }
            }
        }

        Err(WalletError::ChainConnection {
            chain_id: self.config.chain_id,
            message: format!("All providers failed {}: {}", operation, last_error),
        })
    }

    /// Fee suggestion from the latest block: 2 * base fee + priority fee, capped
    fn eip1559_fees(&self, base_fee: U256) -> (U256, U256) {
        let priority_fee = U256::from(self.config.priority_fee_gwei) * U256::from(GWEI);
        let max_fee = base_fee
            .saturating_mul(U256::from(2))
            .saturating_add(priority_fee);

        let cap = U256::from(self.config.max_gas_price_gwei) * U256::from(GWEI);
        let max_fee = std::cmp::min(max_fee, cap);

        // A cap below the tip would make the quote unusable
        (max_fee, std::cmp::min(priority_fee, max_fee))
    }
}

#[async_trait]
impl ProviderClient for ChainProvider {
    async fn get_balance(&self, address: Address) -> WalletResult<U256> {
        self.read("get_balance", move |p| async move {
            p.get_balance(address, None).await
        })
        .await
    }

    async fn get_transaction_count(&self, address: Address) -> WalletResult<U256> {
        self.read("get_transaction_count", move |p| async move {
            p.get_transaction_count(address, Some(BlockNumber::Pending.into()))
                .await
        })
        .await
    }

    async fn get_fee_data(&self) -> WalletResult<FeeSnapshot> {
        let gas_price = self
            .read("get_gas_price", |p| async move { p.get_gas_price().await })
            .await?;

        let block = self
            .read("get_block", |p| async move {
                p.get_block(BlockNumber::Latest).await
            })
            .await?;

        let (max_fee, priority_fee) = match block.and_then(|b| b.base_fee_per_gas) {
            Some(base_fee) => {
                let (max_fee, priority_fee) = self.eip1559_fees(base_fee);
                (Some(max_fee), Some(priority_fee))
            }
            None => {
                debug!("Chain {} reports no base fee, legacy pricing only", self.config.chain_id);
                (None, None)
            }
        };

        FeeSnapshot::new(Some(gas_price), max_fee, priority_fee)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> WalletResult<H256> {
        // Broadcasts go to the active provider only; a rejection must reach the caller
        match self.http().send_raw_transaction(raw).await {
            Ok(pending) => Ok(pending.tx_hash()),
            Err(e) => Err(classify_rpc_error(&e.to_string())),
        }
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> WalletResult<Option<TransactionReceipt>> {
        self.read("get_transaction_receipt", move |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
    }

    async fn get_chain_id(&self) -> WalletResult<u64> {
        let id = self
            .read("get_chainid", |p| async move { p.get_chainid().await })
            .await?;
        Ok(id.as_u64())
    }

    async fn get_block_number(&self) -> WalletResult<u64> {
        let block = self
            .read("get_block_number", |p| async move { p.get_block_number().await })
            .await?;
        Ok(block.as_u64())
    }

    async fn get_code(&self, address: Address) -> WalletResult<Bytes> {
        self.read("get_code", move |p| async move { p.get_code(address, None).await })
            .await
    }

    async fn call(&self, tx: TypedTransaction) -> WalletResult<Bytes> {
        self.read("call", move |p| {
            let tx = tx.clone();
            async move { p.call(&tx, None).await }
        })
        .await
    }

    async fn resolve_name(&self, name: String) -> WalletResult<Address> {
        self.read("resolve_name", move |p| {
            let name = name.clone();
            async move { p.resolve_name(&name).await }
        })
        .await
    }

    async fn resolve_avatar(&self, name: String) -> WalletResult<String> {
        let url = self
            .read("resolve_avatar", move |p| {
                let name = name.clone();
                async move { p.resolve_avatar(&name).await }
            })
            .await?;
        Ok(url.to_string())
    }
}

/// Map a node's rejection message onto the wallet's error kinds.
///
/// The message is kept verbatim in the returned variant.
pub fn classify_rpc_error(message: &str) -> WalletError {
    let lower = message.to_lowercase();

    if lower.contains("nonce too low")
        || lower.contains("nonce has already been used")
        || lower.contains("nonce expired")
    {
        WalletError::NonceExpired(message.to_string())
    } else if lower.contains("replacement transaction underpriced")
        || lower.contains("replacement underpriced")
    {
        WalletError::ReplacementUnderpriced(message.to_string())
    } else if lower.contains("insufficient funds") {
        WalletError::InsufficientFunds(message.to_string())
    } else {
        WalletError::Broadcast(message.to_string())
    }
}
