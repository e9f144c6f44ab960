//! Signing, broadcast and confirmation tracking
//!
//! Nothing here retries. A rejected broadcast reaches the caller with its
//! error kind, and a receipt wait that ends without an outcome is reported
//! as indeterminate rather than failed.

use super::builder::UnsignedTransaction;
use crate::chain::ProviderClient;
use crate::error::{WalletError, WalletResult};
use crate::keys::KeyMaterial;

use chrono::{DateTime, Utc};
use ethers::types::{Bytes, Signature, TransactionReceipt, H256, U256};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A signed transaction ready for broadcast. Immutable once built.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    unsigned: UnsignedTransaction,
    signature: Signature,
    raw: Bytes,
    hash: H256,
}

impl SignedTransaction {
    pub fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// RLP encoding sent to the network
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn hash(&self) -> H256 {
        self.hash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    /// Included in a block but execution reverted
    Failure,
}

/// Inclusion record for a mined transaction
#[derive(Debug, Clone)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub status: ReceiptStatus,
    pub gas_used: U256,
    pub effective_gas_price: Option<U256>,
    /// When this process observed the receipt
    pub confirmed_at: DateTime<Utc>,
}

impl Receipt {
    /// `None` until the node reports a block number
    fn from_mined(receipt: &TransactionReceipt) -> Option<Self> {
        let block_number = receipt.block_number?.as_u64();
        // Pre-Byzantium receipts carry a state root instead of a status
        let status = match receipt.status.map(|s| s.as_u64()) {
            Some(0) => ReceiptStatus::Failure,
            _ => ReceiptStatus::Success,
        };

        Some(Self {
            transaction_hash: receipt.transaction_hash,
            block_number,
            status,
            gas_used: receipt.gas_used.unwrap_or_default(),
            effective_gas_price: receipt.effective_gas_price,
            confirmed_at: Utc::now(),
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// Signs, broadcasts and waits for transactions on one chain
pub struct TransactionSubmitter {
    provider: Arc<dyn ProviderClient>,
    chain_id: u64,
    poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl TransactionSubmitter {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        chain_id: u64,
        poll_interval: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            chain_id,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            confirmation_timeout,
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    /// Sign with RFC-6979 ECDSA under EIP-155 replay protection
    pub fn sign(
        &self,
        unsigned: &UnsignedTransaction,
        key: &KeyMaterial,
    ) -> WalletResult<SignedTransaction> {
        if unsigned.chain_id != self.chain_id {
            return Err(WalletError::Signing(format!(
                "transaction is for chain {}, submitter is bound to {}",
                unsigned.chain_id, self.chain_id
            )));
        }

        let typed = unsigned.to_typed();
        let signature = key
            .signer_for_chain(unsigned.chain_id)
            .sign_transaction_sync(&typed)
            .map_err(|e| WalletError::Signing(e.to_string()))?;

        let raw = typed.rlp_signed(&signature);
        let hash = typed.hash(&signature);
        debug!("Signed nonce {} from {:?} as {:?}", unsigned.nonce, key.address(), hash);

        Ok(SignedTransaction {
            unsigned: unsigned.clone(),
            signature,
            raw,
            hash,
        })
    }

    /// Send the raw transaction once. Rejections come back classified.
    pub async fn broadcast(&self, signed: &SignedTransaction) -> WalletResult<H256> {
        match self.provider.send_raw_transaction(signed.raw.clone()).await {
            Ok(returned) => {
                if returned != signed.hash {
                    warn!(
                        "Node returned hash {:?} for transaction {:?}",
                        returned, signed.hash
                    );
                }
                info!(
                    "Transaction sent: {:?} (nonce {}, chain {})",
                    signed.hash, signed.unsigned.nonce, self.chain_id
                );
                crate::metrics::record_tx_submitted(self.chain_id);
                Ok(signed.hash)
            }
            Err(e) => {
                warn!("Broadcast of {:?} rejected: {}", signed.hash, e);
                crate::metrics::record_tx_failed(self.chain_id, e.kind());
                Err(e)
            }
        }
    }

    /// Poll until the transaction is mined.
    ///
    /// Ends with `ConfirmationTimeout` after `timeout` or `Cancelled` once
    /// `cancel` resolves; the transaction stays outstanding in both cases.
    pub async fn wait_for_receipt<C>(
        &self,
        tx_hash: H256,
        timeout: Duration,
        cancel: C,
    ) -> WalletResult<Receipt>
    where
        C: Future<Output = ()>,
    {
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = cancel => {
                info!("Stopped waiting for {:?} on request", tx_hash);
                return Err(WalletError::Cancelled { tx_hash });
            }
            outcome = tokio::time::timeout(timeout, self.poll_until_mined(tx_hash)) => outcome,
        };

        let receipt = match outcome {
            Ok(receipt) => receipt?,
            Err(_) => {
                warn!("No receipt for {:?} after {:?}", tx_hash, timeout);
                crate::metrics::record_confirmation_timeout(self.chain_id);
                return Err(WalletError::ConfirmationTimeout {
                    tx_hash,
                    waited_secs: timeout.as_secs(),
                });
            }
        };

        crate::metrics::record_tx_latency(self.chain_id, started.elapsed().as_secs_f64());
        crate::metrics::record_tx_confirmed(self.chain_id, receipt.is_success());

        match receipt.status {
            ReceiptStatus::Success => info!(
                "Transaction {:?} confirmed in block {}",
                tx_hash, receipt.block_number
            ),
            ReceiptStatus::Failure => warn!(
                "Transaction {:?} reverted in block {}",
                tx_hash, receipt.block_number
            ),
        }

        Ok(receipt)
    }

    async fn poll_until_mined(&self, tx_hash: H256) -> WalletResult<Receipt> {
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            interval.tick().await;

            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(raw)) => match Receipt::from_mined(&raw) {
                    Some(receipt) => return Ok(receipt),
                    None => debug!("Receipt for {:?} has no block yet", tx_hash),
                },
                Ok(None) => debug!("Transaction {:?} still pending", tx_hash),
                Err(e) if e.is_retryable() => {
                    warn!("Receipt lookup for {:?} failed, polling again: {}", tx_hash, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sign, broadcast and wait with the configured timeout
    pub async fn submit(
        &self,
        unsigned: &UnsignedTransaction,
        key: &KeyMaterial,
    ) -> WalletResult<Receipt> {
        let signed = self.sign(unsigned, key)?;
        let tx_hash = self.broadcast(&signed).await?;
        self.wait_for_receipt(tx_hash, self.confirmation_timeout, std::future::pending::<()>())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockProviderClient;
    use crate::tx::{FeePolicy, TransactionBuilder};
    use ethers::types::U64;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HARDHAT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const CHAIN_ID: u64 = 31337;

    fn unsigned(fee: FeePolicy) -> UnsignedTransaction {
        TransactionBuilder::new(CHAIN_ID)
            .build(RECIPIENT, U256::exp10(18), 0, &fee, 21_000, None)
            .unwrap()
    }

    fn legacy() -> FeePolicy {
        FeePolicy::Legacy(U256::from(1_000_000_000u64))
    }

    fn submitter(provider: MockProviderClient) -> TransactionSubmitter {
        TransactionSubmitter::new(
            Arc::new(provider),
            CHAIN_ID,
            Duration::from_millis(5),
            Duration::from_secs(1),
        )
    }

    fn mined(tx_hash: H256, status: u64) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(12)),
            status: Some(U64::from(status)),
            gas_used: Some(U256::from(21_000)),
            ..Default::default()
        }
    }

    #[test]
    fn signing_is_deterministic_and_recoverable() {
        let key = KeyMaterial::from_private_key(HARDHAT_KEY).unwrap();
        let submitter = submitter(MockProviderClient::new());

        for fee in [
            legacy(),
            FeePolicy::Eip1559 {
                max_fee_per_gas: U256::from(30_000_000_000u64),
                max_priority_fee_per_gas: U256::from(2_000_000_000u64),
            },
        ] {
            let tx = unsigned(fee);
            let first = submitter.sign(&tx, &key).unwrap();
            let second = submitter.sign(&tx, &key).unwrap();

            assert_eq!(first.raw(), second.raw());
            assert_eq!(first.hash(), crate::utils::codec::keccak256(&first.raw()[..]));

            let sighash = tx.to_typed().sighash();
            assert_eq!(first.signature().recover(sighash).unwrap(), key.address());
        }
    }

    #[test]
    fn refuses_other_chain() {
        let key = KeyMaterial::from_private_key(HARDHAT_KEY).unwrap();
        let tx = TransactionBuilder::new(1)
            .build(RECIPIENT, U256::zero(), 0, &legacy(), 21_000, None)
            .unwrap();
        assert!(matches!(
            submitter(MockProviderClient::new()).sign(&tx, &key),
            Err(WalletError::Signing(_))
        ));
    }

    #[tokio::test]
    async fn broadcast_rejection_is_propagated() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_send_raw_transaction()
            .times(1)
            .returning(|_| Err(WalletError::NonceExpired("nonce too low".to_string())));

        let key = KeyMaterial::from_private_key(HARDHAT_KEY).unwrap();
        let submitter = submitter(provider);
        let signed = submitter.sign(&unsigned(legacy()), &key).unwrap();

        assert!(matches!(
            submitter.broadcast(&signed).await,
            Err(WalletError::NonceExpired(msg)) if msg == "nonce too low"
        ));
    }

    #[tokio::test]
    async fn waits_until_block_number_appears() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        let mut provider = MockProviderClient::new();
        provider.expect_get_transaction_receipt().returning(move |hash| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(None),
                // known to the node but not yet in a block
                1 => Ok(Some(TransactionReceipt {
                    transaction_hash: hash,
                    ..Default::default()
                })),
                _ => Ok(Some(mined(hash, 1))),
            }
        });

        let hash = H256::repeat_byte(0x42);
        let receipt = submitter(provider)
            .wait_for_receipt(hash, Duration::from_secs(1), std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(receipt.transaction_hash, hash);
        assert_eq!(receipt.block_number, 12);
        assert!(receipt.is_success());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reverted_receipt_is_returned_not_raised() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_get_transaction_receipt()
            .returning(|hash| Ok(Some(mined(hash, 0))));

        let receipt = submitter(provider)
            .wait_for_receipt(H256::repeat_byte(1), Duration::from_secs(1), std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Failure);
    }

    #[tokio::test]
    async fn timeout_is_indeterminate() {
        let mut provider = MockProviderClient::new();
        provider.expect_get_transaction_receipt().returning(|_| Ok(None));

        let hash = H256::repeat_byte(0x07);
        let err = submitter(provider)
            .wait_for_receipt(hash, Duration::from_millis(50), std::future::pending::<()>())
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::ConfirmationTimeout { tx_hash, .. } if tx_hash == hash));
        assert!(err.is_indeterminate());
    }

    #[tokio::test]
    async fn cancellation_stops_polling() {
        let mut provider = MockProviderClient::new();
        provider.expect_get_transaction_receipt().returning(|_| Ok(None));

        let hash = H256::repeat_byte(0x08);
        let err = submitter(provider)
            .wait_for_receipt(
                hash,
                Duration::from_secs(30),
                tokio::time::sleep(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::Cancelled { tx_hash } if tx_hash == hash));
        assert!(err.is_indeterminate());
    }

    #[tokio::test]
    async fn transient_poll_errors_keep_polling() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        let mut provider = MockProviderClient::new();
        provider.expect_get_transaction_receipt().returning(move |hash| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(WalletError::ChainConnection {
                    chain_id: CHAIN_ID,
                    message: "connection reset".to_string(),
                })
            } else {
                Ok(Some(mined(hash, 1)))
            }
        });

        let receipt = submitter(provider)
            .wait_for_receipt(H256::repeat_byte(9), Duration::from_secs(1), std::future::pending::<()>())
            .await
            .unwrap();
        assert!(receipt.is_success());
    }

    #[tokio::test]
    async fn submit_runs_the_whole_pipeline() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_send_raw_transaction()
            .times(1)
            .returning(|raw| Ok(crate::utils::codec::keccak256(&raw[..])));
        provider
            .expect_get_transaction_receipt()
            .returning(|hash| Ok(Some(mined(hash, 1))));

        let key = KeyMaterial::from_private_key(HARDHAT_KEY).unwrap();
        let tx = unsigned(legacy());
        let submitter = submitter(provider);
        let expected = submitter.sign(&tx, &key).unwrap().hash();

        let receipt = submitter.submit(&tx, &key).await.unwrap();
        assert_eq!(receipt.transaction_hash, expected);
    }
}
