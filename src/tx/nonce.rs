//! Nonce sequencing for reliable transaction submission
//!
//! Handles:
//! - Local nonce tracking per address, reconciled against the network
//! - A single in-flight reservation per address
//! - Resync after the network reports a stale nonce

use crate::chain::ProviderClient;
use crate::error::{WalletError, WalletResult};

use dashmap::DashMap;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-address nonce state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceState {
    /// Nothing known locally; the next reservation reads the network
    Uninitialized,
    /// `next` is the nonce the following transaction will use
    Synced { next: u64 },
    /// `nonce` has been handed out and is in flight
    Reserved { nonce: u64 },
}

/// Hands out nonces, one in-flight reservation per address
pub struct NonceSequencer {
    provider: Arc<dyn ProviderClient>,
    /// Per-address state
    states: DashMap<Address, Arc<Mutex<NonceState>>>,
}

impl NonceSequencer {
    /// Create a new nonce sequencer
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            provider,
            states: DashMap::new(),
        }
    }

    fn slot(&self, address: Address) -> Arc<Mutex<NonceState>> {
        self.states
            .entry(address)
            .or_insert_with(|| Arc::new(Mutex::new(NonceState::Uninitialized)))
            .clone()
    }

    /// Current state for an address
    pub async fn state(&self, address: Address) -> NonceState {
        let slot = match self.states.get(&address) {
            Some(slot) => slot.clone(),
            None => return NonceState::Uninitialized,
        };
        let state = *slot.lock().await;
        state
    }

    /// Reserve the next nonce for `address`.
    ///
    /// Fails with `NonceReserved` while a previous reservation is outstanding.
    pub async fn next(&self, address: Address) -> WalletResult<u64> {
        let slot = self.slot(address);
        let mut state = slot.lock().await;

        let nonce = match *state {
            NonceState::Reserved { nonce } => {
                return Err(WalletError::NonceReserved {
                    address: format!("{:?}", address),
                    nonce,
                });
            }
            NonceState::Uninitialized => {
                let on_chain = self.fetch_nonce(address).await?;
                debug!("Initialized nonce for {:?}: {}", address, on_chain);
                on_chain
            }
            NonceState::Synced { next } => {
                let on_chain = self.fetch_nonce(address).await?;
                if on_chain > next {
                    warn!(
                        "Nonce gap for {:?}: local {}, network {}; adopting network",
                        address, next, on_chain
                    );
                    on_chain
                } else {
                    if on_chain < next {
                        debug!(
                            "Network nonce {} trails local {} for {:?}",
                            on_chain, next, address
                        );
                    }
                    next
                }
            }
        };

        *state = NonceState::Reserved { nonce };
        debug!("Reserved nonce {} for {:?}", nonce, address);
        Ok(nonce)
    }

    /// The reserved nonce was accepted by the network
    pub async fn confirm(&self, address: Address, nonce: u64) -> WalletResult<()> {
        let slot = self.slot(address);
        let mut state = slot.lock().await;

        match *state {
            NonceState::Reserved { nonce: reserved } if reserved == nonce => {
                *state = NonceState::Synced { next: nonce + 1 };
                debug!("Confirmed nonce {} for {:?}", nonce, address);
                Ok(())
            }
            other => Err(WalletError::Nonce {
                address: format!("{:?}", address),
                message: format!("cannot confirm {} in state {:?}", nonce, other),
            }),
        }
    }

    /// The reserved nonce was not used and may be handed out again
    pub async fn release(&self, address: Address, nonce: u64) -> WalletResult<()> {
        let slot = self.slot(address);
        let mut state = slot.lock().await;

        match *state {
            NonceState::Reserved { nonce: reserved } if reserved == nonce => {
                *state = NonceState::Synced { next: nonce };
                debug!("Released nonce {} for {:?}", nonce, address);
                Ok(())
            }
            other => Err(WalletError::Nonce {
                address: format!("{:?}", address),
                message: format!("cannot release {} in state {:?}", nonce, other),
            }),
        }
    }

    /// Forget local state so the next reservation reads the network
    pub async fn invalidate(&self, address: Address) {
        let slot = self.slot(address);
        *slot.lock().await = NonceState::Uninitialized;
        debug!("Invalidated nonce cache for {:?}", address);
    }

    /// Fetch nonce from chain
    async fn fetch_nonce(&self, address: Address) -> WalletResult<u64> {
        let count = self.provider.get_transaction_count(address).await?;
        crate::metrics::record_nonce_resync();
        if count > U256::from(u64::MAX) {
            return Err(WalletError::Nonce {
                address: format!("{:?}", address),
                message: format!("transaction count {} out of range", count),
            });
        }
        Ok(count.as_u64())
    }
}
