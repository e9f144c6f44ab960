//! Ember Wallet - EVM key management and transaction submission
//!
//! Keys are generated or imported into [`KeyMaterial`], bound to a network
//! client by [`SigningWallet`], and sent through a pipeline of fee
//! estimation, nonce sequencing, assembly, signing, broadcast and receipt
//! tracking.

pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod tx;
pub mod utils;
pub mod wallet;

pub use chain::{ChainProvider, ProviderClient};
pub use config::Settings;
pub use error::{WalletError, WalletResult};
pub use keys::KeyMaterial;
pub use tx::{FeeEstimator, NonceSequencer, Receipt, TransactionBuilder, TransactionSubmitter};
pub use wallet::{SigningWallet, TransferRequest};
