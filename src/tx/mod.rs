//! Transaction pipeline: fees, nonces, assembly and submission

mod builder;
mod gas;
mod nonce;
mod sender;

pub use builder::{ToAddress, TransactionBuilder, UnsignedTransaction, NATIVE_TRANSFER_GAS};
pub use gas::{FeeEstimator, FeeMode, FeePolicy, FeeSnapshot};
pub use nonce::{NonceSequencer, NonceState};
pub use sender::{Receipt, ReceiptStatus, SignedTransaction, TransactionSubmitter};
