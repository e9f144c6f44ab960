//! Error types for the wallet

use ethers::types::H256;
use thiserror::Error;

/// Main error type for key management and transaction submission
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid private key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Entropy source unavailable: {0}")]
    EntropyError(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid gas limit: {0}")]
    InvalidGasLimit(String),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Fee data error: {0}")]
    FeeData(String),

    #[error("Nonce {nonce} already reserved for {address}")]
    NonceReserved { address: String, nonce: u64 },

    #[error("Nonce error for {address}: {message}")]
    Nonce { address: String, message: String },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Nonce expired: {0}")]
    NonceExpired(String),

    #[error("Replacement transaction underpriced: {0}")]
    ReplacementUnderpriced(String),

    #[error("Broadcast rejected: {0}")]
    Broadcast(String),

    #[error("No receipt for {tx_hash:?} after {waited_secs}s; outcome unknown")]
    ConfirmationTimeout { tx_hash: H256, waited_secs: u64 },

    #[error("Stopped tracking {tx_hash:?}; transaction may still confirm")]
    Cancelled { tx_hash: H256 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalletError {
    /// The transaction was broadcast but its fate is not known yet
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            WalletError::ConfirmationTimeout { .. } | WalletError::Cancelled { .. }
        )
    }

    /// Check if the caller may reasonably try the same call again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WalletError::ChainConnection { .. }
                | WalletError::NonceExpired(_)
                | WalletError::NonceReserved { .. }
        )
    }

    /// Hash of the outstanding transaction, when the outcome is indeterminate
    pub fn pending_hash(&self) -> Option<H256> {
        match self {
            WalletError::ConfirmationTimeout { tx_hash, .. } | WalletError::Cancelled { tx_hash } => {
                Some(*tx_hash)
            }
            _ => None,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            WalletError::Config(_) => "config",
            WalletError::InvalidKeyFormat(_) => "invalid_key_format",
            WalletError::InvalidMnemonic(_) => "invalid_mnemonic",
            WalletError::EntropyError(_) => "entropy",
            WalletError::InvalidAddress(_) => "invalid_address",
            WalletError::InvalidAmount(_) => "invalid_amount",
            WalletError::InvalidData(_) => "invalid_data",
            WalletError::InvalidGasLimit(_) => "invalid_gas_limit",
            WalletError::ChainConnection { .. } => "chain_connection",
            WalletError::FeeData(_) => "fee_data",
            WalletError::NonceReserved { .. } => "nonce_reserved",
            WalletError::Nonce { .. } => "nonce",
            WalletError::Signing(_) => "signing",
            WalletError::InsufficientFunds(_) => "insufficient_funds",
            WalletError::NonceExpired(_) => "nonce_expired",
            WalletError::ReplacementUnderpriced(_) => "replacement_underpriced",
            WalletError::Broadcast(_) => "broadcast",
            WalletError::ConfirmationTimeout { .. } => "confirmation_timeout",
            WalletError::Cancelled { .. } => "cancelled",
            WalletError::Internal(_) => "internal",
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_indeterminate_not_failure() {
        let err = WalletError::ConfirmationTimeout {
            tx_hash: H256::repeat_byte(0xab),
            waited_secs: 30,
        };
        assert!(err.is_indeterminate());
        assert_eq!(err.pending_hash(), Some(H256::repeat_byte(0xab)));

        let err = WalletError::Broadcast("rejected".into());
        assert!(!err.is_indeterminate());
        assert_eq!(err.pending_hash(), None);
    }

    #[test]
    fn nonce_expired_is_retryable() {
        assert!(WalletError::NonceExpired("nonce too low".into()).is_retryable());
        assert!(!WalletError::InsufficientFunds("insufficient funds for gas".into()).is_retryable());
    }
}
