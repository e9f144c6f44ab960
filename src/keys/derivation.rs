//! BIP-32 derivation of secp256k1 keys

use crate::error::{WalletError, WalletResult};

use bip32::{DerivationPath, XPrv};
use zeroize::Zeroizing;

/// Derive the private key at `path` from a BIP-39 seed
pub fn derive_private_key(seed: &[u8], path: &str) -> WalletResult<Zeroizing<[u8; 32]>> {
    let path: DerivationPath = path
        .parse()
        .map_err(|e: bip32::Error| WalletError::InvalidMnemonic(format!("bad derivation path {}: {}", path, e)))?;

    let xprv = XPrv::derive_from_path(seed, &path)
        .map_err(|e| WalletError::InvalidMnemonic(format!("derivation failed: {}", e)))?;

    let private_key_bytes: [u8; 32] = xprv.to_bytes().into();
    Ok(Zeroizing::new(private_key_bytes))
}

/// Standard Ethereum path for account `index`
pub fn ethereum_path(index: u32) -> String {
    format!("m/44'/60'/0'/0/{}", index)
}
