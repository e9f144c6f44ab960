//! Key material: generation, import and address derivation
//!
//! SECURITY: private keys live only inside `KeyMaterial`.
//! - Held in an `ethers` `LocalWallet`, whose signing key zeroizes on drop
//! - Never serialized and never printed by `Debug`
//! - Exported only through the explicit `private_key_hex`

pub mod derivation;
pub mod mnemonic;

use crate::config::DEFAULT_DERIVATION_PATH;
use crate::error::{WalletError, WalletResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use sha3::{Digest, Keccak256};
use std::fmt;
use zeroize::Zeroizing;

/// Phrase and path a key was derived from
pub struct MnemonicPhrase {
    phrase: Zeroizing<String>,
    path: String,
}

impl MnemonicPhrase {
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A private key with its derived public key and address.
///
/// Not `Clone`: each key belongs to exactly one wallet.
pub struct KeyMaterial {
    signer: LocalWallet,
    /// Uncompressed SEC1 encoding, 0x04 prefix
    public_key: [u8; 65],
    address: Address,
    mnemonic: Option<MnemonicPhrase>,
}

impl KeyMaterial {
    /// Fresh key from OS entropy, with its 12-word phrase
    pub fn generate_random() -> WalletResult<Self> {
        let phrase = mnemonic::generate_phrase()?;
        Self::from_phrase(&phrase, None)
    }

    /// Import a 32-byte hex private key, `0x` prefix optional
    pub fn from_private_key(hex_key: &str) -> WalletResult<Self> {
        let trimmed = hex_key.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if body.len() != 64 {
            return Err(WalletError::InvalidKeyFormat(format!(
                "expected 64 hex characters, got {}",
                body.len()
            )));
        }

        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(body, &mut bytes[..])
            .map_err(|e| WalletError::InvalidKeyFormat(format!("invalid hex: {}", e)))?;

        Self::from_secret_bytes(&bytes[..], None)
    }

    /// Import from a BIP-39 phrase along `path` (default `m/44'/60'/0'/0/0`)
    pub fn from_phrase(phrase: &str, path: Option<&str>) -> WalletResult<Self> {
        let path = path.unwrap_or(DEFAULT_DERIVATION_PATH);
        let parsed = mnemonic::parse_phrase(phrase)?;
        let seed = mnemonic::phrase_to_seed(&parsed);
        let secret = derivation::derive_private_key(&seed[..], path)?;

        let mnemonic = MnemonicPhrase {
            phrase: Zeroizing::new(parsed.to_string()),
            path: path.to_string(),
        };
        Self::from_secret_bytes(&secret[..], Some(mnemonic))
    }

    fn from_secret_bytes(secret: &[u8], mnemonic: Option<MnemonicPhrase>) -> WalletResult<Self> {
        let signer = LocalWallet::from_bytes(secret).map_err(|_| {
            WalletError::InvalidKeyFormat("not a valid secp256k1 private key".to_string())
        })?;

        let encoded = signer.signer().verifying_key().to_encoded_point(false);
        let public_key: [u8; 65] = encoded.as_bytes().try_into().map_err(|_| {
            WalletError::Internal("unexpected public key encoding length".to_string())
        })?;
        let address = address_from_public_key(&public_key);

        Ok(Self {
            signer,
            public_key,
            address,
            mnemonic,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> &[u8; 65] {
        &self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.public_key))
    }

    pub fn mnemonic(&self) -> Option<&MnemonicPhrase> {
        self.mnemonic.as_ref()
    }

    /// Export the private key. Callers own what happens to it next.
    pub fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.signer.signer().to_bytes())))
    }

    /// Signer bound to `chain_id` for EIP-155 signatures
    pub(crate) fn signer_for_chain(&self, chain_id: u64) -> LocalWallet {
        self.signer.clone().with_chain_id(chain_id)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("address", &self.address)
            .field("has_mnemonic", &self.mnemonic.is_some())
            .finish_non_exhaustive()
    }
}

/// Last 20 bytes of keccak256 over the 64-byte public key body
pub fn address_from_public_key(public_key: &[u8; 65]) -> Address {
    let hash = Keccak256::digest(&public_key[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARDHAT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const HARDHAT_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const HARDHAT_PHRASE: &str = "test test test test test test test test test test test junk";
    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn private_key_import_derives_known_address() {
        let key = KeyMaterial::from_private_key(HARDHAT_KEY).unwrap();
        assert_eq!(key.address(), addr(HARDHAT_ADDRESS));
        assert!(key.mnemonic().is_none());
    }

    #[test]
    fn prefix_is_optional() {
        let with = KeyMaterial::from_private_key(HARDHAT_KEY).unwrap();
        let without = KeyMaterial::from_private_key(&HARDHAT_KEY[2..]).unwrap();
        assert_eq!(with.address(), without.address());
    }

    #[test]
    fn address_matches_ethers_derivation() {
        let key = KeyMaterial::from_private_key(HARDHAT_KEY).unwrap();
        let expected = ethers::utils::secret_key_to_address(key.signer.signer());
        assert_eq!(key.address(), expected);
        assert_eq!(key.address(), key.signer.address());
        assert_eq!(key.public_key()[0], 0x04);
    }

    #[test]
    fn derivation_is_stable() {
        let a = KeyMaterial::from_private_key(HARDHAT_KEY).unwrap();
        let b = KeyMaterial::from_private_key(HARDHAT_KEY).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(*a.private_key_hex(), HARDHAT_KEY);
    }

    #[test]
    fn rejects_bad_private_keys() {
        for bad in [
            "",
            "0x1234",
            "zz0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            // zero is not a valid scalar
            "0x0000000000000000000000000000000000000000000000000000000000000000",
            // above the curve order
            "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ] {
            assert!(
                matches!(KeyMaterial::from_private_key(bad), Err(WalletError::InvalidKeyFormat(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn phrase_import_matches_known_accounts() {
        let key = KeyMaterial::from_phrase(HARDHAT_PHRASE, None).unwrap();
        assert_eq!(key.address(), addr(HARDHAT_ADDRESS));

        let key = KeyMaterial::from_phrase(ABANDON, None).unwrap();
        assert_eq!(key.address(), addr("0x9858EfFD232B4033E47d90003D41EC34EcaEda94"));
        assert_eq!(key.mnemonic().unwrap().path(), DEFAULT_DERIVATION_PATH);
    }

    #[test]
    fn path_selects_account() {
        let first = KeyMaterial::from_phrase(HARDHAT_PHRASE, Some(&derivation::ethereum_path(0))).unwrap();
        let second = KeyMaterial::from_phrase(HARDHAT_PHRASE, Some(&derivation::ethereum_path(1))).unwrap();
        assert_eq!(first.address(), addr(HARDHAT_ADDRESS));
        assert_eq!(second.address(), addr("0x70997970C51812dc3A010C7d01b50e0d17dc79C8"));
    }

    #[test]
    fn rejects_bad_phrase() {
        assert!(matches!(
            KeyMaterial::from_phrase("test test test", None),
            Err(WalletError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn random_round_trips_through_phrase() {
        let original = KeyMaterial::generate_random().unwrap();
        let phrase = original.mnemonic().unwrap().phrase().to_string();
        let restored = KeyMaterial::from_phrase(&phrase, None).unwrap();
        assert_eq!(restored.address(), original.address());
        assert_eq!(*restored.private_key_hex(), *original.private_key_hex());
    }

    #[test]
    fn random_keys_are_distinct() {
        let a = KeyMaterial::generate_random().unwrap();
        let b = KeyMaterial::generate_random().unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn debug_hides_secrets() {
        let key = KeyMaterial::from_phrase(HARDHAT_PHRASE, None).unwrap();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains(&HARDHAT_KEY[2..]));
        assert!(!rendered.contains("junk"));
    }
}
