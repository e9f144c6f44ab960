//! BIP-39 phrase generation and validation

use crate::error::{WalletError, WalletResult};

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

/// Entropy for a 12-word phrase
const ENTROPY_BYTES: usize = 16;

/// Generate a fresh 12-word English phrase from the OS entropy source
pub fn generate_phrase() -> WalletResult<Zeroizing<String>> {
    let mut entropy = [0u8; ENTROPY_BYTES];
    OsRng
        .try_fill_bytes(&mut entropy)
        .map_err(|e| WalletError::EntropyError(e.to_string()))?;

    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy);
    entropy.zeroize();

    let mnemonic = mnemonic.map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Parse a phrase, checking every word and the checksum
pub fn parse_phrase(phrase: &str) -> WalletResult<Mnemonic> {
    Mnemonic::parse_in_normalized(Language::English, phrase.trim())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Derive the 64-byte BIP-39 seed (empty passphrase)
pub fn phrase_to_seed(mnemonic: &Mnemonic) -> Zeroizing<[u8; 64]> {
    Zeroizing::new(mnemonic.to_seed(""))
}

/// Whether `word` is on the English word list
pub fn is_valid_word(word: &str) -> bool {
    Language::English.find_word(word).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn generates_twelve_valid_words() {
        let phrase = generate_phrase().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        assert!(parse_phrase(&phrase).is_ok());
    }

    #[test]
    fn rejects_bad_checksum() {
        let bad = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        assert!(matches!(parse_phrase(bad), Err(WalletError::InvalidMnemonic(_))));
    }

    #[test]
    fn rejects_unknown_word() {
        let bad = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon notaword";
        assert!(matches!(parse_phrase(bad), Err(WalletError::InvalidMnemonic(_))));
    }

    #[test]
    fn seed_matches_bip39_vector() {
        let seed = phrase_to_seed(&parse_phrase(ABANDON).unwrap());
        assert_eq!(
            hex::encode(&seed[..]),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1\
             9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn word_lookup() {
        assert!(is_valid_word("abandon"));
        assert!(is_valid_word("zoo"));
        assert!(!is_valid_word("notaword"));
    }
}
