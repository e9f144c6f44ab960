//! Hashing, hex, base64 and address helpers

use crate::error::{WalletError, WalletResult};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ethers::types::{Address, H256};
use ethers::utils::to_checksum;
use sha2::Sha256;
use sha3::{Digest, Keccak256};

pub fn keccak256(data: impl AsRef<[u8]>) -> H256 {
    H256::from_slice(&Keccak256::digest(data.as_ref()))
}

/// keccak256 of the UTF-8 bytes of `text`
pub fn id(text: &str) -> H256 {
    keccak256(text.as_bytes())
}

/// 4-byte function selector for a canonical signature such as `transfer(address,uint256)`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = id(signature);
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.as_bytes()[..4]);
    out
}

pub fn sha256(data: impl AsRef<[u8]>) -> H256 {
    H256::from_slice(&Sha256::digest(data.as_ref()))
}

pub fn encode_base64(data: impl AsRef<[u8]>) -> String {
    STANDARD.encode(data)
}

pub fn decode_base64(encoded: &str) -> WalletResult<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| WalletError::InvalidData(format!("invalid base64: {}", e)))
}

/// `0x`-prefixed lowercase hex
pub fn hexlify(data: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(data))
}

/// Whether `value` is `0x` followed by hex digits, optionally of exactly `length` bytes
pub fn is_hex_string(value: &str, length: Option<usize>) -> bool {
    let body = match value.strip_prefix("0x") {
        Some(body) => body,
        None => return false,
    };
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    match length {
        Some(bytes) => body.len() == bytes * 2,
        None => true,
    }
}

/// Parse a 20-byte address, `0x` optional.
///
/// Mixed-case input must carry a valid EIP-55 checksum.
pub fn parse_address(value: &str) -> WalletResult<Address> {
    let trimmed = value.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if body.len() != 40 {
        return Err(WalletError::InvalidAddress(format!(
            "expected 40 hex characters, got {}",
            body.len()
        )));
    }

    let mut bytes = [0u8; 20];
    hex::decode_to_slice(body, &mut bytes)
        .map_err(|e| WalletError::InvalidAddress(format!("invalid hex in {}: {}", value, e)))?;
    let address = Address::from(bytes);

    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower && to_checksum(&address, None)[2..] != *body {
        return Err(WalletError::InvalidAddress(format!("bad checksum: {}", value)));
    }

    Ok(address)
}

pub fn is_address(value: &str) -> bool {
    parse_address(value).is_ok()
}

/// Left-pad `data` with zero bytes to `length`
pub fn zero_pad_value(data: &[u8], length: usize) -> WalletResult<Vec<u8>> {
    if data.len() > length {
        return Err(WalletError::InvalidData(format!(
            "{} bytes do not fit in {}",
            data.len(),
            length
        )));
    }
    let mut padded = vec![0u8; length - data.len()];
    padded.extend_from_slice(data);
    Ok(padded)
}
