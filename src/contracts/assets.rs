// src/contracts/assets.rs
//! Tradable asset symbols and their bytes32 encodings on the trading contract.

use crate::error::ClientError;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const SUPPORTED_SYMBOLS: [&str; 5] = ["ETH", "BTC", "AVAX", "APE", "UNI"];

/// Symbol -> right-padded ASCII bytes32, hex encoded with `0x`
pub static ASSET_SYMBOLS: Lazy<HashMap<&'static str, String>> = Lazy::new(|| {
    SUPPORTED_SYMBOLS
        .iter()
        .map(|symbol| (*symbol, encode_symbol(symbol)))
        .collect()
});

fn encode_symbol(symbol: &str) -> String {
    let mut bytes = [0u8; 32];
    bytes[..symbol.len()].copy_from_slice(symbol.as_bytes());
    format!("0x{}", hex::encode(bytes))
}

/// Case-insensitive lookup of a supported asset's bytes32 value
pub fn get_asset_bytes32(symbol: &str) -> Result<&'static str, ClientError> {
    let upper = symbol.trim().to_uppercase();
    ASSET_SYMBOLS
        .get(upper.as_str())
        .map(String::as_str)
        .ok_or_else(|| ClientError::UnsupportedAsset(symbol.to_string()))
}

/// Reverse lookup; bytes32 values outside the registry come back as `None`
pub fn symbol_for_bytes32(value: &str) -> Option<&'static str> {
    ASSET_SYMBOLS
        .iter()
        .find(|(_, encoded)| encoded.eq_ignore_ascii_case(value))
        .map(|(symbol, _)| *symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encodings() {
        assert_eq!(
            get_asset_bytes32("AVAX").unwrap(),
            "0x4156415800000000000000000000000000000000000000000000000000000000"
        );
        assert_eq!(
            get_asset_bytes32("uni").unwrap(),
            "0x554e490000000000000000000000000000000000000000000000000000000000"
        );
        assert_eq!(
            get_asset_bytes32("ETH").unwrap(),
            "0x4554480000000000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_unknown_symbol() {
        let err = get_asset_bytes32("DOGE").unwrap_err();
        assert_eq!(err.to_string(), "Asset DOGE not supported");
    }

    #[test]
    fn test_reverse_lookup() {
        let btc = get_asset_bytes32("BTC").unwrap();
        assert_eq!(symbol_for_bytes32(&btc.to_uppercase()), Some("BTC"));
        assert_eq!(symbol_for_bytes32("0x00"), None);
    }
}
