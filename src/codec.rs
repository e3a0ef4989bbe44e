//! Numeric Codec
//!
//! Lossless hex text form for 256-bit quantities so they survive JSON
//! transport without float truncation:
//!
//! ```text
//! 0      -> "0x0"
//! 255    -> "0xff"
//! absent -> null
//! ```
//!
//! Also decodes the raw `getReserves()` return data delivered by the relay
//! network's `ethOnBlock` stream.
//!
//! Created: 2026-02-03

use crate::types::PairReserve;
use alloy::primitives::{Address, U256};
use thiserror::Error;

/// Hex prefix every encoded quantity must carry
pub const HEX_PREFIX: &str = "0x";

/// Literal JSON null token
pub const NULL_TOKEN: &str = "null";

/// Byte length of an ABI-encoded `(uint112, uint112, uint32)` tuple
const GET_RESERVES_RETURN_LEN: usize = 96;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("{0} does NOT start with \"0x\"")]
    MissingPrefix(String),
    #[error("not a valid hex quantity: {0}")]
    InvalidHex(String),
    #[error("returned data too short: {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },
}

/// Encode a quantity as `0x` + minimal lowercase hex.
pub fn encode(value: &U256) -> String {
    format!("0x{:x}", value)
}

/// Decode a `0x`-prefixed hex quantity.
pub fn decode(s: &str) -> Result<U256, CodecError> {
    let digits = s
        .strip_prefix(HEX_PREFIX)
        .ok_or_else(|| CodecError::MissingPrefix(s.to_string()))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidHex(s.to_string()));
    }
    U256::from_str_radix(digits, 16).map_err(|_| CodecError::InvalidHex(s.to_string()))
}

/// Encode an optional quantity as a raw JSON token (`"0x.."` or `null`).
pub fn encode_token(value: Option<&U256>) -> String {
    match value {
        Some(v) => format!("\"{}\"", encode(v)),
        None => NULL_TOKEN.to_string(),
    }
}

/// Decode a raw JSON token. `null` leaves the target unset.
pub fn decode_token(token: &str) -> Result<Option<U256>, CodecError> {
    let token = token.trim();
    if token == NULL_TOKEN {
        return Ok(None);
    }
    let inner = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token);
    decode(inner).map(Some)
}

/// Parse a vendor quantity string: `0x`-hex goes through [`decode`],
/// anything else is read as a decimal integer.
pub fn parse_quantity(s: &str) -> Result<U256, CodecError> {
    if s.starts_with(HEX_PREFIX) {
        return decode(s);
    }
    U256::from_str_radix(s, 10).map_err(|_| CodecError::InvalidHex(s.to_string()))
}

/// Decode `getReserves()` returned data into a reserve snapshot.
///
/// Layout: three 32-byte words. The third word's low 32 bits carry
/// `blockTimestampLast`.
pub fn decode_get_reserves(
    pair: Address,
    hex_str: &str,
    block_number: i64,
) -> Result<PairReserve, CodecError> {
    let digits = hex_str
        .strip_prefix(HEX_PREFIX)
        .ok_or_else(|| CodecError::MissingPrefix(hex_str.to_string()))?;
    let bytes =
        alloy::hex::decode(digits).map_err(|_| CodecError::InvalidHex(hex_str.to_string()))?;
    if bytes.len() < GET_RESERVES_RETURN_LEN {
        return Err(CodecError::Truncated {
            got: bytes.len(),
            need: GET_RESERVES_RETURN_LEN,
        });
    }

    let mut ts = [0u8; 4];
    ts.copy_from_slice(&bytes[92..96]);

    Ok(PairReserve {
        pair,
        reserve0: U256::from_be_slice(&bytes[0..32]),
        reserve1: U256::from_be_slice(&bytes[32..64]),
        block_timestamp_last: u32::from_be_bytes(ts),
        block_number,
    })
}

/// `#[serde(with = "crate::codec::hex")]` for `U256` fields
pub mod hex {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "crate::codec::hex_opt")]` for `Option<U256>` fields
pub mod hex_opt {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<U256>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&super::encode(v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<U256>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => super::decode(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
