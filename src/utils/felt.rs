use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::Decimal;
use sha3::{Digest, Keccak256};
use std::str::FromStr;

/// `0x` 접두사 + 소문자 64자리 hex로 정규화
pub fn add_leading_zeros(hex: &str) -> String {
    let digits = hex.trim().trim_start_matches("0x").trim_start_matches("0X");
    format!("0x{:0>64}", digits.to_lowercase())
}

/// Parse a hex felt (with or without `0x`), or a decimal string
pub fn parse_felt(value: &str) -> Option<BigUint> {
    let value = value.trim();
    if let Some(digits) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        if digits.is_empty() {
            return Some(BigUint::zero());
        }
        return BigUint::parse_bytes(digits.as_bytes(), 16);
    }
    BigUint::parse_bytes(value.as_bytes(), 10)
}

/// Felt -> Decimal. Decimal 범위(96비트)를 넘으면 None
pub fn felt_to_decimal(value: &str) -> Option<Decimal> {
    let felt = parse_felt(value)?;
    match felt.to_u128() {
        Some(small) => Decimal::from_str(&small.to_string()).ok(),
        None => None,
    }
}

pub fn felt_to_u64(value: &str) -> Option<u64> {
    parse_felt(value)?.to_u64()
}

/// Starknet selector: keccak256 하위 250비트
pub fn get_selector_from_name(name: &str) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(name.as_bytes());
    let mut bytes: [u8; 32] = hasher.finalize().into();
    bytes[0] &= 0x03;
    format!("0x{}", hex::encode(bytes))
}

/// Cairo short string (e.g. a token symbol) decoded from a felt
pub fn felt_to_short_string(value: &str) -> Option<String> {
    let felt = parse_felt(value)?;
    let bytes = felt.to_bytes_be();
    let decoded: String = bytes
        .into_iter()
        .filter(|b| *b != 0)
        .map(char::from)
        .collect();
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_leading_zeros() {
        assert_eq!(
            add_leading_zeros("0x4C0A5193"),
            "0x000000000000000000000000000000000000000000000000000000004c0a5193"
        );
        assert_eq!(add_leading_zeros("0x0").len(), 66);
    }

    #[test]
    fn test_selector_matches_known_transfer_key() {
        assert_eq!(
            get_selector_from_name("Transfer"),
            "0x0099cd8bde557814842a3121e8ddfd433a539b8c9f14bf31ebf108d12e6196e9"
        );
    }

    #[test]
    fn test_felt_conversions() {
        assert_eq!(felt_to_decimal("0xde0b6b3a7640000"), Some(Decimal::from(1_000_000_000_000_000_000u64)));
        assert_eq!(felt_to_decimal("42"), Some(Decimal::from(42)));
        assert_eq!(felt_to_u64("0x10"), Some(16));
        assert!(felt_to_decimal("0xzz").is_none());
        assert!(felt_to_decimal("0x1000000000000000000000000000000000").is_none());
    }

    #[test]
    fn test_short_string() {
        // "ETH"
        assert_eq!(felt_to_short_string("0x455448").as_deref(), Some("ETH"));
    }
}
