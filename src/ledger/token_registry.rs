use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::{
    underlying_address, underlying_token, HASHSTACK_V1_D_TOKENS, HASHSTACK_V1_POOL_TOKENS, HASHSTACK_V1_R_TOKENS,
    NOSTRA_ALPHA_TOKENS, NOSTRA_MAINNET_TOKENS, UNDERLYING_TOKENS,
};
use crate::types::{ProtocolId, StateError, StateResult};

/// 토큰 종류. Nostra는 심볼 규칙으로 추론한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Underlying,
    Collateral { interest_bearing: bool },
    Debt,
}

impl TokenKind {
    /// `d...` = debt, `n...-c` = non-interest-bearing collateral, `i...-c` = interest-bearing collateral
    pub fn from_nostra_symbol(symbol: &str) -> Option<Self> {
        let is_collateral = symbol.ends_with("-c");
        match symbol.chars().next()? {
            'd' if !is_collateral => Some(TokenKind::Debt),
            'n' if is_collateral => Some(TokenKind::Collateral { interest_bearing: false }),
            'i' if is_collateral => Some(TokenKind::Collateral { interest_bearing: true }),
            _ => None,
        }
    }
}

/// 레지스트리 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredToken {
    pub symbol: String,
    pub address: String,
    pub decimals: u32,
    pub underlying_address: String,
    pub kind: TokenKind,
}

/// Per-token risk settings collected before valuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSettings {
    pub symbol: String,
    pub address: String,
    pub decimals: u32,
    pub underlying_symbol: String,
    pub underlying_address: String,
    pub collateral_factor: Decimal,
    pub debt_factor: Decimal,
    pub liquidation_bonus: Decimal,
    pub is_interest_bearing: bool,
    pub liquidator_fee_beta: Decimal,
    pub liquidator_fee_max: Decimal,
    pub protocol_fee: Decimal,
}

impl TokenSettings {
    /// 중립 파라미터(factor 1, bonus 0)
    pub fn neutral(token: &RegisteredToken, underlying_symbol: &str) -> Self {
        Self {
            symbol: token.symbol.clone(),
            address: token.address.clone(),
            decimals: token.decimals,
            underlying_symbol: underlying_symbol.to_string(),
            underlying_address: token.underlying_address.clone(),
            collateral_factor: Decimal::ONE,
            debt_factor: Decimal::ONE,
            liquidation_bonus: Decimal::ZERO,
            is_interest_bearing: matches!(token.kind, TokenKind::Collateral { interest_bearing: true }),
            liquidator_fee_beta: Decimal::ZERO,
            liquidator_fee_max: Decimal::ZERO,
            protocol_fee: Decimal::ZERO,
        }
    }

    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn with_underlying(mut self, symbol: &str, address: &str) -> Self {
        self.underlying_symbol = symbol.to_string();
        self.underlying_address = address.to_string();
        self
    }

    pub fn with_collateral_factor(mut self, factor: Decimal) -> Self {
        self.collateral_factor = factor;
        self
    }

    pub fn with_debt_factor(mut self, factor: Decimal) -> Self {
        self.debt_factor = factor;
        self
    }

    pub fn with_liquidation_bonus(mut self, bonus: Decimal) -> Self {
        self.liquidation_bonus = bonus;
        self
    }

    pub fn with_liquidator_fees(mut self, beta: Decimal, max: Decimal, protocol_fee: Decimal) -> Self {
        self.liquidator_fee_beta = beta;
        self.liquidator_fee_max = max;
        self.protocol_fee = protocol_fee;
        self
    }
}

/// 프로토콜별 토큰 파라미터. 키는 포트폴리오에 쓰이는 토큰 주소
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenParameters {
    pub collateral: HashMap<String, TokenSettings>,
    pub debt: HashMap<String, TokenSettings>,
}

impl TokenParameters {
    pub fn is_empty(&self) -> bool {
        self.collateral.is_empty() && self.debt.is_empty()
    }
}

/// Immutable address -> token mapping for one protocol
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    protocol: ProtocolId,
    tokens: HashMap<String, RegisteredToken>,
}

impl TokenRegistry {
    pub fn new(protocol: ProtocolId, tokens: Vec<RegisteredToken>) -> Self {
        let tokens = tokens
            .into_iter()
            .map(|token| (token.address.clone(), token))
            .collect();
        Self { protocol, tokens }
    }

    /// 프로토콜의 기본 토큰 구성
    pub fn for_protocol(protocol: ProtocolId) -> Self {
        let mut tokens = underlying_tokens();
        match protocol {
            ProtocolId::ZkLend | ProtocolId::HashstackV0 => {}
            ProtocolId::NostraAlpha => tokens.extend(nostra_tokens(NOSTRA_ALPHA_TOKENS)),
            ProtocolId::NostraMainnet => tokens.extend(nostra_tokens(NOSTRA_MAINNET_TOKENS)),
            ProtocolId::HashstackV1 => {
                tokens.extend(wrapped_tokens(HASHSTACK_V1_R_TOKENS, TokenKind::Collateral { interest_bearing: true }));
                tokens.extend(wrapped_tokens(HASHSTACK_V1_D_TOKENS, TokenKind::Debt));
                tokens.extend(HASHSTACK_V1_POOL_TOKENS.iter().map(|(symbol, address, decimals)| RegisteredToken {
                    symbol: symbol.to_string(),
                    address: address.to_string(),
                    decimals: *decimals,
                    underlying_address: address.to_string(),
                    kind: TokenKind::Underlying,
                }));
            }
        }
        Self::new(protocol, tokens)
    }

    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    pub fn get(&self, address: &str) -> StateResult<&RegisteredToken> {
        self.tokens.get(address).ok_or_else(|| StateError::UnknownToken {
            protocol: self.protocol,
            address: address.to_string(),
        })
    }

    pub fn contains(&self, address: &str) -> bool {
        self.tokens.contains_key(address)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &RegisteredToken> {
        self.tokens.values()
    }

    pub fn tokens_of_kind(&self, kind: TokenKind) -> impl Iterator<Item = &RegisteredToken> {
        self.tokens.values().filter(move |token| token.kind == kind)
    }

    /// 기초 자산 주소로 특정 종류의 래핑 토큰 찾기
    pub fn find_wrapped(&self, underlying: &str, kind: TokenKind) -> Option<&RegisteredToken> {
        self.tokens
            .values()
            .find(|token| token.kind == kind && token.underlying_address == underlying)
    }

    /// 기초 자산 심볼
    pub fn underlying_symbol(&self, token: &RegisteredToken) -> String {
        self.tokens
            .get(&token.underlying_address)
            .map(|underlying| underlying.symbol.clone())
            .unwrap_or_else(|| token.symbol.clone())
    }

    /// 기초 자산 주소 -> 소수점 (가격 오라클 입력용)
    pub fn underlying_decimals(&self) -> HashMap<String, u32> {
        self.tokens
            .values()
            .filter(|token| underlying_token(&token.address).is_some())
            .map(|token| (token.address.clone(), token.decimals))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn underlying_tokens() -> Vec<RegisteredToken> {
    UNDERLYING_TOKENS
        .iter()
        .map(|(symbol, address, decimals)| RegisteredToken {
            symbol: symbol.to_string(),
            address: address.to_string(),
            decimals: *decimals,
            underlying_address: address.to_string(),
            kind: TokenKind::Underlying,
        })
        .collect()
}

fn underlying_decimals_of(symbol: &str) -> u32 {
    UNDERLYING_TOKENS
        .iter()
        .find(|(s, _, _)| *s == symbol)
        .map(|(_, _, decimals)| *decimals)
        .unwrap_or(18)
}

fn nostra_tokens(table: &[(&str, &str, &str)]) -> Vec<RegisteredToken> {
    table
        .iter()
        .filter_map(|(symbol, address, underlying)| {
            let kind = TokenKind::from_nostra_symbol(symbol)?;
            Some(RegisteredToken {
                symbol: symbol.to_string(),
                address: address.to_string(),
                decimals: underlying_decimals_of(underlying),
                underlying_address: underlying_address(underlying)?.to_string(),
                kind,
            })
        })
        .collect()
}

fn wrapped_tokens(table: &[(&str, &str, &str)], kind: TokenKind) -> Vec<RegisteredToken> {
    table
        .iter()
        .filter_map(|(symbol, address, underlying)| {
            Some(RegisteredToken {
                symbol: symbol.to_string(),
                address: address.to_string(),
                decimals: underlying_decimals_of(underlying),
                underlying_address: underlying_address(underlying)?.to_string(),
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nostra_symbol_inference() {
        assert_eq!(TokenKind::from_nostra_symbol("dETH"), Some(TokenKind::Debt));
        assert_eq!(
            TokenKind::from_nostra_symbol("nUSDC-c"),
            Some(TokenKind::Collateral { interest_bearing: false })
        );
        assert_eq!(
            TokenKind::from_nostra_symbol("iwstETH-c"),
            Some(TokenKind::Collateral { interest_bearing: true })
        );
        assert_eq!(TokenKind::from_nostra_symbol("dETH-c"), None);
        assert_eq!(TokenKind::from_nostra_symbol("ETH"), None);
        assert_eq!(TokenKind::from_nostra_symbol(""), None);
    }

    #[test]
    fn test_unknown_token_is_reported() {
        let registry = TokenRegistry::for_protocol(ProtocolId::ZkLend);
        let err = registry.get("0xdeadbeef").unwrap_err();
        assert_eq!(
            err,
            StateError::UnknownToken {
                protocol: ProtocolId::ZkLend,
                address: "0xdeadbeef".to_string()
            }
        );
        let eth = underlying_address("ETH").unwrap();
        assert_eq!(registry.get(eth).unwrap().decimals, 18);
    }

    #[test]
    fn test_nostra_mainnet_registry() {
        let registry = TokenRegistry::for_protocol(ProtocolId::NostraMainnet);
        let usdc = underlying_address("USDC").unwrap();
        let i_usdc = registry
            .find_wrapped(usdc, TokenKind::Collateral { interest_bearing: true })
            .unwrap();
        assert_eq!(i_usdc.symbol, "iUSDC-c");
        assert_eq!(i_usdc.decimals, 6);
        assert_eq!(registry.underlying_symbol(i_usdc), "USDC");
        assert_eq!(registry.tokens_of_kind(TokenKind::Debt).count(), 10);
    }

    #[test]
    fn test_hashstack_v1_registry_has_pools() {
        let registry = TokenRegistry::for_protocol(ProtocolId::HashstackV1);
        let pool = registry
            .get("0x01ea237607b7d9d2e9997aa373795929807552503683e35d8739f4dc46652de1")
            .unwrap();
        assert_eq!(pool.decimals, 6);
        // 풀 토큰은 오라클 대상이 아니다
        assert!(!registry.underlying_decimals().contains_key(&pool.address));
        assert_eq!(registry.underlying_decimals().len(), 10);
    }
}
