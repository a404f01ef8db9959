//! Nostra Alpha / Mainnet 공통 이벤트 처리.
//!
//! 사용자 단위 원장이며, 담보는 interest-bearing(`i...-c`)과 non-interest-bearing(`n...-c`)
//! 두 하위 포트폴리오의 합이다. 이벤트는 emitter 주소로 라우팅한다.

pub mod alpha;
pub mod mainnet;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::ChainReader;
use crate::constants::{
    NOSTRA_ALPHA_CDP_MANAGER, NOSTRA_ALPHA_DEFERRED_BATCH_CALL_ADAPTER, NOSTRA_ALPHA_INTEREST_RATE_MODEL,
    NOSTRA_MAINNET_CDP_MANAGER, NOSTRA_MAINNET_IGNORED_USER, NOSTRA_MAINNET_INTEREST_RATE_MODEL,
    NOSTRA_SCALE_DECIMALS, ZERO_ADDRESS,
};
use crate::events::Event;
use crate::ledger::{LoanDetails, LoanEntity, Portfolio, TokenKind, TokenParameters, TokenRegistry};
use crate::state::{EntityRole, ProtocolState};
use crate::types::{LoanEntityId, ProtocolId, StateError, StateResult};
use crate::utils::math::pow10;

/// 청산 후 목표 health factor (1.25)
pub const TARGET_HEALTH_FACTOR: Decimal = Decimal::from_parts(125, 0, 0, false, 2);

/// Nostra 배포별 주소
#[derive(Debug, Clone, Copy)]
pub struct NostraDeployment {
    pub interest_rate_model: &'static str,
    pub cdp_manager: &'static str,
    /// 잔고를 추적하지 않는 컨트랙트 계정
    pub ignored_user: &'static str,
}

impl NostraDeployment {
    pub fn for_protocol(protocol: ProtocolId) -> Self {
        match protocol {
            ProtocolId::NostraMainnet => Self {
                interest_rate_model: NOSTRA_MAINNET_INTEREST_RATE_MODEL,
                cdp_manager: NOSTRA_MAINNET_CDP_MANAGER,
                ignored_user: NOSTRA_MAINNET_IGNORED_USER,
            },
            _ => Self {
                interest_rate_model: NOSTRA_ALPHA_INTEREST_RATE_MODEL,
                cdp_manager: NOSTRA_ALPHA_CDP_MANAGER,
                ignored_user: NOSTRA_ALPHA_DEFERRED_BATCH_CALL_ADAPTER,
            },
        }
    }
}

/// Decoded Nostra event
#[derive(Debug, Clone, PartialEq)]
pub enum NostraEvent {
    InterestStateUpdated {
        debt_token: String,
        lending_index: Decimal,
        borrow_index: Decimal,
    },
    Mint { token: String, user: String, face_amount: Decimal },
    Burn { token: String, user: String, face_amount: Decimal },
    Transfer { token: String, sender: String, recipient: String, value: Decimal },
}

/// 컴포넌트 경로를 포함한 이벤트 이름을 짧은 이름으로
fn canonical_name(key_name: &str) -> Option<&'static str> {
    match key_name {
        "InterestStateUpdated"
        | "nostra::lending::interest_rate_model::interest_rate_model::InterestRateModel::InterestStateUpdated" => {
            Some("InterestStateUpdated")
        }
        "Transfer"
        | "openzeppelin::token::erc20_v070::erc20::ERC20::Transfer"
        | "openzeppelin::token::erc20::erc20::ERC20Component::Transfer"
        | "nstr::openzeppelin::token::erc20_v070::erc20::ERC20Starkgate::Transfer" => Some("Transfer"),
        "Mint" | "nostra::core::tokenization::lib::nostra_token::NostraTokenComponent::Mint" => Some("Mint"),
        "Burn" | "nostra::core::tokenization::lib::nostra_token::NostraTokenComponent::Burn" => Some("Burn"),
        _ => None,
    }
}

/// 같은 트랜잭션 안에서 이자 인덱스 갱신 -> 이동 -> 소각 -> 발행 순
pub fn event_priority(key_name: &str) -> u8 {
    match key_name {
        "InterestStateUpdated" => 0,
        "nostra::lending::interest_rate_model::interest_rate_model::InterestRateModel::InterestStateUpdated" => 1,
        "Transfer" => 2,
        "openzeppelin::token::erc20_v070::erc20::ERC20::Transfer" => 3,
        "openzeppelin::token::erc20::erc20::ERC20Component::Transfer" => 4,
        "nstr::openzeppelin::token::erc20_v070::erc20::ERC20Starkgate::Transfer" => 5,
        "Burn" => 6,
        "nostra::core::tokenization::lib::nostra_token::NostraTokenComponent::Burn" => 7,
        "Mint" => 8,
        "nostra::core::tokenization::lib::nostra_token::NostraTokenComponent::Mint" => 9,
        _ => u8::MAX,
    }
}

/// 담보/부채 토큰 전부와 이자율 모델
pub fn event_addresses(protocol: ProtocolId, registry: &TokenRegistry) -> Vec<String> {
    let deployment = NostraDeployment::for_protocol(protocol);
    let mut addresses: Vec<String> = registry
        .tokens()
        .filter(|token| token.kind != TokenKind::Underlying)
        .map(|token| token.address.clone())
        .collect();
    addresses.sort();
    addresses.push(deployment.interest_rate_model.to_string());
    addresses
}

impl NostraEvent {
    pub fn decode(event: &Event, protocol: ProtocolId, registry: &TokenRegistry) -> StateResult<Option<Self>> {
        let Some(name) = canonical_name(&event.key_name) else {
            return Ok(None);
        };
        let emitter = event.emitter();
        let deployment = NostraDeployment::for_protocol(protocol);

        if emitter == deployment.interest_rate_model {
            if name != "InterestStateUpdated" {
                return Ok(None);
            }
            // data: debtToken, lendingRate, _, borrowRate, _, lendIndex, _, borrowIndex, _
            let scale = pow10(NOSTRA_SCALE_DECIMALS);
            let debt_token = event.address_at(0)?;
            registry.get(&debt_token)?;
            return Ok(Some(NostraEvent::InterestStateUpdated {
                debt_token,
                lending_index: event.amount_at(5)? / scale,
                borrow_index: event.amount_at(7)? / scale,
            }));
        }

        let token = registry.get(&emitter)?;
        if token.kind == TokenKind::Underlying {
            return Ok(None);
        }
        let token = token.address.clone();
        let decoded = match name {
            // data: user, amount, _
            "Mint" => NostraEvent::Mint {
                token,
                user: event.address_at(0)?,
                face_amount: event.amount_at(1)?,
            },
            "Burn" => NostraEvent::Burn {
                token,
                user: event.address_at(0)?,
                face_amount: event.amount_at(1)?,
            },
            "Transfer" => {
                let (sender, recipient, value) = transfer_parts(event)?;
                NostraEvent::Transfer { token, sender, recipient, value }
            }
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

/// Cairo 1 OZ 레이아웃은 keys = [selector, from, to], data = [low, high].
/// 레거시 레이아웃은 data = [sender, recipient, low, high].
fn transfer_parts(event: &Event) -> StateResult<(String, String, Decimal)> {
    if event.keys.len() >= 3 {
        Ok((event.key_address_at(1)?, event.key_address_at(2)?, u256_at(event, 0)?))
    } else {
        Ok((event.address_at(0)?, event.address_at(1)?, u256_at(event, 2)?))
    }
}

/// u256 (low, high). high가 0이 아니면 Decimal 범위를 넘는다.
fn u256_at(event: &Event, low_index: usize) -> StateResult<Decimal> {
    let low = event.amount_at(low_index)?;
    if let Some(high) = event.data.get(low_index + 1) {
        let high = crate::utils::felt::felt_to_decimal(high).unwrap_or(Decimal::ONE);
        if !high.is_zero() {
            return Err(StateError::malformed(event.name(), "u256 high word out of range"));
        }
    }
    Ok(low)
}

pub fn apply_event(state: &mut ProtocolState, event: &Event) -> StateResult<bool> {
    let protocol = state.protocol;
    let Some(decoded) = NostraEvent::decode(event, protocol, &state.registry)? else {
        return Ok(false);
    };
    let ignored_user = NostraDeployment::for_protocol(protocol).ignored_user;

    match decoded {
        NostraEvent::InterestStateUpdated {
            debt_token,
            lending_index,
            borrow_index,
        } => {
            let registry = state.registry.clone();
            let underlying = &registry.get(&debt_token)?.underlying_address;
            if let Some(collateral) = registry.find_wrapped(underlying, TokenKind::Collateral { interest_bearing: true }) {
                state.interest_rate_models.collateral.update(&collateral.address, lending_index);
            }
            state.interest_rate_models.debt.update(&debt_token, borrow_index);
        }
        NostraEvent::Mint { token, user, face_amount } => {
            if user == ignored_user {
                return Ok(false);
            }
            move_balance(state, &token, &user, face_amount, EntityRole::Opening, true, event)?;
        }
        NostraEvent::Burn { token, user, face_amount } => {
            if user == ignored_user {
                return Ok(false);
            }
            move_balance(state, &token, &user, -face_amount, EntityRole::Continuing, true, event)?;
        }
        NostraEvent::Transfer {
            token,
            sender,
            recipient,
            value,
        } => {
            // mint/burn은 별도 이벤트로 처리된다
            if sender == ZERO_ADDRESS || recipient == ZERO_ADDRESS {
                return Ok(false);
            }
            if sender != ignored_user {
                move_balance(state, &token, &sender, -value, EntityRole::Continuing, false, event)?;
            }
            if recipient != ignored_user {
                move_balance(state, &token, &recipient, value, EntityRole::Opening, false, event)?;
            }
        }
    }
    Ok(true)
}

/// 토큰 종류에 맞는 포트폴리오에 반영. `from_face`면 이자 인덱스로 raw 환산한다.
fn move_balance(
    state: &mut ProtocolState,
    token: &str,
    user: &str,
    amount: Decimal,
    role: EntityRole,
    from_face: bool,
    event: &Event,
) -> StateResult<()> {
    let kind = state.registry.get(token)?.kind;
    let raw_amount = match (kind, from_face) {
        (_, false) => amount,
        (TokenKind::Debt, true) => state.interest_rate_models.debt.to_raw(token, amount),
        (TokenKind::Collateral { interest_bearing: true }, true) => {
            state.interest_rate_models.collateral.to_raw(token, amount)
        }
        (_, true) => amount,
    };
    debug!("Nostra {} {} {} raw {}", event.name(), user, token, raw_amount);

    let entity = state.entity_for_event(LoanEntityId::User(user.to_string()), user, role, event);
    match kind {
        TokenKind::Debt => entity.debt.increase_value(token, raw_amount)?,
        TokenKind::Collateral { interest_bearing } => {
            let (interest_bearing_collateral, non_interest_bearing_collateral) = nostra_parts(entity)?;
            if interest_bearing {
                interest_bearing_collateral.increase_value(token, raw_amount)?;
            } else {
                non_interest_bearing_collateral.increase_value(token, raw_amount)?;
            }
            entity.recompute_collateral();
        }
        TokenKind::Underlying => {}
    }
    Ok(())
}

fn nostra_parts(entity: &mut LoanEntity) -> StateResult<(&mut Portfolio, &mut Portfolio)> {
    match &mut entity.details {
        LoanDetails::Nostra {
            interest_bearing_collateral,
            non_interest_bearing_collateral,
        } => Ok((interest_bearing_collateral, non_interest_bearing_collateral)),
        _ => Err(StateError::InconsistentLoan {
            loan_id: entity.user.clone(),
            reason: "entity is not a Nostra entity".to_string(),
        }),
    }
}

/// 담보/부채 토큰별 CDP 파라미터 수집. 실패한 토큰은 건너뛴다.
pub async fn collect_token_parameters(
    protocol: ProtocolId,
    registry: &TokenRegistry,
    reader: &dyn ChainReader,
) -> TokenParameters {
    let deployment = NostraDeployment::for_protocol(protocol);
    let mut parameters = TokenParameters::default();

    let mut tokens: Vec<_> = registry.tokens().filter(|token| token.kind != TokenKind::Underlying).collect();
    tokens.sort_by(|a, b| a.address.cmp(&b.address));

    for token in tokens {
        let result = match protocol {
            ProtocolId::NostraMainnet => mainnet::token_settings(registry, token, deployment.cdp_manager, reader).await,
            _ => alpha::token_settings(registry, token, deployment.cdp_manager, reader).await,
        };
        let settings = match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("⚠️ {} {} 파라미터 수집 실패: {}", protocol, token.symbol, e);
                continue;
            }
        };
        match token.kind {
            TokenKind::Debt => parameters.debt.insert(token.address.clone(), settings),
            _ => parameters.collateral.insert(token.address.clone(), settings),
        };
    }
    parameters
}

/// `decimals`와 `underlyingAsset` 조회
pub(crate) async fn token_metadata(
    token: &crate::ledger::RegisteredToken,
    reader: &dyn ChainReader,
) -> anyhow::Result<(u32, String)> {
    let decimals = reader.call(&token.address, "decimals", &[]).await?;
    let decimals = decimals
        .first()
        .and_then(|felt| crate::utils::felt_to_u64(felt))
        .ok_or_else(|| anyhow::anyhow!("invalid decimals response"))?;
    let underlying = reader.call(&token.address, "underlyingAsset", &[]).await?;
    let underlying = underlying
        .first()
        .map(|felt| crate::utils::add_leading_zeros(felt))
        .ok_or_else(|| anyhow::anyhow!("empty underlyingAsset response"))?;
    Ok((decimals as u32, underlying))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::underlying_address;
    use crate::mocks::events::{nostra_event, nostra_oz_transfer};
    use crate::state::EventOutcome;

    const USER: &str = "0x0000000000000000000000000000000000000000000000000000000000000abc";
    const OTHER: &str = "0x0000000000000000000000000000000000000000000000000000000000000def";

    fn token(registry: &TokenRegistry, underlying: &str, kind: TokenKind) -> String {
        registry
            .find_wrapped(underlying_address(underlying).unwrap(), kind)
            .unwrap()
            .address
            .clone()
    }

    fn split(state: &ProtocolState, user: &str) -> (Portfolio, Portfolio) {
        match &state.entity(&LoanEntityId::User(user.to_string())).unwrap().details {
            LoanDetails::Nostra {
                interest_bearing_collateral,
                non_interest_bearing_collateral,
            } => (interest_bearing_collateral.clone(), non_interest_bearing_collateral.clone()),
            _ => panic!("not a Nostra entity"),
        }
    }

    #[test]
    fn test_interest_state_updates_both_models() {
        let mut state = ProtocolState::for_protocol(ProtocolId::NostraMainnet);
        let registry = state.registry.clone();
        let d_eth = token(&registry, "ETH", TokenKind::Debt);
        let i_eth = token(&registry, "ETH", TokenKind::Collateral { interest_bearing: true });

        // lend index 1.0, borrow index 2.0
        let data = [d_eth.as_str(), "0x0", "0x0", "0x0", "0x0", "0xde0b6b3a7640000", "0x0", "0x1bc16d674ec80000", "0x0"];
        state
            .process_event(&nostra_event(1, NOSTRA_MAINNET_INTEREST_RATE_MODEL, "InterestStateUpdated", &data))
            .unwrap();
        assert_eq!(state.interest_rate_models.debt.get(&d_eth), Decimal::from(2));
        assert_eq!(state.interest_rate_models.collateral.get(&i_eth), Decimal::ONE);

        // 2 ETH face borrowed at index 2 -> 1 ETH raw
        state
            .process_event(&nostra_event(2, &d_eth, "Mint", &[USER, "0x1bc16d674ec80000", "0x0"]))
            .unwrap();
        let entity = state.entity(&LoanEntityId::User(USER.to_string())).unwrap();
        assert_eq!(entity.debt.get(&d_eth), Decimal::from(10u64.pow(18)));
    }

    #[test]
    fn test_mint_burn_split_collateral() {
        let mut state = ProtocolState::for_protocol(ProtocolId::NostraAlpha);
        let registry = state.registry.clone();
        let i_usdc = token(&registry, "USDC", TokenKind::Collateral { interest_bearing: true });
        let n_usdc = token(&registry, "USDC", TokenKind::Collateral { interest_bearing: false });

        state
            .process_event(&nostra_event(1, &i_usdc, "Mint", &[USER, "0x3b9aca00", "0x0"]))
            .unwrap();
        state
            .process_event(&nostra_event(1, &n_usdc, "Mint", &[USER, "0x3b9aca00", "0x0"]))
            .unwrap();
        state
            .process_event(&nostra_event(2, &n_usdc, "Burn", &[USER, "0x17d78400", "0x0"]))
            .unwrap();

        let (interest_bearing, non_interest_bearing) = split(&state, USER);
        assert_eq!(interest_bearing.get(&i_usdc), Decimal::from(1_000_000_000u64));
        assert_eq!(non_interest_bearing.get(&n_usdc), Decimal::from(600_000_000u64));
        let entity = state.entity(&LoanEntityId::User(USER.to_string())).unwrap();
        assert_eq!(entity.collateral.get(&i_usdc), Decimal::from(1_000_000_000u64));
        assert_eq!(entity.collateral.get(&n_usdc), Decimal::from(600_000_000u64));
    }

    #[test]
    fn test_transfer_layouts_and_zero_address() {
        let mut state = ProtocolState::for_protocol(ProtocolId::NostraMainnet);
        let registry = state.registry.clone();
        let d_usdc = token(&registry, "USDC", TokenKind::Debt);

        state
            .process_event(&nostra_event(1, &d_usdc, "Mint", &[USER, "0x3b9aca00", "0x0"]))
            .unwrap();
        // legacy layout
        state
            .process_event(&nostra_event(2, &d_usdc, "Transfer", &[USER, OTHER, "0x17d78400", "0x0"]))
            .unwrap();
        // OZ layout
        state
            .process_event(&nostra_oz_transfer(
                3,
                &d_usdc,
                "openzeppelin::token::erc20::erc20::ERC20Component::Transfer",
                USER,
                OTHER,
                "0x17d78400",
            ))
            .unwrap();
        let debt_of = |state: &ProtocolState, user: &str| {
            state.entity(&LoanEntityId::User(user.to_string())).unwrap().debt.get(&d_usdc)
        };
        assert_eq!(debt_of(&state, USER), Decimal::from(200_000_000u64));
        assert_eq!(debt_of(&state, OTHER), Decimal::from(800_000_000u64));

        let outcome = state
            .process_event(&nostra_event(4, &d_usdc, "Transfer", &[ZERO_ADDRESS, USER, "0x10", "0x0"]))
            .unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);
        assert_eq!(debt_of(&state, USER), Decimal::from(200_000_000u64));
    }

    #[test]
    fn test_ignored_user_is_not_tracked() {
        let mut state = ProtocolState::for_protocol(ProtocolId::NostraAlpha);
        let registry = state.registry.clone();
        let n_eth = token(&registry, "ETH", TokenKind::Collateral { interest_bearing: false });

        let outcome = state
            .process_event(&nostra_event(
                1,
                &n_eth,
                "Mint",
                &[NOSTRA_ALPHA_DEFERRED_BATCH_CALL_ADAPTER, "0x10", "0x0"],
            ))
            .unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);

        state.process_event(&nostra_event(2, &n_eth, "Mint", &[USER, "0x10", "0x0"])).unwrap();
        state
            .process_event(&nostra_event(
                3,
                &n_eth,
                "Transfer",
                &[USER, NOSTRA_ALPHA_DEFERRED_BATCH_CALL_ADAPTER, "0x10", "0x0"],
            ))
            .unwrap();
        assert_eq!(
            state.entity(&LoanEntityId::User(USER.to_string())).unwrap().collateral.get(&n_eth),
            Decimal::ZERO
        );
        assert!(state
            .entity(&LoanEntityId::User(NOSTRA_ALPHA_DEFERRED_BATCH_CALL_ADAPTER.to_string()))
            .is_none());
    }

    #[test]
    fn test_unknown_emitter_is_skipped() {
        let mut state = ProtocolState::for_protocol(ProtocolId::NostraMainnet);
        let outcome = state.process_event(&nostra_event(1, "0x123", "Mint", &[USER, "0x10", "0x0"])).unwrap();
        assert!(matches!(outcome, EventOutcome::Skipped(StateError::UnknownToken { .. })));
    }

    #[test]
    fn test_priority_orders_interest_before_mint() {
        assert!(event_priority("InterestStateUpdated") < event_priority("Transfer"));
        assert!(event_priority("Burn") < event_priority("Mint"));
        assert!(
            event_priority("nostra::core::tokenization::lib::nostra_token::NostraTokenComponent::Burn")
                < event_priority("nostra::core::tokenization::lib::nostra_token::NostraTokenComponent::Mint")
        );
    }
}
