use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Add;

use crate::constants::max_rounding_error;
use crate::types::{StateError, StateResult};

/// 토큰 주소 -> 금액. 변경 후 반올림 오차 이하의 잔고는 정확히 0으로 스냅된다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    values: BTreeMap<String, Decimal>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_amounts<I, S>(amounts: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let mut portfolio = Self::new();
        for (token, amount) in amounts {
            let token: String = token.into();
            portfolio.set_value(&token, amount);
        }
        portfolio
    }

    /// 없는 토큰은 0
    pub fn get(&self, token: &str) -> Decimal {
        self.values.get(token).copied().unwrap_or(Decimal::ZERO)
    }

    /// 잔고가 Decimal 범위를 넘으면 바꾸지 않고 `MalformedEventData`
    pub fn increase_value(&mut self, token: &str, delta: Decimal) -> StateResult<()> {
        let current = self.get(token);
        let updated = current.checked_add(delta).ok_or_else(|| {
            StateError::malformed("balance update", format!("{} + {} overflows for {}", current, delta, token))
        })?;
        self.values.insert(token.to_string(), snap(token, updated));
        Ok(())
    }

    pub fn set_value(&mut self, token: &str, value: Decimal) {
        self.values.insert(token.to_string(), snap(token, value));
    }

    /// Zero every balance, keeping the keys
    pub fn clear(&mut self) {
        for value in self.values.values_mut() {
            *value = Decimal::ZERO;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.values.iter()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn positive_tokens(&self) -> impl Iterator<Item = &String> {
        self.values
            .iter()
            .filter(|(_, amount)| amount.is_sign_positive() && !amount.is_zero())
            .map(|(token, _)| token)
    }

    pub fn has_positive(&self) -> bool {
        self.positive_tokens().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(|amount| amount.is_zero())
    }

    /// 키 단위 합산. 결과에도 스냅이 적용되고 범위를 넘으면 포화된다.
    pub fn merged(&self, other: &Portfolio) -> Portfolio {
        let mut result = self.clone();
        for (token, amount) in other.iter() {
            let updated = result.get(token).saturating_add(*amount);
            result.set_value(token, updated);
        }
        result
    }

    pub fn to_f64_map(&self) -> HashMap<String, f64> {
        self.values
            .iter()
            .map(|(token, amount)| (token.clone(), amount.to_f64().unwrap_or(0.0)))
            .collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Decimal> {
        &self.values
    }
}

impl Add for &Portfolio {
    type Output = Portfolio;

    fn add(self, other: &Portfolio) -> Portfolio {
        self.merged(other)
    }
}

impl Add for Portfolio {
    type Output = Portfolio;

    fn add(self, other: Portfolio) -> Portfolio {
        self.merged(&other)
    }
}

fn snap(token: &str, value: Decimal) -> Decimal {
    if value.abs() < max_rounding_error(token) {
        Decimal::ZERO
    } else {
        value
    }
}
