use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// 토큰별 누적 이자 인덱스. 없는 토큰은 1로 본다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestRateModels {
    values: BTreeMap<String, Decimal>,
}

impl InterestRateModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins
    pub fn update(&mut self, token: &str, index: Decimal) {
        self.values.insert(token.to_string(), index);
    }

    pub fn get(&self, token: &str) -> Decimal {
        self.values.get(token).copied().unwrap_or(Decimal::ONE)
    }

    /// 나눗셈에 쓸 수 있는 인덱스. 0이면 1로 대체한다.
    pub fn safe_index(&self, token: &str) -> Decimal {
        let index = self.get(token);
        if index.is_zero() {
            warn!("⚠️ 토큰 {} 의 이자 인덱스가 0입니다. 1로 대체합니다", token);
            return Decimal::ONE;
        }
        index
    }

    /// face -> raw
    pub fn to_raw(&self, token: &str, face_amount: Decimal) -> Decimal {
        face_amount
            .checked_div(self.safe_index(token))
            .unwrap_or(face_amount)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.values.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Decimal> {
        &self.values
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestRateModelPair {
    pub collateral: InterestRateModels,
    pub debt: InterestRateModels,
}
