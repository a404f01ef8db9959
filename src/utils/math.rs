use rust_decimal::Decimal;

/// 10^decimals. Decimal은 28자리까지만 표현하므로 그 이상은 28로 고정
pub fn pow10(decimals: u32) -> Decimal {
    let exponent = decimals.min(28);
    let mantissa = 10i128.checked_pow(exponent).unwrap_or(1);
    Decimal::from_i128_with_scale(mantissa, 0)
}

/// Raw 정수 금액 -> 토큰 단위
pub fn scale_down(amount: Decimal, decimals: u32) -> Decimal {
    safe_div(amount, pow10(decimals)).unwrap_or(Decimal::ZERO)
}

/// Division that yields `None` on a zero divisor or overflow
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator.is_zero() {
        return None;
    }
    numerator.checked_div(denominator)
}
