use crate::models::Region;
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use std::str::FromStr;

/// f64 配置值转十进制 (经最短十进制表示，0.15 → 0.15)
pub fn decimal_from_f64(value: f64) -> BigDecimal {
    if !value.is_finite() {
        return BigDecimal::zero();
    }
    BigDecimal::from_str(&value.to_string()).unwrap_or_else(|_| BigDecimal::zero())
}

/// 可接受金额的整数位上限 (按二进制位数估算)
pub const MAX_AMOUNT_INTEGER_DIGITS: i64 = 19;
/// 可接受金额的小数位上限 (JSON 浮点数经 bigdecimal 转换后约 15 位)
pub const MAX_AMOUNT_SCALE: i64 = 32;

/// 金额是否在可计算范围内
///
/// 只读取内部整数的位数与指数，不展开数值：`1e400000000` 这类输入在
/// 对齐小数位或格式化时会生成数亿位的整数
pub fn is_sane_amount(value: &BigDecimal) -> bool {
    let (digits, scale) = value.as_bigint_and_exponent();
    if !(-MAX_AMOUNT_INTEGER_DIGITS..=MAX_AMOUNT_SCALE).contains(&scale) {
        return false;
    }
    let significant = (digits.bits() as f64 * std::f64::consts::LOG10_2).ceil() as i64;
    significant - scale <= MAX_AMOUNT_INTEGER_DIGITS && significant <= MAX_AMOUNT_INTEGER_DIGITS + MAX_AMOUNT_SCALE
}

pub fn to_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// 限定到 [0, ceiling]
pub fn clamp_amount(value: BigDecimal, ceiling: &BigDecimal) -> BigDecimal {
    if value < BigDecimal::zero() {
        BigDecimal::zero()
    } else if &value > ceiling {
        ceiling.clone()
    } else {
        value
    }
}

pub fn abs_diff(a: &BigDecimal, b: &BigDecimal) -> BigDecimal {
    (a - b).abs()
}

/// 带币种符号、两位小数
pub fn format_amount(region: Region, amount: &BigDecimal) -> String {
    format!("{}{}", region.currency_symbol(), amount.with_scale(2))
}
