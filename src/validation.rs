//! 公共验证函数模块
//! 提供标识符、概率参数等输入验证，供存储键构造和引擎入口共用。

use crate::constants::MAX_IDENTIFIER_LEN;

/// 验证标识符：非空、不超过长度上限、不含键分隔符 `:` 与控制字符
pub fn validate_identifier(value: &str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        return Err("must not be empty");
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err("must be at most 128 bytes");
    }
    if value.contains(':') {
        return Err("must not contain ':'");
    }
    if value.chars().any(|c| c.is_control()) {
        return Err("must not contain control characters");
    }
    Ok(())
}

/// 验证概率参数：有限且位于 [0,1]
pub fn validate_probability(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() {
        return Err("must be finite");
    }
    if !(0.0..=1.0).contains(&value) {
        return Err("must be in [0,1]");
    }
    Ok(())
}

/// 验证评分：有限且为正
pub fn validate_rating(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() || value <= 0.0 {
        return Err("must be a positive finite number");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifier_accepted() {
        assert!(validate_identifier("student-42").is_ok());
        assert!(validate_identifier("Number Theory").is_ok());
    }

    #[test]
    fn empty_identifier_rejected() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("   ").is_err());
    }

    #[test]
    fn separator_in_identifier_rejected() {
        assert!(validate_identifier("a:b").is_err());
    }

    #[test]
    fn overlong_identifier_rejected() {
        assert!(validate_identifier(&"x".repeat(129)).is_err());
    }

    #[test]
    fn control_characters_rejected() {
        assert!(validate_identifier("a\nb").is_err());
    }

    #[test]
    fn probability_bounds() {
        assert!(validate_probability(0.0).is_ok());
        assert!(validate_probability(1.0).is_ok());
        assert!(validate_probability(-0.01).is_err());
        assert!(validate_probability(1.01).is_err());
        assert!(validate_probability(f64::NAN).is_err());
    }

    #[test]
    fn rating_must_be_positive() {
        assert!(validate_rating(1000.0).is_ok());
        assert!(validate_rating(0.0).is_err());
        assert!(validate_rating(f64::INFINITY).is_err());
    }
}
