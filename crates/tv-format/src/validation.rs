//! Deposit input checks. These gate what the UI layer submits; the contracts
//! remain the authority.

use thiserror::Error;
use tv_api_types::protocol::{self, MIN_DEPOSIT, USDC_DECIMALS};

use crate::units::{from_base_units, to_base_units};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Enter an amount")]
    Missing,
    #[error("Invalid amount")]
    NotANumber,
    #[error("Amount must be positive")]
    NotPositive,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Minimum deposit is {0} USDC")]
    BelowMinimum(String),
    #[error("Lock duration of {0} seconds is not offered")]
    DurationNotOffered(u64),
}

/// Checks a user-entered amount against the displayed balance, both decimal
/// strings in token units. Returns the amount in base units, with digits
/// past the token's precision truncated.
///
/// An unparseable balance counts as zero.
pub fn validate_deposit_input(amount: &str, balance: &str) -> Result<u128, ValidationError> {
    let amount = amount.trim();
    if amount.is_empty() || amount == "0" {
        return Err(ValidationError::Missing);
    }

    if let Some(magnitude) = amount.strip_prefix('-') {
        return match to_base_units(magnitude, USDC_DECIMALS) {
            Ok(_) => Err(ValidationError::NotPositive),
            Err(_) => Err(ValidationError::NotANumber),
        };
    }

    let value = to_base_units(amount, USDC_DECIMALS).map_err(|_| ValidationError::NotANumber)?;
    // Positivity is judged on the typed digits; dust below one base unit
    // truncates to zero and is left to the minimum-deposit rule.
    if !amount.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        return Err(ValidationError::NotPositive);
    }

    let balance = to_base_units(balance, USDC_DECIMALS).unwrap_or(0);
    if value > balance || (value == balance && has_sub_unit_digits(amount)) {
        return Err(ValidationError::InsufficientBalance);
    }

    Ok(value)
}

fn has_sub_unit_digits(amount: &str) -> bool {
    amount.split_once('.').is_some_and(|(_, fraction)| {
        fraction
            .bytes()
            .skip(USDC_DECIMALS as usize)
            .any(|b| b != b'0')
    })
}

pub fn meets_minimum_deposit(amount: u128) -> bool {
    amount >= MIN_DEPOSIT
}

pub fn validate_minimum_deposit(amount: u128) -> Result<(), ValidationError> {
    if meets_minimum_deposit(amount) {
        Ok(())
    } else {
        Err(ValidationError::BelowMinimum(from_base_units(MIN_DEPOSIT, USDC_DECIMALS)))
    }
}

pub fn validate_lock_duration(seconds: u64) -> Result<(), ValidationError> {
    if protocol::is_allowed_duration(seconds) {
        Ok(())
    } else {
        Err(ValidationError::DurationNotOffered(seconds))
    }
}

pub fn is_valid_amount(amount: &str) -> bool {
    matches!(to_base_units(amount, USDC_DECIMALS), Ok(value) if value > 0)
}

/// Strips characters that would be unsafe to echo back into markup.
pub fn sanitize_input(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '&'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_amounts_within_balance() {
        assert_eq!(validate_deposit_input("10", "25.5"), Ok(10_000_000));
        assert_eq!(validate_deposit_input("25.5", "25.5"), Ok(25_500_000));
        assert_eq!(validate_deposit_input(" 0.1 ", "1"), Ok(100_000));
    }

    #[test]
    fn sub_unit_amounts_are_positive() {
        assert_eq!(validate_deposit_input("0.0000001", "10"), Ok(0));
        assert_eq!(validate_deposit_input("10.0000001", "10.5"), Ok(10_000_000));
        assert_eq!(
            validate_deposit_input("10.0000001", "10"),
            Err(ValidationError::InsufficientBalance)
        );
        assert_eq!(
            validate_deposit_input("0.0000001", "0"),
            Err(ValidationError::InsufficientBalance)
        );
        assert!(validate_minimum_deposit(0).is_err());
    }

    #[test]
    fn rejects_empty_and_zero() {
        assert_eq!(validate_deposit_input("", "10"), Err(ValidationError::Missing));
        assert_eq!(validate_deposit_input("0", "10"), Err(ValidationError::Missing));
        assert_eq!(validate_deposit_input("0.00", "10"), Err(ValidationError::NotPositive));
    }

    #[test]
    fn rejects_negative_and_non_numeric() {
        assert_eq!(validate_deposit_input("-5", "10"), Err(ValidationError::NotPositive));
        assert_eq!(validate_deposit_input("abc", "10"), Err(ValidationError::NotANumber));
        assert_eq!(validate_deposit_input("1.2.3", "10"), Err(ValidationError::NotANumber));
        assert_eq!(validate_deposit_input("-x", "10"), Err(ValidationError::NotANumber));
    }

    #[test]
    fn rejects_amount_above_balance() {
        assert_eq!(
            validate_deposit_input("10.000001", "10"),
            Err(ValidationError::InsufficientBalance)
        );
        assert_eq!(
            validate_deposit_input("1", "garbage"),
            Err(ValidationError::InsufficientBalance)
        );
    }

    #[test]
    fn minimum_and_duration_rules() {
        assert!(validate_minimum_deposit(100_000).is_ok());
        assert_eq!(
            validate_minimum_deposit(99_999),
            Err(ValidationError::BelowMinimum("0.1".to_owned()))
        );
        assert!(validate_lock_duration(259_200).is_ok());
        assert_eq!(
            validate_lock_duration(86_400),
            Err(ValidationError::DurationNotOffered(86_400))
        );
    }

    #[test]
    fn misc_checks() {
        assert!(is_valid_amount("0.5"));
        assert!(!is_valid_amount("0"));
        assert_eq!(sanitize_input("<b>\"hi\" & 'bye'</b>"), "bhi  bye/b");
    }
}
