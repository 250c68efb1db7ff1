//! Exact conversion between decimal strings and integer base units.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid character {0:?} in amount")]
    InvalidCharacter(char),
    #[error("amount has more than one decimal point")]
    MultipleDecimalPoints,
    #[error("amount does not fit in 128 bits")]
    Overflow,
}

/// Parse a non-negative decimal string into base units.
///
/// The fraction is right-padded to `decimals` digits; digits beyond
/// `decimals` are truncated, never rounded.
pub fn to_base_units(amount: &str, decimals: u32) -> Result<u128, UnitsError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => {
            if fraction.contains('.') {
                return Err(UnitsError::MultipleDecimalPoints);
            }
            (whole, fraction)
        }
        None => (amount, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(UnitsError::Empty);
    }

    if let Some(bad) = whole.chars().chain(fraction.chars()).find(|c| !c.is_ascii_digit()) {
        return Err(UnitsError::InvalidCharacter(bad));
    }

    let scale = 10_u128.checked_pow(decimals).ok_or(UnitsError::Overflow)?;

    let mut value: u128 = 0;
    for digit in whole.bytes() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u128::from(digit - b'0')))
            .ok_or(UnitsError::Overflow)?;
    }
    value = value.checked_mul(scale).ok_or(UnitsError::Overflow)?;

    let mut place = scale;
    let mut fractional: u128 = 0;
    for digit in fraction.bytes().take(decimals as usize) {
        place /= 10;
        fractional += u128::from(digit - b'0') * place;
    }

    value.checked_add(fractional).ok_or(UnitsError::Overflow)
}

/// Render base units as a normalized decimal string: no trailing fractional
/// zeros, no dangling point, `"0"` for zero.
pub fn from_base_units(amount: u128, decimals: u32) -> String {
    let (whole, fraction) = split_digits(amount, decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole
    } else {
        format!("{whole}.{fraction}")
    }
}

pub(crate) fn split_digits(amount: u128, decimals: u32) -> (String, String) {
    let decimals = decimals as usize;
    let digits = amount.to_string();
    if decimals == 0 {
        return (digits, String::new());
    }

    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    (whole.to_owned(), fraction.to_owned())
}
