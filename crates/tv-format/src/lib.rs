//! Pure formatting and validation helpers for token amounts, addresses and
//! lock durations. Nothing in this crate performs I/O.

pub mod address;
pub mod display;
pub mod preview;
pub mod units;
pub mod validation;

pub use address::{
    address_explorer_url, checksum_address, is_valid_address, shorten_address, tx_explorer_url,
};
pub use display::{
    days_until, format_date, format_duration, format_relative_time, format_time_remaining,
    format_token, format_usd, lock_duration_label, progress_percentage,
};
pub use preview::{DepositPreview, EmergencyPreview, deposit_preview, emergency_preview};
pub use units::{UnitsError, from_base_units, to_base_units};
pub use validation::{
    ValidationError, is_valid_amount, meets_minimum_deposit, sanitize_input, validate_deposit_input,
    validate_lock_duration, validate_minimum_deposit,
};
