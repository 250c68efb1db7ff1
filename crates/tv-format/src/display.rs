//! Human-readable rendering of amounts, durations and timestamps.
//!
//! Amounts stay integers until the final string is built; rounding for
//! display happens on base units, never on floats.

use chrono::{DateTime, Utc};
use tv_api_types::protocol::LOCK_DURATIONS;

use crate::units::split_digits;

const MINUTE: u64 = 60;
const HOUR: u64 = 3_600;
const DAY: u64 = 86_400;
const WEEK: u64 = 604_800;

/// `$1,234.50`; rounds half-up to cents.
pub fn format_usd(amount: u128, decimals: u32) -> String {
    let cents = round_to_digits(amount, decimals, 2);
    let (whole, fraction) = split_digits(cents, 2);
    format!("${}.{fraction}", group_thousands(&whole))
}

/// `1,234.5 USDC`: between two and six fraction digits.
pub fn format_token(amount: u128, decimals: u32, symbol: &str) -> String {
    let rounded = round_to_digits(amount, decimals, 6);
    let (whole, fraction) = split_digits(rounded, 6);
    let mut fraction = fraction.trim_end_matches('0').to_owned();
    while fraction.len() < 2 {
        fraction.push('0');
    }

    let number = format!("{}.{fraction}", group_thousands(&whole));
    if symbol.is_empty() {
        number
    } else {
        format!("{number} {symbol}")
    }
}

fn round_to_digits(amount: u128, decimals: u32, digits: u32) -> u128 {
    if decimals >= digits {
        let divisor = 10_u128.pow(decimals - digits);
        amount / divisor + u128::from(amount % divisor >= divisor.div_ceil(2) && divisor > 1)
    } else {
        amount.saturating_mul(10_u128.pow(digits - decimals))
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_duration(seconds: u64) -> String {
    if seconds < MINUTE {
        return format!("{seconds}s");
    }

    if seconds < HOUR {
        let (mins, secs) = (seconds / MINUTE, seconds % MINUTE);
        return if secs > 0 { format!("{mins}m {secs}s") } else { format!("{mins}m") };
    }

    if seconds < DAY {
        let (hours, mins) = (seconds / HOUR, (seconds % HOUR) / MINUTE);
        return if mins > 0 { format!("{hours}h {mins}m") } else { format!("{hours}h") };
    }

    let (days, hours) = (seconds / DAY, (seconds % DAY) / HOUR);
    if hours > 0 { format!("{days}d {hours}h") } else { format!("{days}d") }
}

pub fn format_time_remaining(unlock_time: u64, now: u64) -> String {
    if now >= unlock_time {
        return "Unlocked".to_owned();
    }
    format_duration(unlock_time - now)
}

pub fn days_until(target: u64, now: u64) -> u64 {
    target.saturating_sub(now).div_ceil(DAY)
}

/// Share of the lock period elapsed, 0..=100.
pub fn progress_percentage(start: u64, end: u64, now: u64) -> u8 {
    if now <= start {
        return 0;
    }
    if now >= end {
        return 100;
    }
    let elapsed = u128::from(now - start) * 100;
    let total = u128::from(end - start);
    ((elapsed + total / 2) / total) as u8
}

pub fn format_relative_time(timestamp: u64, now: u64) -> String {
    let future = timestamp > now;
    let seconds = timestamp.abs_diff(now);

    let (value, unit) = if seconds < MINUTE {
        return if future { "in a moment".to_owned() } else { "just now".to_owned() };
    } else if seconds < HOUR {
        (seconds / MINUTE, "m")
    } else if seconds < DAY {
        (seconds / HOUR, "h")
    } else if seconds < WEEK {
        (seconds / DAY, "d")
    } else {
        return utc_format(timestamp, "%b %-d");
    };

    if future { format!("in {value}{unit}") } else { format!("{value}{unit} ago") }
}

/// `Oct 19, 2026` in UTC.
pub fn format_date(timestamp: u64) -> String {
    utc_format(timestamp, "%b %-d, %Y")
}

pub fn lock_duration_label(seconds: u64) -> String {
    LOCK_DURATIONS
        .iter()
        .find(|option| option.seconds == seconds)
        .map(|option| option.label.to_owned())
        .unwrap_or_else(|| format_duration(seconds))
}

/// Timestamps outside chrono's range fall back to the raw number.
fn utc_format(timestamp: u64, pattern: &str) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|date| date.format(pattern).to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
