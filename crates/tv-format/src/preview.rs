//! Display-only estimates of what the router and vault will charge.

use tv_api_types::protocol::{BPS_DENOMINATOR, CREATOR_FEE_BPS, EMERGENCY_PENALTY_BPS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositPreview {
    pub gross: u128,
    pub fee: u128,
    pub principal: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyPreview {
    pub principal: u128,
    pub penalty: u128,
    pub payout: u128,
}

pub fn deposit_preview(gross: u128) -> DepositPreview {
    let fee = gross.saturating_mul(CREATOR_FEE_BPS) / BPS_DENOMINATOR;
    DepositPreview {
        gross,
        fee,
        principal: gross - fee,
    }
}

pub fn emergency_preview(principal: u128) -> EmergencyPreview {
    let penalty = principal.saturating_mul(EMERGENCY_PENALTY_BPS) / BPS_DENOMINATOR;
    EmergencyPreview {
        principal,
        penalty,
        payout: principal - penalty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creator_fee_is_half_a_percent() {
        let preview = deposit_preview(10_000_000);
        assert_eq!(preview.fee, 50_000);
        assert_eq!(preview.principal, 9_950_000);
    }

    #[test]
    fn emergency_penalty_is_ten_percent() {
        let preview = emergency_preview(9_950_000);
        assert_eq!(preview.penalty, 995_000);
        assert_eq!(preview.payout, 8_955_000);
    }
}
