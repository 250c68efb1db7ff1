use serde::{Deserialize, Serialize};
use std::fmt;

/// Static protocol parameters of the vault deployment.
pub mod protocol {
    /// USDC has 6 decimals.
    pub const USDC_DECIMALS: u32 = 6;

    /// 0.1 USDC.
    pub const MIN_DEPOSIT: u128 = 100_000;

    /// Creator fee taken by the router, in basis points (0.5%).
    pub const CREATOR_FEE_BPS: u128 = 50;

    /// Emergency-withdraw penalty, in basis points (10%).
    pub const EMERGENCY_PENALTY_BPS: u128 = 1_000;

    pub const BPS_DENOMINATOR: u128 = 10_000;

    pub struct LockDuration {
        pub label: &'static str,
        pub seconds: u64,
        pub description: &'static str,
    }

    pub const LOCK_DURATIONS: [LockDuration; 4] = [
        LockDuration { label: "3 Days", seconds: 259_200, description: "Short-term savings" },
        LockDuration { label: "7 Days", seconds: 604_800, description: "Weekly goal" },
        LockDuration { label: "14 Days", seconds: 1_209_600, description: "Bi-weekly savings" },
        LockDuration { label: "30 Days", seconds: 2_592_000, description: "Monthly discipline" },
    ];

    pub fn is_allowed_duration(seconds: u64) -> bool {
        LOCK_DURATIONS.iter().any(|option| option.seconds == seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    /// Address comparison is case-insensitive; providers mix checksummed and
    /// lowercase forms.
    pub fn matches(&self, other: &WalletAddress) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl ChainId {
    pub fn to_hex(self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn from_hex(raw: &str) -> Option<Self> {
        let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
        u64::from_str_radix(digits, 16).ok().map(ChainId)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only projection of a vault deposit slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepositRecord {
    pub id: u64,
    pub owner: WalletAddress,
    /// Principal in token base units.
    pub principal: u128,
    pub start_time: u64,
    pub unlock_time: u64,
    pub withdrawn: bool,
}

impl DepositRecord {
    pub fn is_unlocked(&self, now: u64) -> bool {
        now >= self.unlock_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawAction {
    Withdraw,
    EmergencyWithdraw,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxPhase {
    #[default]
    Idle,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Resyncing,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdraw,
    EmergencyWithdraw,
    Approve,
}

impl TxKind {
    pub fn label(self) -> &'static str {
        match self {
            TxKind::Deposit => "Deposit",
            TxKind::Withdraw => "Withdrawal",
            TxKind::EmergencyWithdraw => "Emergency Withdrawal",
            TxKind::Approve => "Token Approval",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "deposit" => Some(TxKind::Deposit),
            "withdraw" => Some(TxKind::Withdraw),
            "emergency_withdraw" => Some(TxKind::EmergencyWithdraw),
            "approve" => Some(TxKind::Approve),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxRecordStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: TxKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_id: Option<u64>,
    pub timestamp: u64,
    pub status: TxRecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ToastKind,
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<TxHash>,
    /// `None` means the toast stays until dismissed.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    pub theme: String,
    pub sounds: bool,
    pub notifications: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "dark".to_owned(),
            sounds: true,
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesPatch {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub sounds: Option<bool>,
    #[serde(default)]
    pub notifications: Option<bool>,
}

impl Preferences {
    pub fn merge(mut self, patch: PreferencesPatch) -> Self {
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(sounds) = patch.sounds {
            self.sounds = sounds;
        }
        if let Some(notifications) = patch.notifications {
            self.notifications = notifications;
        }
        self
    }
}

// ── HTTP bodies ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    /// EIP-55 checksummed.
    pub address: Option<String>,
    pub address_short: Option<String>,
    pub explorer_url: Option<String>,
    pub chain_id: Option<u64>,
    pub is_connecting: bool,
    pub is_connected: bool,
    pub is_correct_chain: bool,
    pub target_chain_id: u64,
    pub target_chain_name: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositView {
    pub id: u64,
    pub owner: String,
    pub principal: String,
    pub principal_formatted: String,
    pub start_time: u64,
    pub unlock_time: u64,
    pub withdrawn: bool,
    pub is_unlocked: bool,
    pub time_remaining: String,
    pub days_remaining: u64,
    /// Share of the lock period elapsed, 0..=100.
    pub progress: u8,
    pub lock_label: String,
    pub start_date: String,
    pub unlock_date: String,
    pub action: Option<WithdrawAction>,
    /// Set while only the emergency path is open: what the penalty costs and
    /// what reaches the wallet, in base units.
    pub penalty: Option<String>,
    pub payout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultStateResponse {
    pub address: Option<String>,
    pub usdc_balance: String,
    pub usdc_balance_formatted: String,
    pub allowance: String,
    pub deposits: Vec<DepositView>,
    pub total_locked: String,
    pub total_locked_usd: String,
    pub is_loading: bool,
    pub tx_pending: bool,
    pub tx_status: Option<String>,
    pub tx_phase: TxPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub amount: String,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub deposit_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxSubmitResponse {
    pub cancelled: bool,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub tx_status: Option<String>,
    pub explorer_url: Option<String>,
}

/// Router fee breakdown for a prospective deposit, in base units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositPreviewResponse {
    pub gross: String,
    pub fee: String,
    pub principal: String,
    pub principal_formatted: String,
    pub meets_minimum: bool,
}

/// A history record as served to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub relative_time: String,
    pub explorer_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockOptionResponse {
    pub label: String,
    pub duration_seconds: u64,
    pub description: String,
}
