pub mod connector;
pub mod error;
pub mod events;
pub mod toast;
pub mod vault;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::time::{SystemTime, UNIX_EPOCH};

pub use connector::{WalletConnector, WalletSession};
pub use error::{ConnectError, ErrorKind, classify, contract_error_message, is_user_rejection};
pub use events::{AppEvent, EventBus, EventSubscription};
pub use toast::ToastCenter;
pub use vault::{TxOutcome, VaultClientState, VaultSync, withdraw_action};

/// Seconds since the Unix epoch, the time base of deposit lock periods.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
