//! Failure classification and user-facing messages.

use serde::Serialize;
use thiserror::Error;
use tv_chain_client::{ProviderError, TxReverted};
use tv_format::{UnitsError, ValidationError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("No wallet provider available")]
    ProviderUnavailable,
    #[error("No accounts found")]
    NoAccounts,
    #[error("Wallet returned an invalid account: {0}")]
    InvalidAccount(String),
    #[error("Wallet not connected")]
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderUnavailable,
    UserRejected,
    Network,
    ContractReverted,
    Validation,
}

fn mentions_rejection(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("user rejected") || message.contains("user denied")
}

/// Structured causes win; substring sniffing is the last resort.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(provider) = cause.downcast_ref::<ProviderError>() {
            return match provider {
                ProviderError::Unavailable => ErrorKind::ProviderUnavailable,
                ProviderError::Rpc { .. } if provider.is_user_rejection() => {
                    ErrorKind::UserRejected
                }
                ProviderError::Rpc { message, .. } if mentions_rejection(message) => {
                    ErrorKind::UserRejected
                }
                ProviderError::Rpc { message, .. } if message.contains("execution reverted") => {
                    ErrorKind::ContractReverted
                }
                _ => ErrorKind::Network,
            };
        }
        if cause.downcast_ref::<TxReverted>().is_some() {
            return ErrorKind::ContractReverted;
        }
        if let Some(connect) = cause.downcast_ref::<ConnectError>() {
            return match connect {
                ConnectError::ProviderUnavailable => ErrorKind::ProviderUnavailable,
                ConnectError::NoAccounts
                | ConnectError::InvalidAccount(_)
                | ConnectError::NotConnected => ErrorKind::Validation,
            };
        }
        if cause.downcast_ref::<ValidationError>().is_some()
            || cause.downcast_ref::<UnitsError>().is_some()
        {
            return ErrorKind::Validation;
        }
    }

    let message = format!("{err:#}");
    if mentions_rejection(&message) {
        ErrorKind::UserRejected
    } else if message.contains("execution reverted") {
        ErrorKind::ContractReverted
    } else {
        ErrorKind::Network
    }
}

pub fn is_user_rejection(err: &anyhow::Error) -> bool {
    classify(err) == ErrorKind::UserRejected
}

/// Message shown to the user for a failed wallet or contract interaction.
pub fn contract_error_message(err: &anyhow::Error) -> String {
    let raw = err.root_cause().to_string();
    if raw.contains("insufficient funds") {
        return "Insufficient funds for transaction".to_owned();
    }
    match classify(err) {
        ErrorKind::ContractReverted => "Transaction failed - contract rejected".to_owned(),
        ErrorKind::UserRejected => "Transaction cancelled".to_owned(),
        _ => raw,
    }
}
