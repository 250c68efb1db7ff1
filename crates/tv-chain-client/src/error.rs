use serde_json::Value;
use thiserror::Error;
use tv_api_types::TxHash;

/// EIP-1193: the user rejected the request.
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-1193: the requested method is not authorized.
pub const UNAUTHORIZED: i64 = 4100;
/// The chain has not been added to the wallet.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;
/// JSON-RPC 2.0: method not found.
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("no wallet provider available")]
    Unavailable,
    #[error("{message} (code {code})")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        ProviderError::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            ProviderError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code() == Some(USER_REJECTED_REQUEST)
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code() == Some(UNRECOGNIZED_CHAIN)
    }

    pub fn is_method_not_found(&self) -> bool {
        self.code() == Some(METHOD_NOT_FOUND)
    }
}

/// The transaction was mined but execution failed.
#[derive(Debug, Clone, Error)]
#[error("execution reverted in transaction {hash}")]
pub struct TxReverted {
    pub hash: TxHash,
    pub block_number: Option<u64>,
}
