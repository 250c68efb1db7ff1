use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use tv_api_types::{ToastKind, ToastMessage, TxHash};
use uuid::Uuid;

use crate::error::{contract_error_message, is_user_rejection};

pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(5_000);

struct Entry {
    toast: ToastMessage,
    expires_at: Option<Instant>,
}

/// Ephemeral notifications. Expired toasts are dropped lazily on read.
pub struct ToastCenter {
    entries: RwLock<Vec<Entry>>,
    default_duration: Duration,
}

impl Default for ToastCenter {
    fn default() -> Self {
        Self::new(DEFAULT_TOAST_DURATION)
    }
}

impl ToastCenter {
    pub fn new(default_duration: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            default_duration,
        }
    }

    /// `duration` of `None` keeps the toast until dismissed.
    pub async fn show(
        &self,
        kind: ToastKind,
        title: impl Into<String>,
        message: Option<String>,
        tx_hash: Option<TxHash>,
        duration: Option<Duration>,
    ) -> String {
        let id = format!("toast-{}", Uuid::new_v4());
        let toast = ToastMessage {
            id: id.clone(),
            kind,
            title: title.into(),
            message,
            tx_hash,
            duration_ms: duration.map(|duration| duration.as_millis() as u64),
        };
        debug!("toast {:?}: {}", toast.kind, toast.title);

        self.entries.write().await.push(Entry {
            toast,
            expires_at: duration.map(|duration| Instant::now() + duration),
        });
        id
    }

    pub async fn success(&self, title: impl Into<String>, message: Option<String>) -> String {
        self.show(ToastKind::Success, title, message, None, Some(self.default_duration))
            .await
    }

    /// Errors stay up until dismissed.
    pub async fn error(&self, title: impl Into<String>, message: Option<String>) -> String {
        self.show(ToastKind::Error, title, message, None, None).await
    }

    pub async fn warning(&self, title: impl Into<String>, message: Option<String>) -> String {
        self.show(ToastKind::Warning, title, message, None, Some(self.default_duration))
            .await
    }

    pub async fn info(&self, title: impl Into<String>, message: Option<String>) -> String {
        self.show(ToastKind::Info, title, message, None, Some(self.default_duration))
            .await
    }

    pub async fn pending(&self, title: impl Into<String>, tx_hash: TxHash) -> String {
        self.show(ToastKind::Pending, title, None, Some(tx_hash), Some(self.default_duration))
            .await
    }

    pub async fn confirmed(&self, title: impl Into<String>, tx_hash: TxHash) -> String {
        self.show(ToastKind::Success, title, None, Some(tx_hash), Some(self.default_duration))
            .await
    }

    /// Error toast for a failed action. Wallet rejections are the user's own
    /// choice and produce nothing.
    pub async fn report_failure(
        &self,
        title: impl Into<String>,
        err: &anyhow::Error,
    ) -> Option<String> {
        if is_user_rejection(err) {
            return None;
        }
        Some(self.error(title, Some(contract_error_message(err))).await)
    }

    pub async fn dismiss(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.toast.id != id);
        entries.len() != before
    }

    pub async fn dismiss_all(&self) {
        self.entries.write().await.clear();
    }

    pub async fn active(&self) -> Vec<ToastMessage> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|entry| entry.expires_at.is_none_or(|expires_at| expires_at > now));
        entries.iter().map(|entry| entry.toast.clone()).collect()
    }
}
