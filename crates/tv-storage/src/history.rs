//! Capped transaction logs kept in [`Storage`].

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};
use tv_api_types::{TransactionRecord, TxKind, TxRecordStatus};

use crate::Storage;

const TRANSACTIONS_KEY: &str = "transactions";
const RECENT_TXS_KEY: &str = "recent_txs";

pub const MAX_TRANSACTIONS: usize = 50;
pub const MAX_RECENT_TXS: usize = 10;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Most-recent-first list of submitted transactions, capped at
/// [`MAX_TRANSACTIONS`].
#[derive(Clone)]
pub struct TransactionHistory {
    storage: Storage,
}

impl TransactionHistory {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn all(&self) -> Vec<TransactionRecord> {
        self.storage.get_item(TRANSACTIONS_KEY, Vec::new()).await
    }

    /// Prepends `record`, stamping it with the current time.
    pub async fn add(&self, mut record: TransactionRecord) -> Result<TransactionRecord> {
        record.timestamp = now_ms();

        let mut records = self.all().await;
        records.insert(0, record.clone());
        records.truncate(MAX_TRANSACTIONS);
        self.storage.set_item(TRANSACTIONS_KEY, &records).await?;
        Ok(record)
    }

    /// Returns `false` when no record carries `hash`.
    pub async fn update_status(
        &self,
        hash: &str,
        status: TxRecordStatus,
        block_number: Option<u64>,
    ) -> Result<bool> {
        let mut records = self.all().await;
        let Some(record) = records.iter_mut().find(|record| record.hash == hash) else {
            return Ok(false);
        };

        record.status = status;
        if block_number.is_some() {
            record.block_number = block_number;
        }
        self.storage.set_item(TRANSACTIONS_KEY, &records).await?;
        Ok(true)
    }

    pub async fn pending(&self) -> Vec<TransactionRecord> {
        let mut records = self.all().await;
        records.retain(|record| record.status == TxRecordStatus::Pending);
        records
    }

    pub async fn recent(&self, limit: usize) -> Vec<TransactionRecord> {
        let mut records = self.all().await;
        records.truncate(limit);
        records
    }

    pub async fn by_kind(&self, kind: TxKind) -> Vec<TransactionRecord> {
        let mut records = self.all().await;
        records.retain(|record| record.kind == kind);
        records
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.remove_item(TRANSACTIONS_KEY).await
    }
}

/// Hashes of the latest submissions, newest first, capped at
/// [`MAX_RECENT_TXS`].
#[derive(Clone)]
pub struct RecentTxHashes {
    storage: Storage,
}

impl RecentTxHashes {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn list(&self) -> Vec<String> {
        self.storage.get_item(RECENT_TXS_KEY, Vec::new()).await
    }

    pub async fn push(&self, hash: &str) -> Result<()> {
        let mut hashes = self.list().await;
        hashes.retain(|existing| existing != hash);
        hashes.insert(0, hash.to_owned());
        hashes.truncate(MAX_RECENT_TXS);
        self.storage.set_item(RECENT_TXS_KEY, &hashes).await
    }
}
