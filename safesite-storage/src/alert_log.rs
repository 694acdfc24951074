// Audit log backends

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use parking_lot::RwLock;
use safesite_core::{AlertLogger, AuditLogEntry, Error, Result, AUDIT_TIMESTAMP_FORMAT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const AUDIT_TREE: &str = "audit_logs";

/// Persisted row: `(timestamp text, status_message text)`
#[derive(Debug, Serialize, Deserialize)]
struct AuditRow {
    timestamp: String,
    status_message: String,
}

impl AuditRow {
    fn from_entry(entry: &AuditLogEntry) -> Self {
        Self {
            timestamp: entry.timestamp_text(),
            status_message: entry.message.clone(),
        }
    }

    fn into_entry(self) -> Result<AuditLogEntry> {
        let naive = NaiveDateTime::parse_from_str(&self.timestamp, AUDIT_TIMESTAMP_FORMAT)
            .map_err(|e| Error::Deserialization(format!("bad audit timestamp {:?}: {}", self.timestamp, e)))?;
        Ok(AuditLogEntry::new(local_from_naive(naive), self.status_message))
    }
}

fn local_from_naive(naive: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// Sled-backed audit log.
///
/// Keys are the entry's timestamp in big-endian nanoseconds followed by a
/// sled-generated id, so iteration order is timestamp order and two entries
/// written in the same instant never collide.
pub struct SledAlertLog {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledAlertLog {
    /// Open or create the log at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| Error::Storage(format!("Sled error: {}", e)))?;
        let tree = db
            .open_tree(AUDIT_TREE)
            .map_err(|e| Error::Storage(format!("Sled open_tree error: {}", e)))?;
        info!("Opened audit log at {:?} ({} entries)", path, tree.len());
        Ok(Self { db, tree })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn key_for(&self, entry: &AuditLogEntry) -> Result<[u8; 16]> {
        let nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or(0).max(0) as u64;
        let id = self
            .db
            .generate_id()
            .map_err(|e| Error::Storage(format!("Sled id error: {}", e)))?;
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&nanos.to_be_bytes());
        key[8..].copy_from_slice(&id.to_be_bytes());
        Ok(key)
    }

    fn decode(value: &[u8]) -> Result<AuditLogEntry> {
        let row: AuditRow = serde_json::from_slice(value)?;
        row.into_entry()
    }

    fn newest(&self, limit: Option<usize>) -> Result<Vec<AuditLogEntry>> {
        let iter = self.tree.iter().rev();
        let mut entries = Vec::new();
        for item in iter {
            if limit.map_or(false, |limit| entries.len() >= limit) {
                break;
            }
            let (_, value) = item.map_err(|e| Error::Storage(format!("Sled iter error: {}", e)))?;
            entries.push(Self::decode(&value)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl AlertLogger for SledAlertLog {
    async fn append(&self, entry: AuditLogEntry) -> Result<()> {
        let key = self.key_for(&entry)?;
        let value = serde_json::to_vec(&AuditRow::from_entry(&entry))?;
        self.tree
            .insert(key, value)
            .map_err(|e| Error::Storage(format!("Sled insert error: {}", e)))?;
        self.tree
            .flush_async()
            .await
            .map_err(|e| Error::Storage(format!("Sled flush error: {}", e)))?;
        debug!("audit entry appended: {}", entry.message);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AuditLogEntry>> {
        self.newest(None)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        self.newest(Some(limit))
    }
}

/// Non-durable audit log for ephemeral runs and tests
#[derive(Default)]
pub struct MemoryAlertLog {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryAlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl AlertLogger for MemoryAlertLog {
    async fn append(&self, entry: AuditLogEntry) -> Result<()> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AuditLogEntry>> {
        let mut entries: Vec<AuditLogEntry> = self.entries.read().iter().rev().cloned().collect();
        // stable: equal timestamps stay newest-insert first
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }
}
