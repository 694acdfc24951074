// Seams between the capture pipeline and its collaborators

use crate::error::Result;
use crate::types::AuditLogEntry;
use async_trait::async_trait;
use bytes::Bytes;

/// Durable audit log of alert transitions.
///
/// The capture loop is the only writer. Readers may call `list` while an
/// `append` is in flight and must see either the old or the new tail, never a
/// partial entry.
#[async_trait]
pub trait AlertLogger: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> Result<()>;

    /// All entries, newest first
    async fn list(&self) -> Result<Vec<AuditLogEntry>>;

    /// Newest `limit` entries
    async fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let mut entries = self.list().await?;
        entries.truncate(limit);
        Ok(entries)
    }
}

/// Read access to the most recently processed annotated frame
pub trait LatestFrame: Send + Sync {
    /// JPEG bytes of the last processed frame, `None` before the first frame
    fn latest_jpeg(&self) -> Option<Bytes>;
}
