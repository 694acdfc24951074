//! safesite-storage: durable side of the monitor
//!
//! Audit log backends implementing `safesite_core::AlertLogger` and the
//! snapshot writer for incident captures.

pub mod alert_log;
pub mod snapshot;

pub use alert_log::{MemoryAlertLog, SledAlertLog};
pub use snapshot::SnapshotService;
