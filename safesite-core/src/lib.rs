//! safesite-core: domain model for PPE compliance monitoring
//!
//! Holds the detection and status types, the pure `StatusEngine`, the
//! configuration tree, and the ports the capture pipeline talks through.

pub mod types;
pub mod error;
pub mod status;
pub mod ports;
pub mod config;

pub use error::{Error, Result};
pub use types::{
    AuditLogEntry, BoundingBox, ComplianceStatus, Detection, ViolationKind, AUDIT_TIMESTAMP_FORMAT,
};
pub use status::{Evaluation, StatusEngine};
pub use ports::{AlertLogger, LatestFrame};
pub use config::{
    CameraConfig, ConfigError, DetectionConfig, LoggingConfig, NetworkConfig, SafesiteConfig,
    SourceKind, StorageConfig, StreamConfig,
};
