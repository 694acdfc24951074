// Service assembly: wires the capture pipeline and the HTTP state together

use crate::http::ApiState;
use crate::metrics::Metrics;
use safesite_core::{AlertLogger, SafesiteConfig};
use safesite_eye::{
    build_detector, open_source, Annotator, CaptureLoop, DetectionAdapter, FrameBroadcaster,
    FrameSource, MonitorState,
};
use safesite_storage::{MemoryAlertLog, SledAlertLog, SnapshotService};
use std::sync::Arc;
use tracing::info;

/// Where audit entries go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Sled database at `storage.audit_log_path`
    Durable,
    /// Process memory only; lost on exit
    Ephemeral,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Audit log unavailable: {0}")]
    Storage(#[from] safesite_core::Error),

    #[error("Frame source unavailable: {0}")]
    Source(String),

    #[error("Detector unavailable: {0}")]
    Detector(String),
}

/// Everything the binary needs: the HTTP state plus the not-yet-started loop
pub struct Services {
    pub api: ApiState,
    pub capture: CaptureLoop,
}

impl Services {
    /// Open storage, the frame source and the detector described by `config`
    pub fn assemble(config: &SafesiteConfig, mode: StorageMode) -> Result<Self, StartupError> {
        let logger: Arc<dyn AlertLogger> = match mode {
            StorageMode::Durable => Arc::new(SledAlertLog::open(&config.storage.audit_log_path)?),
            StorageMode::Ephemeral => {
                info!("Audit log is in-memory; entries will not survive a restart");
                Arc::new(MemoryAlertLog::new())
            }
        };

        let source = open_source(&config.camera).map_err(|e| StartupError::Source(e.to_string()))?;
        info!("📷 Frame source: {}", source.describe());

        let detector = build_detector(&config.detection).map_err(|e| StartupError::Detector(e.to_string()))?;

        Ok(Self::with_parts(config, source, detector, logger))
    }

    /// Assemble around caller-supplied parts
    pub fn with_parts(
        config: &SafesiteConfig,
        source: Box<dyn FrameSource>,
        detector: Arc<dyn DetectionAdapter>,
        logger: Arc<dyn AlertLogger>,
    ) -> Self {
        let monitor = Arc::new(MonitorState::new(
            config.detection.enabled_at_start,
            config.stream.alarm_at_start,
        ));
        let broadcaster = Arc::new(FrameBroadcaster::new(config.stream.subscriber_buffer));
        let snapshots = Arc::new(SnapshotService::new(
            monitor.clone(),
            config.storage.captures_dir.clone(),
        ));

        let capture = CaptureLoop::new(
            source,
            detector,
            logger.clone(),
            monitor.clone(),
            broadcaster.clone(),
        )
        .with_annotator(Annotator::new(config.stream.jpeg_quality));

        Self {
            api: ApiState {
                monitor,
                broadcaster,
                logger,
                snapshots,
                metrics: Arc::new(Metrics::new()),
            },
            capture,
        }
    }
}
