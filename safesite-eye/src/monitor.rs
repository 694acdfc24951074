//! Process-wide monitor state shared between the capture loop and requests

use crate::frame::EncodedFrame;
use bytes::Bytes;
use parking_lot::RwLock;
use safesite_core::{ComplianceStatus, LatestFrame};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Lifecycle of the capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Running,
    Stopped,
}

/// Counters reported by `/metrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub frames_processed: u64,
    pub detection_failures: u64,
    pub alerts_logged: u64,
    pub log_failures: u64,
}

/// Shared state written only by the capture loop.
///
/// Locks are held just long enough to clone or swap a value, so readers never
/// stall the loop and never see a half-written status.
pub struct MonitorState {
    status: RwLock<ComplianceStatus>,
    latest: RwLock<Option<EncodedFrame>>,
    loop_state: RwLock<LoopState>,
    ai_enabled: AtomicBool,
    alarm_active: AtomicBool,
    frames_processed: AtomicU64,
    detection_failures: AtomicU64,
    alerts_logged: AtomicU64,
    log_failures: AtomicU64,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl MonitorState {
    pub fn new(ai_enabled: bool, alarm_active: bool) -> Self {
        Self {
            status: RwLock::new(ComplianceStatus::Scanning),
            latest: RwLock::new(None),
            loop_state: RwLock::new(LoopState::Stopped),
            ai_enabled: AtomicBool::new(ai_enabled),
            alarm_active: AtomicBool::new(alarm_active),
            frames_processed: AtomicU64::new(0),
            detection_failures: AtomicU64::new(0),
            alerts_logged: AtomicU64::new(0),
            log_failures: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> ComplianceStatus {
        self.status.read().clone()
    }

    pub fn set_status(&self, status: ComplianceStatus) {
        *self.status.write() = status;
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai_enabled.load(Ordering::Acquire)
    }

    pub fn set_ai_enabled(&self, enabled: bool) {
        self.ai_enabled.store(enabled, Ordering::Release);
    }

    pub fn alarm_active(&self) -> bool {
        self.alarm_active.load(Ordering::Acquire)
    }

    pub fn set_alarm_active(&self, active: bool) {
        self.alarm_active.store(active, Ordering::Release);
    }

    pub fn latest_frame(&self) -> Option<EncodedFrame> {
        self.latest.read().clone()
    }

    pub fn set_latest_frame(&self, frame: EncodedFrame) {
        *self.latest.write() = Some(frame);
    }

    pub fn loop_state(&self) -> LoopState {
        *self.loop_state.read()
    }

    pub fn set_loop_state(&self, state: LoopState) {
        *self.loop_state.write() = state;
    }

    pub fn record_frame(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection_failure(&self) {
        self.detection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_logged(&self) {
        self.alerts_logged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_log_failure(&self) {
        self.log_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            alerts_logged: self.alerts_logged.load(Ordering::Relaxed),
            log_failures: self.log_failures.load(Ordering::Relaxed),
        }
    }
}

impl LatestFrame for MonitorState {
    fn latest_jpeg(&self) -> Option<Bytes> {
        self.latest.read().as_ref().map(|f| f.jpeg().clone())
    }
}
