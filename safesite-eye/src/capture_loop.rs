//! The capture loop: one task that owns the frame source and drives every
//! frame through detection, status evaluation, audit logging, annotation and
//! fan-out.

use crate::annotation::{Annotator, Overlay};
use crate::broadcaster::FrameBroadcaster;
use crate::camera::FrameSource;
use crate::detection::DetectionAdapter;
use crate::error::VisionError;
use crate::frame::{EncodedFrame, Frame};
use crate::monitor::{LoopState, MonitorState};
use metrics::{counter, histogram};
use safesite_core::{AlertLogger, AuditLogEntry, StatusEngine};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why the loop reached `Stopped`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit shutdown request
    Shutdown,
    /// The frame source failed; there is no retry
    SourceFailed(String),
}

pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    detector: Arc<dyn DetectionAdapter>,
    logger: Arc<dyn AlertLogger>,
    state: Arc<MonitorState>,
    broadcaster: Arc<FrameBroadcaster>,
    annotator: Annotator,
    engine: StatusEngine,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Arc<dyn DetectionAdapter>,
        logger: Arc<dyn AlertLogger>,
        state: Arc<MonitorState>,
        broadcaster: Arc<FrameBroadcaster>,
    ) -> Self {
        Self {
            source,
            detector,
            logger,
            state,
            broadcaster,
            annotator: Annotator::default(),
            engine: StatusEngine::new(),
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Start the loop on its own task
    pub fn spawn(self) -> CaptureHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = self.state.clone();
        // RUNNING from activation, even before the task is first polled
        state.set_loop_state(LoopState::Running);
        let task = tokio::spawn(self.run(stop_rx));
        CaptureHandle {
            stop: stop_tx,
            task,
            state,
        }
    }

    /// Drive frames until the source fails or `stop` flips to true
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> StopReason {
        self.state.set_loop_state(LoopState::Running);
        info!("Capture loop started on {}", self.source.describe());

        let reason = loop {
            if *stop.borrow() {
                break StopReason::Shutdown;
            }

            let next = tokio::select! {
                biased;
                changed = stop.changed() => {
                    match changed {
                        Ok(()) if !*stop.borrow() => continue,
                        _ => break StopReason::Shutdown,
                    }
                }
                next = self.source.next_frame() => next,
            };

            match next {
                Ok(frame) => self.process(frame).await,
                Err(e) => {
                    error!("Frame source failed, stopping capture loop: {}", e);
                    break StopReason::SourceFailed(e.to_string());
                }
            }
        };

        self.state.set_loop_state(LoopState::Stopped);
        self.broadcaster.close();
        info!(?reason, "Capture loop stopped");
        reason
    }

    async fn process(&mut self, frame: Frame) {
        let overlay = if self.state.ai_enabled() {
            Some(self.evaluate(&frame).await)
        } else {
            None
        };

        let annotator = self.annotator;
        let image = frame.image.clone();
        let rendered = tokio::task::spawn_blocking(move || annotator.render(&image, overlay.as_ref()))
            .await
            .map_err(|e| VisionError::Encoding(format!("annotation task failed: {}", e)))
            .and_then(|result| result);

        match rendered {
            Ok(jpeg) => {
                let encoded = EncodedFrame::new(frame.sequence, jpeg);
                self.state.set_latest_frame(encoded.clone());
                let viewers = self.broadcaster.publish(encoded);
                self.state.record_frame();
                counter!("safesite_frames_processed_total").increment(1);
                histogram!("safesite_frame_latency_seconds")
                    .record(frame.captured_at.elapsed().as_secs_f64());
                debug!(sequence = frame.sequence, viewers, "frame published");
            }
            Err(e) => warn!(sequence = frame.sequence, "Dropping frame: {}", e),
        }
    }

    /// Detect, update the shared status and log the transition if warranted
    async fn evaluate(&mut self, frame: &Frame) -> Overlay {
        let detections = match self.detector.detect(frame).await {
            Ok(detections) => detections,
            Err(e) => {
                warn!(sequence = frame.sequence, "Detection failed, treating frame as empty: {}", e);
                self.state.record_detection_failure();
                counter!("safesite_detection_failures_total").increment(1);
                Vec::new()
            }
        };

        let previous = self.state.status();
        let evaluation = self.engine.evaluate(&previous, &detections);
        self.state.set_status(evaluation.status.clone());
        if evaluation.status != previous {
            info!(status = %evaluation.status, "Compliance status changed");
        }

        if evaluation.should_log && self.state.alarm_active() {
            let entry = AuditLogEntry::now(&evaluation.status);
            match self.logger.append(entry).await {
                Ok(()) => {
                    self.state.record_alert_logged();
                    counter!("safesite_alerts_logged_total").increment(1);
                }
                Err(e) => {
                    self.state.record_log_failure();
                    error!("Failed to append audit log entry: {}", e);
                }
            }
        }

        Overlay {
            detections,
            status: evaluation.status,
        }
    }
}

/// Control handle for a spawned capture loop. Dropping it stops the loop.
pub struct CaptureHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<StopReason>,
    state: Arc<MonitorState>,
}

impl CaptureHandle {
    /// Ask the loop to stop after the frame in flight
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished() && self.state.loop_state() == LoopState::Running
    }

    /// Wait for the loop to reach `Stopped`
    pub async fn join(self) -> Result<StopReason, VisionError> {
        self.task
            .await
            .map_err(|e| VisionError::Camera(format!("capture task panicked: {}", e)))
    }

    /// Stop and wait
    pub async fn shutdown(self) -> Result<StopReason, VisionError> {
        self.stop();
        self.join().await
    }
}
