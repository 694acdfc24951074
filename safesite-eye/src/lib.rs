//! safesite-eye: frame pipeline for PPE compliance monitoring
//!
//! Acquires frames from a camera or an image directory, runs them through an
//! external detector, keeps the shared compliance status current, and fans
//! annotated JPEG frames out to any number of stream viewers.

pub mod annotation;
pub mod broadcaster;
pub mod camera;
pub mod capture_loop;
pub mod detection;
pub mod error;
pub mod frame;
pub mod monitor;

pub use annotation::{Annotator, Overlay};
pub use broadcaster::{FrameBroadcaster, FrameSubscription};
pub use camera::{open_source, DirectorySource, FrameSource};
pub use capture_loop::{CaptureHandle, CaptureLoop, StopReason};
pub use detection::{build_detector, ConfidenceFilter, DetectionAdapter, HttpDetector};
pub use error::VisionError;
pub use frame::{EncodedFrame, Frame};
pub use monitor::{LoopState, MonitorState, MonitorStats};
