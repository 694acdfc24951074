//! Frame acquisition
//!
//! A `FrameSource` yields frames until the device fails. There is no retry:
//! the first error ends the stream and the capture loop stops with it.

use crate::error::VisionError;
use crate::frame::Frame;
use async_trait::async_trait;
use safesite_core::{CameraConfig, SourceKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Producer of raw frames, paced at the device's native rate
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or an error once the device can no longer deliver
    async fn next_frame(&mut self) -> Result<Frame, VisionError>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// Build the source selected by the camera configuration
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, VisionError> {
    match config.source {
        SourceKind::Directory => Ok(Box::new(DirectorySource::open(
            &config.directory,
            config.frame_interval(),
            config.loop_directory,
        )?)),
        #[cfg(feature = "opencv")]
        SourceKind::Device => Ok(Box::new(device::CameraSource::open(config)?)),
        #[cfg(not(feature = "opencv"))]
        SourceKind::Device => Err(VisionError::Config(
            "device capture requires safesite-eye to be built with the `opencv` feature".to_string(),
        )),
    }
}

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Replays still images from a directory in file-name order
pub struct DirectorySource {
    paths: Vec<PathBuf>,
    position: usize,
    looping: bool,
    frame_interval: Duration,
    ticker: Option<Interval>,
    sequence: u64,
}

impl DirectorySource {
    /// Scan `dir` for JPEG/PNG files
    pub fn open(dir: &Path, frame_interval: Duration, looping: bool) -> Result<Self, VisionError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(VisionError::Camera(format!(
                "no images found in {}",
                dir.display()
            )));
        }

        info!(
            "Directory source {} opened with {} images",
            dir.display(),
            paths.len()
        );
        Ok(Self::from_paths(paths, frame_interval, looping))
    }

    pub fn from_paths(paths: Vec<PathBuf>, frame_interval: Duration, looping: bool) -> Self {
        Self {
            paths,
            position: 0,
            looping,
            frame_interval,
            ticker: None,
            sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    async fn pace(&mut self) {
        if self.frame_interval.is_zero() {
            return;
        }
        let period = self.frame_interval;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        ticker.tick().await;
    }
}

#[async_trait]
impl FrameSource for DirectorySource {
    async fn next_frame(&mut self) -> Result<Frame, VisionError> {
        if self.position >= self.paths.len() {
            if !self.looping || self.paths.is_empty() {
                return Err(VisionError::Camera("frame source exhausted".to_string()));
            }
            self.position = 0;
        }

        self.pace().await;

        let path = self.paths[self.position].clone();
        self.position += 1;

        let decoded = tokio::task::spawn_blocking(move || image::open(&path).map(|img| img.to_rgb8()))
            .await
            .map_err(|e| VisionError::Camera(format!("decoder task failed: {}", e)))??;

        self.sequence += 1;
        debug!(sequence = self.sequence, "frame decoded");
        Ok(Frame::new(self.sequence, decoded))
    }

    fn describe(&self) -> String {
        format!("directory replay ({} images)", self.paths.len())
    }
}

#[cfg(feature = "opencv")]
pub mod device {
    //! Live capture through OpenCV. Reads happen on a dedicated OS thread
    //! because `VideoCapture::read` blocks for a full frame period.

    use super::FrameSource;
    use crate::error::VisionError;
    use crate::frame::Frame;
    use async_trait::async_trait;
    use image::RgbImage;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
    };
    use safesite_core::CameraConfig;
    use tokio::sync::mpsc;
    use tracing::{error, info, warn};

    const FRAME_BUFFER_SIZE: usize = 2;

    pub struct CameraSource {
        device_id: u32,
        frames: mpsc::Receiver<Result<Frame, VisionError>>,
    }

    impl CameraSource {
        pub fn open(config: &CameraConfig) -> Result<Self, VisionError> {
            let device_id = config.device_id;
            let mut capture = VideoCapture::new(device_id as i32, CAP_ANY)
                .map_err(|e| VisionError::Camera(format!("Failed to open camera {}: {}", device_id, e)))?;

            if !capture.is_opened()? {
                return Err(VisionError::Camera(format!("Camera {} failed to open", device_id)));
            }

            capture.set(CAP_PROP_FRAME_WIDTH, config.resolution.0 as f64)?;
            capture.set(CAP_PROP_FRAME_HEIGHT, config.resolution.1 as f64)?;
            capture.set(CAP_PROP_FPS, config.frame_rate as f64)?;

            info!(
                "Camera {} initialized at {}x{} @ {}fps",
                device_id, config.resolution.0, config.resolution.1, config.frame_rate
            );

            let (tx, rx) = mpsc::channel(FRAME_BUFFER_SIZE);
            std::thread::Builder::new()
                .name(format!("camera-{}", device_id))
                .spawn(move || read_frames(capture, tx))?;

            Ok(Self { device_id, frames: rx })
        }
    }

    fn read_frames(mut capture: VideoCapture, tx: mpsc::Sender<Result<Frame, VisionError>>) {
        let mut sequence = 0u64;
        loop {
            let result = read_one(&mut capture).map(|image| {
                sequence += 1;
                Frame::new(sequence, image)
            });
            let failed = result.is_err();
            if let Err(e) = &result {
                error!("Camera read error: {}", e);
            }
            if tx.blocking_send(result).is_err() {
                warn!("Frame receiver dropped, stopping camera thread");
                break;
            }
            if failed {
                break;
            }
        }
        info!("Camera thread stopped");
    }

    fn read_one(capture: &mut VideoCapture) -> Result<RgbImage, VisionError> {
        let mut bgr = Mat::default();
        if !capture.read(&mut bgr)? || bgr.empty() {
            return Err(VisionError::Camera("camera returned no frame".to_string()));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let data = rgb.data_bytes()?.to_vec();
        RgbImage::from_raw(width, height, data)
            .ok_or_else(|| VisionError::Camera("frame buffer size mismatch".to_string()))
    }

    #[async_trait]
    impl FrameSource for CameraSource {
        async fn next_frame(&mut self) -> Result<Frame, VisionError> {
            match self.frames.recv().await {
                Some(result) => result,
                None => Err(VisionError::Camera(format!(
                    "camera {} capture thread ended",
                    self.device_id
                ))),
            }
        }

        fn describe(&self) -> String {
            format!("camera {}", self.device_id)
        }
    }
}
