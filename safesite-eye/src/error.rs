//! Error types for safesite-eye

use safesite_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Core(inner) => inner,
            VisionError::Io(io) => CoreError::Io(io),
            VisionError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Storage(format!("Vision error: {}", other)),
        }
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_error_display() {
        let err = VisionError::Camera("device 0 unplugged".to_string());
        assert!(err.to_string().contains("Camera error"));
        assert!(err.to_string().contains("device 0 unplugged"));
    }

    #[test]
    fn test_vision_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let vision_err: VisionError = io_err.into();
        assert!(matches!(vision_err, VisionError::Io(_)));
    }

    #[test]
    fn test_vision_error_to_core_error() {
        let core_err: CoreError = VisionError::Detection("timeout".to_string()).into();
        match core_err {
            CoreError::Storage(msg) => {
                assert!(msg.contains("Vision error"));
                assert!(msg.contains("timeout"));
            }
            _ => panic!("Expected Storage error"),
        }

        let core_err: CoreError = VisionError::Config("bad dir".to_string()).into();
        assert!(matches!(core_err, CoreError::Configuration(_)));

        let core_err: CoreError = VisionError::Core(CoreError::NoFrame).into();
        assert!(matches!(core_err, CoreError::NoFrame));
    }
}
