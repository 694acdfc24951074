// Configuration system for SafeSite

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Local capture device (requires the `opencv` feature of safesite-eye)
    Device,
    /// Still images replayed from a directory
    Directory,
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub source: SourceKind,
    /// Capture device index (0, 1, 2, etc.)
    pub device_id: u32,
    /// Requested resolution (width, height)
    pub resolution: (u32, u32),
    /// Requested frame rate; also paces directory replay
    pub frame_rate: u32,
    /// Image directory used when `source` is `directory`
    pub directory: PathBuf,
    /// Restart the directory from the top instead of ending the stream
    pub loop_directory: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Device,
            device_id: 0,
            resolution: (640, 480),
            frame_rate: 30,
            directory: PathBuf::from("./frames"),
            loop_directory: false,
        }
    }
}

impl CameraConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.frame_rate.max(1) as u64)
    }
}

/// External detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// URL the JPEG frame is POSTed to
    pub endpoint: String,
    pub timeout_ms: u64,
    /// Detections below this confidence are discarded. The default of 0.0
    /// keeps everything the detector returns and leaves filtering to it.
    pub confidence_threshold: f32,
    /// Quality of the JPEG uploaded to the detector
    pub jpeg_quality: u8,
    /// Initial value of the AI toggle
    pub enabled_at_start: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/detect".to_string(),
            timeout_ms: 2_000,
            confidence_threshold: 0.0,
            jpeg_quality: 90,
            enabled_at_start: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sled directory holding the audit log
    pub audit_log_path: PathBuf,
    /// Directory receiving snapshot JPEGs
    pub captures_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            audit_log_path: PathBuf::from("./data/audit_log"),
            captures_dir: PathBuf::from("captures"),
        }
    }
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames buffered per subscriber before the oldest are dropped
    pub subscriber_buffer: usize,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Initial value of the alarm toggle
    pub alarm_at_start: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 8,
            jpeg_quality: 80,
            alarm_at_start: true,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub bind_port: u16,
    pub enable_cors: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 5000,
            enable_cors: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `safesite_eye=debug,info`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete SafeSite configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SafesiteConfig {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub storage: StorageConfig,
    pub stream: StreamConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

impl SafesiteConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // Try JSON first
        if let Ok(config) = serde_json::from_str::<SafesiteConfig>(content) {
            return Ok(config);
        }

        // Try TOML
        if let Ok(config) = toml::from_str::<SafesiteConfig>(content) {
            return Ok(config);
        }

        // Try YAML
        if let Ok(config) = serde_yaml::from_str::<SafesiteConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `SAFESITE_*` environment overrides in place
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("SAFESITE_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.network.bind_port = p;
            }
        }

        if let Ok(host) = std::env::var("SAFESITE_HOST") {
            self.network.bind_address = host;
        }

        if let Ok(url) = std::env::var("SAFESITE_DETECTOR_URL") {
            self.detection.endpoint = url;
        }

        if let Ok(data_dir) = std::env::var("SAFESITE_DATA_DIR") {
            let data_dir = PathBuf::from(data_dir);
            self.storage.audit_log_path = data_dir.join("audit_log");
            self.storage.captures_dir = data_dir.join("captures");
        }

        if let Ok(log_level) = std::env::var("SAFESITE_LOG_LEVEL") {
            self.logging.level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let camera = &self.camera;
        if camera.frame_rate == 0 || camera.frame_rate > 120 {
            return Err(ConfigError::ValidationError(
                "camera.frame_rate must be between 1 and 120".to_string(),
            ));
        }

        if camera.resolution.0 == 0 || camera.resolution.1 == 0 {
            return Err(ConfigError::ValidationError(
                "camera.resolution must be non-zero".to_string(),
            ));
        }

        if camera.resolution.0 > 7680 || camera.resolution.1 > 4320 {
            return Err(ConfigError::ValidationError(
                "camera.resolution too large (max 8K)".to_string(),
            ));
        }

        if camera.device_id > 100 {
            return Err(ConfigError::ValidationError(
                "camera.device_id too large (max 100)".to_string(),
            ));
        }

        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ValidationError(
                "detection.confidence_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.detection.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "detection.endpoint cannot be empty".to_string(),
            ));
        }

        if self.detection.jpeg_quality == 0 || self.detection.jpeg_quality > 100 {
            return Err(ConfigError::ValidationError(
                "detection.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.stream.subscriber_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "stream.subscriber_buffer must be > 0".to_string(),
            ));
        }

        if self.stream.jpeg_quality == 0 || self.stream.jpeg_quality > 100 {
            return Err(ConfigError::ValidationError(
                "stream.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.network.bind_port == 0 {
            return Err(ConfigError::ValidationError(
                "network.bind_port cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Configuration(err.to_string())
    }
}
