//! Object detection port and its HTTP client

use crate::annotation::encode_jpeg;
use crate::error::VisionError;
use crate::frame::Frame;
use async_trait::async_trait;
use safesite_core::{DetectionConfig, Detection};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Wraps the external detector.
///
/// An empty vector is a valid answer. Errors are reported to the caller,
/// which decides whether to degrade; implementations never panic on a bad
/// response.
#[async_trait]
pub trait DetectionAdapter: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError>;
}

#[async_trait]
impl<T: DetectionAdapter + ?Sized> DetectionAdapter for Arc<T> {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        (**self).detect(frame).await
    }
}

/// Build the configured detector chain
pub fn build_detector(config: &DetectionConfig) -> Result<Arc<dyn DetectionAdapter>, VisionError> {
    let http = HttpDetector::new(&config.endpoint, Duration::from_millis(config.timeout_ms))?
        .with_jpeg_quality(config.jpeg_quality);
    info!("🧠 Detector endpoint: {}", http.endpoint());
    let filter = ConfidenceFilter::new(http, config.confidence_threshold);
    if filter.threshold() > 0.0 {
        info!("Discarding detections below confidence {:.2}", filter.threshold());
    }
    Ok(Arc::new(filter))
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Posts each frame as a JPEG to a detection service and parses
/// `{"detections": [{"label", "confidence", "bbox": [x, y, w, h]}]}`
pub struct HttpDetector {
    client: reqwest::Client,
    endpoint: String,
    jpeg_quality: u8,
}

impl HttpDetector {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, VisionError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(VisionError::Config("detector endpoint cannot be empty".to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            jpeg_quality: 90,
        })
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DetectionAdapter for HttpDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        let image = frame.image.clone();
        let quality = self.jpeg_quality;
        let body = tokio::task::spawn_blocking(move || encode_jpeg(&image, quality))
            .await
            .map_err(|e| VisionError::Encoding(format!("encoder task failed: {}", e)))??;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Detection(format!("malformed detector response: {}", e)))?;

        let total = parsed.detections.len();
        let detections: Vec<Detection> = parsed
            .detections
            .into_iter()
            .filter(|d| d.bounding_box.is_valid() && (0.0..=1.0).contains(&d.confidence))
            .collect();
        if detections.len() != total {
            debug!(
                "dropped {} detections with invalid boxes or confidences",
                total - detections.len()
            );
        }
        Ok(detections)
    }
}

/// Discards detections below a confidence threshold
pub struct ConfidenceFilter<D> {
    inner: D,
    threshold: f32,
}

impl<D: DetectionAdapter> ConfidenceFilter<D> {
    pub fn new(inner: D, threshold: f32) -> Self {
        Self {
            inner,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

#[async_trait]
impl<D: DetectionAdapter> DetectionAdapter for ConfidenceFilter<D> {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        let mut detections = self.inner.detect(frame).await?;
        detections.retain(|d| d.confidence >= self.threshold);
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use mockall::mock;
    use safesite_core::BoundingBox;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    mock! {
        Inner {}
        #[async_trait]
        impl DetectionAdapter for Inner {
            async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError>;
        }
    }

    fn frame() -> Frame {
        Frame::new(1, RgbImage::new(16, 16))
    }

    fn boxed(label: &str, confidence: f32) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(1.0, 1.0, 4.0, 4.0))
    }

    #[tokio::test]
    async fn test_confidence_filter_drops_low_scores() {
        let mut inner = MockInner::new();
        inner.expect_detect().times(1).returning(|_| {
            Ok(vec![
                boxed("NO-Mask", 0.49),
                boxed("Person", 0.5),
                boxed("NO-Hardhat", 0.93),
            ])
        });

        let filter = ConfidenceFilter::new(inner, 0.5);
        let labels: Vec<String> = filter
            .detect(&frame())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.label)
            .collect();
        assert_eq!(labels, vec!["Person", "NO-Hardhat"]);
    }

    #[tokio::test]
    async fn test_confidence_filter_passes_errors_through() {
        let mut inner = MockInner::new();
        inner
            .expect_detect()
            .returning(|_| Err(VisionError::Detection("model not loaded".to_string())));

        let filter = ConfidenceFilter::new(inner, 0.5);
        assert!(matches!(
            filter.detect(&frame()).await,
            Err(VisionError::Detection(_))
        ));
    }

    /// Accept one HTTP request, drain it, answer with `status` and `body`
    async fn one_shot_server(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if let Some(end) = find_header_end(&request) {
                    let headers = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/detect", addr)
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    #[tokio::test]
    async fn test_http_detector_parses_response() {
        let url = one_shot_server(
            "200 OK",
            r#"{"detections":[
                {"label":"NO-Safety Vest","confidence":0.8,"bbox":[2.0,3.0,5.0,6.0]},
                {"label":"Person","confidence":0.9,"bbox":[0.0,0.0,-1.0,4.0]}
            ]}"#,
        )
        .await;

        let detector = HttpDetector::new(url, Duration::from_secs(5)).unwrap();
        let detections = detector.detect(&frame()).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "NO-Safety Vest");
        assert_eq!(detections[0].bounding_box, BoundingBox::new(2.0, 3.0, 5.0, 6.0));
    }

    #[tokio::test]
    async fn test_http_detector_drops_out_of_range_confidences() {
        let url = one_shot_server(
            "200 OK",
            r#"{"detections":[
                {"label":"NO-Hardhat","confidence":7.0,"bbox":[1.0,1.0,4.0,4.0]},
                {"label":"NO-Mask","confidence":-0.1,"bbox":[1.0,1.0,4.0,4.0]},
                {"label":"NO-Safety Vest","confidence":1.0,"bbox":[1.0,1.0,4.0,4.0]}
            ]}"#,
        )
        .await;

        let detector = HttpDetector::new(url, Duration::from_secs(5)).unwrap();
        let labels: Vec<String> = detector
            .detect(&frame())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.label)
            .collect();
        assert_eq!(labels, vec!["NO-Safety Vest"]);
    }

    #[tokio::test]
    async fn test_default_chain_keeps_low_confidence_violations() {
        let url = one_shot_server(
            "200 OK",
            r#"{"detections":[{"label":"NO-Hardhat","confidence":0.4,"bbox":[2.0,2.0,6.0,6.0]}]}"#,
        )
        .await;

        let config = DetectionConfig {
            endpoint: url,
            ..DetectionConfig::default()
        };
        let detector = build_detector(&config).unwrap();
        let detections = detector.detect(&frame()).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "NO-Hardhat");
    }

    #[test]
    fn test_builder_settings_are_clamped() {
        let detector = HttpDetector::new("http://127.0.0.1:1/detect", Duration::from_secs(1))
            .unwrap()
            .with_jpeg_quality(0);
        assert_eq!(detector.jpeg_quality, 1);
        assert_eq!(detector.endpoint(), "http://127.0.0.1:1/detect");

        let filter = ConfidenceFilter::new(MockInner::new(), 1.7);
        assert_eq!(filter.threshold(), 1.0);
    }

    #[tokio::test]
    async fn test_http_detector_empty_body_is_no_detections() {
        let url = one_shot_server("200 OK", "{}").await;
        let detector = HttpDetector::new(url, Duration::from_secs(5)).unwrap();
        assert!(detector.detect(&frame()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_detector_server_error() {
        let url = one_shot_server("500 Internal Server Error", "{}").await;
        let detector = HttpDetector::new(url, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            detector.detect(&frame()).await,
            Err(VisionError::Network(_))
        ));
    }

    #[test]
    fn test_http_detector_rejects_empty_endpoint() {
        assert!(HttpDetector::new("  ", Duration::from_secs(1)).is_err());
    }
}
