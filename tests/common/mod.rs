// Shared fixtures for the workspace integration tests
#![allow(dead_code)]

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use image::{Rgb, RgbImage};
use safesite_core::{SafesiteConfig, SourceKind};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Write `count` small PNG frames named so they replay in order
pub fn write_frames(dir: &Path, count: usize) -> PathBuf {
    let frames = dir.join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    for i in 0..count {
        let shade = (i * 20 % 255) as u8;
        RgbImage::from_pixel(48, 32, Rgb([shade, shade, shade]))
            .save(frames.join(format!("frame_{:04}.png", i)))
            .unwrap();
    }
    frames
}

/// Configuration pointing at a frame directory and a temp data dir
pub fn directory_config(frames: &Path, data: &Path, detector_url: &str) -> SafesiteConfig {
    let mut config = SafesiteConfig::default();
    config.camera.source = SourceKind::Directory;
    config.camera.directory = frames.to_path_buf();
    config.camera.frame_rate = 120;
    config.detection.endpoint = detector_url.to_string();
    config.storage.audit_log_path = data.join("audit_log");
    config.storage.captures_dir = data.join("captures");
    config.stream.subscriber_buffer = 64;
    config
}

pub fn detection(label: &str) -> Value {
    json!({"label": label, "confidence": 0.9, "bbox": [2.0, 2.0, 10.0, 10.0]})
}

#[derive(Clone)]
struct FakeDetector {
    script: Arc<Mutex<VecDeque<Value>>>,
    hits: Arc<AtomicUsize>,
}

async fn detect(State(fake): State<FakeDetector>, body: Bytes) -> Json<Value> {
    assert_eq!(&body[..2], &[0xFF, 0xD8], "frames are posted as JPEG");
    fake.hits.fetch_add(1, Ordering::SeqCst);
    let detections = fake
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| json!([]));
    Json(json!({ "detections": detections }))
}

/// Local detection service answering request N with `script[N]`
pub struct DetectorServer {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
}

pub async fn spawn_detector(script: Vec<Value>) -> DetectorServer {
    let fake = FakeDetector {
        script: Arc::new(Mutex::new(script.into())),
        hits: Arc::new(AtomicUsize::new(0)),
    };
    let hits = fake.hits.clone();
    let app = Router::new().route("/detect", post(detect)).with_state(fake);
    let addr = serve(app).await;
    DetectorServer {
        url: format!("http://{}/detect", addr),
        hits,
    }
}

/// Serve `app` on an ephemeral local port
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
