//! Frames as they move through the capture pipeline

use bytes::Bytes;
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;

/// A raw frame as acquired from a `FrameSource`.
///
/// The pixel buffer is shared behind an `Arc` so detection and annotation can
/// borrow it from a blocking task without copying.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Strictly increasing per source
    pub sequence: u64,
    pub image: Arc<RgbImage>,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self {
            sequence,
            image: Arc::new(image),
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// An annotated, JPEG-encoded frame ready for viewers.
///
/// The multipart part is framed once here; every viewer and the snapshot
/// slot share that single buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub sequence: u64,
    part: Bytes,
    jpeg: Bytes,
}

impl EncodedFrame {
    pub fn new(sequence: u64, jpeg: impl AsRef<[u8]>) -> Self {
        let jpeg = jpeg.as_ref();
        let mut part = Vec::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
        part.extend_from_slice(PART_HEADER);
        part.extend_from_slice(jpeg);
        part.extend_from_slice(PART_TRAILER);
        let part = Bytes::from(part);
        let jpeg = part.slice(PART_HEADER.len()..part.len() - PART_TRAILER.len());
        Self {
            sequence,
            part,
            jpeg,
        }
    }

    /// The encoded image
    pub fn jpeg(&self) -> &Bytes {
        &self.jpeg
    }

    /// One part of a `multipart/x-mixed-replace; boundary=frame` body
    pub fn multipart_chunk(&self) -> Bytes {
        self.part.clone()
    }
}
