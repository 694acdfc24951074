//! Overlay rendering and JPEG encoding
//!
//! Drawing is done directly on the RGB buffer with a small 5x7 bitmap font so
//! annotation needs nothing beyond the `image` crate.

use crate::error::VisionError;
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use safesite_core::{ComplianceStatus, Detection};

const VIOLATION_COLOR: Rgb<u8> = Rgb([230, 40, 40]);
const OK_COLOR: Rgb<u8> = Rgb([40, 200, 70]);
const SCANNING_COLOR: Rgb<u8> = Rgb([90, 90, 90]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;
const BANNER_SCALE: i32 = 2;

/// What the detector saw on a frame and the verdict it produced
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub detections: Vec<Detection>,
    pub status: ComplianceStatus,
}

/// Renders overlays and encodes the result
#[derive(Debug, Clone, Copy)]
pub struct Annotator {
    jpeg_quality: u8,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(80)
    }
}

impl Annotator {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Encode `image` with the overlay drawn on a copy, or as-is without one
    pub fn render(&self, image: &RgbImage, overlay: Option<&Overlay>) -> Result<Bytes, VisionError> {
        match overlay {
            Some(overlay) => {
                let mut canvas = image.clone();
                draw_overlay(&mut canvas, overlay);
                encode_jpeg(&canvas, self.jpeg_quality)
            }
            None => encode_jpeg(image, self.jpeg_quality),
        }
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes, VisionError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(VisionError::Encoding("cannot encode an empty image".to_string()));
    }
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| VisionError::Encoding(format!("JPEG encode failed: {}", err)))?;
    Ok(Bytes::from(buffer))
}

/// Boxes, labels and the status banner
pub fn draw_overlay(image: &mut RgbImage, overlay: &Overlay) {
    for detection in &overlay.detections {
        let color = box_color(detection);
        let (left, top, right, bottom) = pixel_box(image, detection);
        draw_rectangle(image, left, top, right, bottom, color);
        // second pass one pixel in, so boxes survive JPEG compression
        draw_rectangle(image, left + 1, top + 1, right - 1, bottom - 1, color);

        let text = format!(
            "{} {:.0}%",
            detection.label,
            detection.confidence * 100.0
        );
        let label_y = (top - GLYPH_HEIGHT - 4).max(0);
        fill_rect(
            image,
            left,
            label_y,
            left + text_width(&text, 1) + 2,
            label_y + GLYPH_HEIGHT + 2,
            LABEL_BACKGROUND,
        );
        draw_text(image, left + 1, label_y + 1, &text, 1, color);
    }

    draw_banner(image, &overlay.status);
}

fn box_color(detection: &Detection) -> Rgb<u8> {
    if detection.violation().is_some() {
        VIOLATION_COLOR
    } else {
        OK_COLOR
    }
}

fn banner_text(status: &ComplianceStatus) -> String {
    match status {
        ComplianceStatus::Scanning => "SCANNING".to_string(),
        ComplianceStatus::Compliant => "ALL PPE DETECTED".to_string(),
        ComplianceStatus::Alert(missing) => {
            let items: Vec<&str> = missing.iter().map(|k| k.display_name()).collect();
            format!("ALERT: {} MISSING", items.join(", "))
        }
    }
}

fn draw_banner(image: &mut RgbImage, status: &ComplianceStatus) {
    let color = match status {
        ComplianceStatus::Scanning => SCANNING_COLOR,
        ComplianceStatus::Compliant => OK_COLOR,
        ComplianceStatus::Alert(_) => VIOLATION_COLOR,
    };
    let height = GLYPH_HEIGHT * BANNER_SCALE + 8;
    let width = image.width() as i32;
    fill_rect(image, 0, 0, width - 1, height - 1, color);
    draw_text(image, 6, 4, &banner_text(status), BANNER_SCALE, TEXT_COLOR);
}

fn pixel_box(image: &RgbImage, detection: &Detection) -> (i32, i32, i32, i32) {
    let max_x = image.width().saturating_sub(1) as f32;
    let max_y = image.height().saturating_sub(1) as f32;
    let bbox = detection.bounding_box;
    let (right, bottom) = bbox.max_corner();
    (
        bbox.x.clamp(0.0, max_x).round() as i32,
        bbox.y.clamp(0.0, max_y).round() as i32,
        right.clamp(0.0, max_x).round() as i32,
        bottom.clamp(0.0, max_y).round() as i32,
    )
}

fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE * scale
}

fn put_pixel(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    if right < left || bottom < top {
        return;
    }
    for x in left..=right {
        put_pixel(image, x, top, color);
        put_pixel(image, x, bottom, color);
    }
    for y in top..=bottom {
        put_pixel(image, left, y, color);
        put_pixel(image, right, y, color);
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(width - 1);
    let bottom = bottom.min(height - 1);
    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, scale: i32, color: Rgb<u8>) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        for dy in 0..scale {
                            for dx in 0..scale {
                                put_pixel(
                                    image,
                                    x + col * scale + dx,
                                    y + row as i32 * scale + dy,
                                    color,
                                );
                            }
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE * scale;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        ',' => [0, 0, 0, 0, 0b01100, 0b00100, 0b01000],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use safesite_core::{BoundingBox, ViolationKind};

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([0, 0, 255]))
    }

    #[test]
    fn test_violation_boxes_are_red() {
        let mut image = blank(64, 64);
        let overlay = Overlay {
            detections: vec![Detection::new(
                "NO-Hardhat",
                0.9,
                BoundingBox::new(10.0, 30.0, 20.0, 20.0),
            )],
            status: ComplianceStatus::alert([ViolationKind::HardHat]),
        };
        draw_overlay(&mut image, &overlay);
        assert_eq!(*image.get_pixel(20, 50), VIOLATION_COLOR);
        assert_eq!(*image.get_pixel(10, 40), VIOLATION_COLOR);
        // interior untouched
        assert_eq!(*image.get_pixel(20, 40), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_compliant_boxes_and_banner_are_green() {
        let mut image = blank(64, 64);
        let overlay = Overlay {
            detections: vec![Detection::new(
                "Person",
                0.8,
                BoundingBox::new(30.0, 30.0, 10.0, 10.0),
            )],
            status: ComplianceStatus::Compliant,
        };
        draw_overlay(&mut image, &overlay);
        assert_eq!(*image.get_pixel(30, 35), OK_COLOR);
        assert_eq!(*image.get_pixel(63, 0), OK_COLOR);
    }

    #[test]
    fn test_boxes_outside_frame_are_clamped() {
        let mut image = blank(40, 40);
        let overlay = Overlay {
            detections: vec![Detection::new(
                "NO-Mask",
                1.0,
                BoundingBox::new(-50.0, -50.0, 500.0, 500.0),
            )],
            status: ComplianceStatus::alert([ViolationKind::Mask]),
        };
        draw_overlay(&mut image, &overlay);
        assert_eq!(*image.get_pixel(39, 39), VIOLATION_COLOR);
        assert_eq!(*image.get_pixel(0, 39), VIOLATION_COLOR);
    }

    #[test]
    fn test_banner_text() {
        assert_eq!(banner_text(&ComplianceStatus::Scanning), "SCANNING");
        assert_eq!(
            banner_text(&ComplianceStatus::alert([ViolationKind::SafetyVest, ViolationKind::Mask])),
            "ALERT: MASK, SAFETY VEST MISSING"
        );
    }

    #[test]
    fn test_render_produces_jpeg() {
        let annotator = Annotator::new(75);
        let jpeg = annotator.render(&blank(32, 24), None).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_render_leaves_source_untouched() {
        let source = blank(32, 32);
        let overlay = Overlay {
            detections: Vec::new(),
            status: ComplianceStatus::Scanning,
        };
        Annotator::default().render(&source, Some(&overlay)).unwrap();
        assert_eq!(*source.get_pixel(0, 0), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_empty_image_is_an_error() {
        assert!(matches!(
            encode_jpeg(&RgbImage::new(0, 0), 80),
            Err(VisionError::Encoding(_))
        ));
    }
}
