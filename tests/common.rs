#![allow(dead_code)]

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use img_squeeze_vault::batch::{BatchPolicy, BatchProcessor};
use img_squeeze_vault::codec::ImageCodec;
use img_squeeze_vault::workspace::{JobStore, ManualClock};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const TTL: Duration = Duration::from_secs(3600);

/// A store rooted in its own temp dir, with a clock the test drives.
pub struct Fixture {
    pub temp_dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub store: Arc<JobStore>,
    pub processor: BatchProcessor,
}

pub fn fixture() -> Fixture {
    fixture_with_policy(BatchPolicy {
        workers: 2,
        ..BatchPolicy::default()
    })
}

pub fn fixture_with_policy(policy: BatchPolicy) -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(JobStore::new(temp_dir.path().join("jobs"), TTL, clock.clone()).unwrap());
    let processor = BatchProcessor::new(store.clone(), Arc::new(ImageCodec), policy).unwrap();
    Fixture {
        temp_dir,
        clock,
        store,
        processor,
    }
}

pub fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// A small picture with enough structure that encoders have work to do.
pub fn sample_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x ^ y) & 0xFF) as u8,
        ])
    }))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(sample_image(width, height), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(sample_image(width, height), ImageFormat::Jpeg)
}

/// Camera-like JPEG: high quality with sensor-style noise.
pub fn photo_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let mut seed = 0x9e37_79b9u32;
    let img = RgbImage::from_fn(width, height, |x, y| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let noise = (seed & 0x0f) as u8;
        Rgb([
            ((x * 255 / width.max(1)) as u8).saturating_add(noise),
            ((y * 255 / height.max(1)) as u8).saturating_add(noise),
            (((x + y) / 3) & 0xFF) as u8,
        ])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .unwrap();
    buf
}

/// Inserts a minimal big-endian EXIF block holding just the orientation tag.
pub fn with_exif_orientation(jpeg: &[u8], orientation: u8) -> Vec<u8> {
    let mut payload = b"Exif\x00\x00MM\x00\x2a\x00\x00\x00\x08".to_vec();
    payload.extend_from_slice(&[0x00, 0x01, 0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    payload.extend_from_slice(&[0x00, orientation, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    let length = (payload.len() + 2) as u16;

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xff, 0xe1]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
    std::fs::write(dir.join(name), png_bytes(width, height)).unwrap();
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}
