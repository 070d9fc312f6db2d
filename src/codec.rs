//! Codec adapter: bytes in, compressed bytes out.
//!
//! The batch processor only talks to the [`Codec`] trait. [`ImageCodec`] is the
//! production implementation on top of the `image` crate, with `oxipng` as the
//! PNG post-pass.

use crate::constants::{
    AVIF_MIN_QUALITY, AVIF_SPEED, LIBDEFLATER_HIGH_LEVEL, LIBDEFLATER_LOW_LEVEL, OXIPNG_PRESET,
    WEBP_MAX_QUALITY, WEBP_QUALITY_BOOST, ZOPFLI_ITERATIONS,
};
use crate::error::CodecError;
use crate::formats::OutputFormat;
use crate::validation::decode_limits;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageEncoder, ImageError, ImageReader};
use oxipng::{Deflaters, Options};
use std::io::Cursor;
use std::num::NonZeroU8;

#[derive(Debug, Clone, Copy)]
pub struct EncodeRequest<'a> {
    pub format: OutputFormat,
    pub quality: u8,
    pub icc_profile: Option<&'a [u8]>,
    /// Box the decoded image must fit into, aspect ratio preserved.
    pub resize_to: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
    pub input_size: u64,
    pub output_size: u64,
}

pub trait Codec: Send + Sync {
    fn compress(&self, input: &[u8], request: &EncodeRequest<'_>) -> Result<Compressed, CodecError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

impl Codec for ImageCodec {
    fn compress(&self, input: &[u8], request: &EncodeRequest<'_>) -> Result<Compressed, CodecError> {
        let mut reader = ImageReader::new(Cursor::new(input))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode(ImageError::IoError(e)))?;
        reader.limits(decode_limits());
        let mut decoder = reader.into_decoder().map_err(CodecError::Decode)?;
        let orientation = decoder.orientation().map_err(CodecError::Decode)?;
        let mut img = DynamicImage::from_decoder(decoder).map_err(CodecError::Decode)?;
        // Bake the EXIF rotation into the pixels; the re-encoded file carries no EXIF.
        img.apply_orientation(orientation);

        if let Some((max_w, max_h)) = request.resize_to {
            img = img.resize(max_w, max_h, FilterType::Lanczos3);
        }

        let bytes = encode_image(&img, request)?;
        let output_size = bytes.len() as u64;
        Ok(Compressed {
            bytes,
            extension: request.format.extension(),
            input_size: input.len() as u64,
            output_size,
        })
    }
}

pub fn encode_image(img: &DynamicImage, request: &EncodeRequest<'_>) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();

    match request.format {
        OutputFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, request.quality);
            attach_icc_profile(&mut encoder, request.icc_profile);
            // JPEG has no alpha channel
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(CodecError::Encode)?;
        }
        OutputFormat::Png => {
            let mut encoder = PngEncoder::new(&mut buf);
            attach_icc_profile(&mut encoder, request.icc_profile);
            img.write_with_encoder(encoder).map_err(CodecError::Encode)?;
            buf = optimize_png(&buf, request.quality)?;
        }
        OutputFormat::WebP => {
            if request.icc_profile.is_some() {
                tracing::debug!("WebP output does not embed ICC profiles, skipping");
            }
            buf = encode_webp(img, webp_quality(request.quality))?;
        }
        OutputFormat::Avif => {
            let mut encoder =
                AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, avif_quality(request.quality));
            attach_icc_profile(&mut encoder, request.icc_profile);
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_with_encoder(encoder)
                .map_err(CodecError::Encode)?;
        }
    }

    Ok(buf)
}

pub fn avif_quality(quality: u8) -> u8 {
    let scaled = (f64::from(quality) * 0.6).round() as u8;
    scaled.max(AVIF_MIN_QUALITY)
}

/// Lossy WebP runs a little above the requested quality, capped.
pub fn webp_quality(quality: u8) -> u8 {
    quality.saturating_add(WEBP_QUALITY_BOOST).min(WEBP_MAX_QUALITY)
}

fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, CodecError> {
    let (width, height) = (img.width(), img.height());
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(&rgba, width, height).encode_simple(false, f32::from(quality))
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(&rgb, width, height).encode_simple(false, f32::from(quality))
    };
    encoded
        .map(|memory| memory.to_vec())
        .map_err(|e| CodecError::WebPEncoding(format!("{:?}", e)))
}

fn attach_icc_profile<E: ImageEncoder>(encoder: &mut E, icc_profile: Option<&[u8]>) {
    if let Some(profile) = icc_profile {
        if let Err(e) = encoder.set_icc_profile(profile.to_vec()) {
            tracing::debug!(error = %e, "Encoder does not embed ICC profiles, skipping");
        }
    }
}

/// Lossless PNG post-pass; effort follows the requested quality.
pub fn optimize_png(data: &[u8], quality: u8) -> Result<Vec<u8>, CodecError> {
    let mut options = Options::from_preset(OXIPNG_PRESET);

    options.deflate = if quality >= 90 {
        Deflaters::Zopfli {
            iterations: NonZeroU8::new(ZOPFLI_ITERATIONS).unwrap_or(NonZeroU8::MIN),
        }
    } else if quality >= 70 {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_HIGH_LEVEL,
        }
    } else {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_LOW_LEVEL,
        }
    };

    oxipng::optimize_from_memory(data, &options)
        .map_err(|e| CodecError::PngOptimization(e.to_string()))
}

/// Pulls the embedded ICC profile out of a reference image, if it has one.
pub fn extract_icc_profile(reference: &[u8]) -> Option<Vec<u8>> {
    let reader = ImageReader::new(Cursor::new(reference))
        .with_guessed_format()
        .ok()?;
    let mut decoder = match reader.into_decoder() {
        Ok(decoder) => decoder,
        Err(e) => {
            tracing::warn!(error = %e, "Colour profile reference is not a readable image");
            return None;
        }
    };
    decoder.icc_profile().ok().flatten()
}
