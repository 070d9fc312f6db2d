use crate::constants::{
    MAX_BATCH_FILES, MAX_DECODE_ALLOC, MAX_DECODE_DIMENSION, MAX_FILE_SIZE, MAX_QUALITY,
    MIN_QUALITY,
};
use crate::error::{ItemFailureKind, ValidationError};
use crate::formats::OutputFormat;
use image::{ImageReader, Limits};
use std::io::Cursor;
use std::path::Path;

const GENERIC_CONTENT_TYPE: &str = "application/octet-stream";

/// Request-shape limits checked before any work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_files: usize,
    pub max_file_size: u64,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_files: MAX_BATCH_FILES,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

/// Rejects empty, oversized or over-long batches as a whole.
pub fn validate_batch_shape<'a, I>(items: I, limits: &BatchLimits) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let mut count = 0usize;
    for (name, size) in items {
        count += 1;
        if size > limits.max_file_size {
            return Err(ValidationError::FileTooLarge {
                name: name.to_string(),
                size,
                max: limits.max_file_size,
            });
        }
    }

    if count == 0 {
        return Err(ValidationError::EmptyBatch);
    }
    if count > limits.max_files {
        return Err(ValidationError::TooManyFiles(count, limits.max_files));
    }
    Ok(())
}

/// Parses a client-supplied quality. Garbage falls back to `default`, numbers
/// are clamped into `[floor, 100]`; nothing here rejects the request.
pub fn resolve_quality(raw: Option<&str>, floor: u8, default: u8) -> u8 {
    let floor = floor.clamp(MIN_QUALITY, MAX_QUALITY);
    let parsed = raw
        .map(str::trim)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|q| q.is_finite())
        .map(|q| q.round().clamp(0.0, f64::from(MAX_QUALITY)) as u8)
        .unwrap_or(default);
    parsed.clamp(floor, MAX_QUALITY)
}

/// What the byte signature and header say about an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProbe {
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

/// A per-item refusal: the category is stable, the detail is diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRejection {
    pub kind: ItemFailureKind,
    pub detail: String,
}

impl ItemRejection {
    pub fn new(kind: ItemFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

pub fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

/// Derives the real container from the bytes and reads the header.
///
/// The declared content type is advisory: it is only used to refuse uploads
/// whose label disagrees with what the bytes actually are.
pub fn probe_image(bytes: &[u8], declared_type: Option<&str>) -> Result<ImageProbe, ItemRejection> {
    let sniffed = image::guess_format(bytes).map_err(|e| {
        ItemRejection::new(
            ItemFailureKind::Unsupported,
            format!("unrecognised image signature: {}", e),
        )
    })?;

    let format = OutputFormat::from_image_format(sniffed).ok_or_else(|| {
        ItemRejection::new(
            ItemFailureKind::DisallowedFormat,
            format!("{:?} images are not accepted", sniffed),
        )
    })?;

    if let Some(declared) = declared_type.map(normalise_content_type) {
        if declared != GENERIC_CONTENT_TYPE && declared != format.mime_type() {
            return Err(ItemRejection::new(
                ItemFailureKind::Unsupported,
                format!(
                    "declared content type {} does not match detected {}",
                    declared,
                    format.mime_type()
                ),
            ));
        }
    }

    let mut reader = ImageReader::with_format(Cursor::new(bytes), sniffed);
    reader.limits(decode_limits());
    let (width, height) = reader.into_dimensions().map_err(|e| {
        ItemRejection::new(
            ItemFailureKind::Unsupported,
            format!("unreadable image header: {}", e),
        )
    })?;

    Ok(ImageProbe {
        format,
        width,
        height,
    })
}

fn normalise_content_type(raw: &str) -> String {
    let essence = raw.split(';').next().unwrap_or(raw).trim().to_lowercase();
    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => essence,
    }
}

/// Reduces a client file name to a safe stem: no directories, no extension,
/// only `[A-Za-z0-9._-]`.
pub fn sanitize_stem(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_matches('.');

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A file name is servable only if it is a single plain path component.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !name.starts_with('.')
}

/// Check if the file extension indicates it might be an image
pub fn is_potential_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| OutputFormat::from_extension(ext).is_some())
        .unwrap_or(false)
}
