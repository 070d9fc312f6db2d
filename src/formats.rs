/// Image format utilities and type-safe format handling
///
/// The same allow-list serves two purposes: the formats a client may ask for
/// as output, and the containers accepted as input after byte sniffing.
use crate::constants::DEFAULT_OUTPUT_FORMAT;
use crate::error::ValidationError;
use image::ImageFormat;
use std::fmt;
use std::str::FromStr;

/// Supported image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// JPEG format with lossy compression
    Jpeg,
    /// PNG format with lossless compression
    Png,
    /// WebP format
    WebP,
    /// AVIF format
    Avif,
}

impl OutputFormat {
    /// Returns the canonical file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Avif => "avif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Avif => "image/avif",
        }
    }

    /// Maps a sniffed container back onto the allow-list.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::WebP => Some(OutputFormat::WebP),
            ImageFormat::Avif => Some(OutputFormat::Avif),
            _ => None,
        }
    }

    /// Looks up a format by the extension of an output file name.
    pub fn from_extension(extension: &str) -> Option<Self> {
        OutputFormat::from_str(extension).ok()
    }

    /// Resolves the format a client asked for. A missing or blank value falls
    /// back to `default`; anything off the allow-list rejects the batch.
    pub fn from_request(requested: Option<&str>, default: OutputFormat) -> Result<Self, ValidationError> {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => name.parse(),
            None => Ok(default),
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        DEFAULT_OUTPUT_FORMAT.parse().unwrap_or(OutputFormat::WebP)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::WebP => "WebP",
            OutputFormat::Avif => "AVIF",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            "avif" => Ok(OutputFormat::Avif),
            _ => Err(ValidationError::UnsupportedFormat(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("jpeg").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_str("jpg").unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_str("PNG").unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::from_str("webp").unwrap(), OutputFormat::WebP);
        assert_eq!(OutputFormat::from_str("AVIF").unwrap(), OutputFormat::Avif);

        assert!(OutputFormat::from_str("gif").is_err());
        assert!(OutputFormat::from_str("unsupported").is_err());
    }

    #[test]
    fn test_jpeg_normalises_to_jpg() {
        assert_eq!(OutputFormat::from_str("JPEG").unwrap().extension(), "jpg");
    }

    #[test]
    fn test_from_request_defaults_and_rejects() {
        let default = OutputFormat::default();
        assert_eq!(default, OutputFormat::WebP);
        assert_eq!(OutputFormat::from_request(None, default).unwrap(), OutputFormat::WebP);
        assert_eq!(
            OutputFormat::from_request(Some("  "), OutputFormat::Jpeg).unwrap(),
            OutputFormat::Jpeg
        );
        assert_eq!(
            OutputFormat::from_request(Some("png"), default).unwrap(),
            OutputFormat::Png
        );
        assert!(matches!(
            OutputFormat::from_request(Some("tiff"), default),
            Err(ValidationError::UnsupportedFormat(f)) if f == "tiff"
        ));
    }

    #[test]
    fn test_from_image_format_allow_list() {
        assert_eq!(
            OutputFormat::from_image_format(ImageFormat::Png),
            Some(OutputFormat::Png)
        );
        assert_eq!(OutputFormat::from_image_format(ImageFormat::Gif), None);
        assert_eq!(OutputFormat::from_image_format(ImageFormat::Bmp), None);
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(format!("{}", OutputFormat::Jpeg), "JPEG");
        assert_eq!(format!("{}", OutputFormat::Png), "PNG");
        assert_eq!(format!("{}", OutputFormat::WebP), "WebP");
        assert_eq!(format!("{}", OutputFormat::Avif), "AVIF");
    }
}
