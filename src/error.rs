use crate::constants::UNAUTHORIZED_MESSAGE;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Request-shape problems. These reject the whole batch before any file I/O.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No image files were received")]
    EmptyBatch,

    #[error("Batch file count limit exceeded: {0} files, maximum allowed {1}")]
    TooManyFiles(usize, usize),

    #[error("File too large: {name} is {size} bytes. Maximum allowed: {max} bytes")]
    FileTooLarge { name: String, size: u64, max: u64 },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl ValidationError {
    /// Count and size limits map to "payload too large" rather than "bad request".
    pub fn is_payload_limit(&self) -> bool {
        matches!(
            self,
            ValidationError::TooManyFiles(..) | ValidationError::FileTooLarge { .. }
        )
    }
}

/// Stable category attached to a failed batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailureKind {
    /// Not an image, corrupt, or the declared type lies about the content.
    Unsupported,
    /// A real image, but of a kind the service does not accept.
    DisallowedFormat,
    /// The codec could not produce output for a decodable image.
    Encode,
    /// Filesystem or bookkeeping failure while persisting the output.
    Internal,
}

impl ItemFailureKind {
    pub fn friendly_message(&self) -> &'static str {
        match self {
            ItemFailureKind::Unsupported if cfg!(feature = "avif-decode") => {
                "This file could not be processed. Only valid images (JPG, PNG, WebP, AVIF) are accepted, or the file may be damaged."
            }
            ItemFailureKind::Unsupported => {
                "This file could not be processed. Only valid images (JPG, PNG, WebP) are accepted, or the file may be damaged."
            }
            ItemFailureKind::DisallowedFormat if cfg!(feature = "avif-decode") => {
                "This image type is not accepted. Upload JPG, PNG, WebP or AVIF files."
            }
            ItemFailureKind::DisallowedFormat => {
                "This image type is not accepted. Upload JPG, PNG or WebP files."
            }
            ItemFailureKind::Encode => "The image could not be compressed in the requested format.",
            ItemFailureKind::Internal => "An internal error occurred while saving this file.",
        }
    }
}

/// Why a job lookup was refused. Callers outside the crate must render both
/// variants identically through [`AuthError::public_message`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("job not found or expired")]
    NotFound,

    #[error("token does not match")]
    InvalidToken,
}

impl AuthError {
    pub fn public_message(&self) -> &'static str {
        UNAUTHORIZED_MESSAGE
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to decode image: {0}")]
    Decode(image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("WebP encoding error: {0}")]
    WebPEncoding(String),
}

impl CodecError {
    pub fn kind(&self) -> ItemFailureKind {
        match self {
            CodecError::Decode(_) => ItemFailureKind::Unsupported,
            CodecError::Encode(_)
            | CodecError::PngOptimization(_)
            | CodecError::WebPEncoding(_) => ItemFailureKind::Encode,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Could not allocate a unique job id after {0} attempts")]
    IdExhausted(usize),

    #[error("Failed to create workspace directory: {0}")]
    DirectoryCreationFailed(PathBuf),
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("No image files found in input path: {0}")]
    NoImageFilesFound(String),

    #[error("Walkdir error: {0}")]
    WalkdirError(#[from] walkdir::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;
