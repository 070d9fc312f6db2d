pub const DEFAULT_QUALITY: u8 = 78;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

pub const DEFAULT_OUTPUT_FORMAT: &str = "webp";

pub const ZOPFLI_ITERATIONS: u8 = 15;
pub const LIBDEFLATER_HIGH_LEVEL: u8 = 12;
pub const LIBDEFLATER_LOW_LEVEL: u8 = 8;
pub const OXIPNG_PRESET: u8 = 4;

pub const AVIF_SPEED: u8 = 6;
pub const AVIF_MIN_QUALITY: u8 = 35;

pub const WEBP_QUALITY_BOOST: u8 = 5;
pub const WEBP_MAX_QUALITY: u8 = 90;

/// Longest edge an input may keep before it is downscaled.
pub const MAX_IMAGE_DIMENSION: u32 = 6000;
/// Hard ceiling handed to the decoder; anything larger is refused outright.
pub const MAX_DECODE_DIMENSION: u32 = 20_000;
pub const MAX_DECODE_ALLOC: u64 = 1024 * 1024 * 1024;

pub const MAX_BATCH_FILES: usize = 20;
pub const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

pub const JOB_TTL_SECS: u64 = 60 * 60;
pub const SWEEP_INTERVAL_SECS: u64 = 10 * 60;
pub const ORPHAN_GRACE_SECS: u64 = 4 * 60 * 60;

pub const TOKEN_BYTES: usize = 16;
pub const MAX_ID_ATTEMPTS: usize = 8;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3080";
pub const DEFAULT_WORKSPACE_ROOT: &str = "tmp";

pub const ARCHIVE_CHUNK_SIZE: usize = 64 * 1024;
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized or expired link.";
pub const NO_IMPROVEMENT_LABEL: &str = "no improvement";

pub const PROGRESS_BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

// Common output message prefixes
pub const ORIGINAL_SIZE_PREFIX: &str = "📊 Original size:";
pub const COMPRESSED_SIZE_PREFIX: &str = "📈 Compressed size:";
pub const SUCCESS_PREFIX: &str = "✅";
pub const WARNING_PREFIX: &str = "⚠️";
pub const ERROR_PREFIX: &str = "❌";
pub const INFO_PREFIX: &str = "📋";
