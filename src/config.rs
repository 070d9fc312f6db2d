//! Service configuration.
//!
//! Every knob is a `serve` flag with a `SQUEEZE_*` environment fallback; the
//! binary loads a `.env` file before parsing.

use crate::batch::BatchPolicy;
use crate::constants::{
    DEFAULT_BIND_ADDR, DEFAULT_QUALITY, DEFAULT_WORKSPACE_ROOT, JOB_TTL_SECS, MAX_BATCH_FILES,
    MAX_FILE_SIZE, MAX_IMAGE_DIMENSION, MAX_QUALITY, MIN_QUALITY, ORPHAN_GRACE_SECS,
    SWEEP_INTERVAL_SECS,
};
use crate::error::{Result, VaultError};
use crate::formats::OutputFormat;
use crate::validation::BatchLimits;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Room for form fields and multipart framing on top of the file payloads.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

#[derive(Debug, Clone, Args)]
pub struct ServiceConfig {
    #[arg(long, env = "SQUEEZE_BIND", default_value = DEFAULT_BIND_ADDR, help = "Address to listen on")]
    pub bind: SocketAddr,

    #[arg(
        long,
        env = "SQUEEZE_WORKSPACE_ROOT",
        default_value = DEFAULT_WORKSPACE_ROOT,
        help = "Directory holding per-job workspaces"
    )]
    pub workspace_root: PathBuf,

    #[arg(long, env = "SQUEEZE_JOB_TTL_SECS", default_value_t = JOB_TTL_SECS, help = "Lifetime of a job and its download links")]
    pub job_ttl_secs: u64,

    #[arg(long, env = "SQUEEZE_SWEEP_INTERVAL_SECS", default_value_t = SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,

    #[arg(
        long,
        env = "SQUEEZE_ORPHAN_GRACE_SECS",
        default_value_t = ORPHAN_GRACE_SECS,
        help = "Age after which unknown workspace directories are removed"
    )]
    pub orphan_grace_secs: u64,

    #[arg(long, env = "SQUEEZE_MAX_FILES", default_value_t = MAX_BATCH_FILES)]
    pub max_files: usize,

    #[arg(long, env = "SQUEEZE_MAX_FILE_SIZE", default_value_t = MAX_FILE_SIZE, help = "Per-file upload limit in bytes")]
    pub max_file_size: u64,

    #[arg(
        long,
        env = "SQUEEZE_MAX_DIMENSION",
        default_value_t = MAX_IMAGE_DIMENSION,
        help = "Longest edge kept before downscaling"
    )]
    pub max_dimension: u32,

    #[arg(long, env = "SQUEEZE_QUALITY_FLOOR", default_value_t = MIN_QUALITY)]
    pub quality_floor: u8,

    #[arg(long, env = "SQUEEZE_DEFAULT_QUALITY", default_value_t = DEFAULT_QUALITY)]
    pub default_quality: u8,

    #[arg(long, env = "SQUEEZE_DEFAULT_FORMAT", default_value = "webp", help = "Format used when a request names none")]
    pub default_format: OutputFormat,

    #[arg(long, env = "SQUEEZE_WORKERS", help = "Encoder threads (default: number of CPUs)")]
    pub workers: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3080)),
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE_ROOT),
            job_ttl_secs: JOB_TTL_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
            orphan_grace_secs: ORPHAN_GRACE_SECS,
            max_files: MAX_BATCH_FILES,
            max_file_size: MAX_FILE_SIZE,
            max_dimension: MAX_IMAGE_DIMENSION,
            quality_floor: MIN_QUALITY,
            default_quality: DEFAULT_QUALITY,
            default_format: OutputFormat::default(),
            workers: None,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 7] = [
            (self.job_ttl_secs > 0, "job TTL must be positive"),
            (self.sweep_interval_secs > 0, "sweep interval must be positive"),
            (self.max_files > 0, "max files must be positive"),
            (self.max_file_size > 0, "max file size must be positive"),
            (self.max_dimension > 0, "max dimension must be positive"),
            (
                (MIN_QUALITY..=MAX_QUALITY).contains(&self.quality_floor),
                "quality floor must be within 1-100",
            ),
            (
                (MIN_QUALITY..=MAX_QUALITY).contains(&self.default_quality),
                "default quality must be within 1-100",
            ),
        ];

        if let Some((_, message)) = checks.iter().find(|(ok, _)| !ok) {
            return Err(VaultError::Config(message.to_string()));
        }
        if self.workers == Some(0) {
            return Err(VaultError::Config("workers must be positive".to_string()));
        }
        Ok(())
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn orphan_grace(&self) -> Duration {
        Duration::from_secs(self.orphan_grace_secs)
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            limits: BatchLimits {
                max_files: self.max_files,
                max_file_size: self.max_file_size,
            },
            max_dimension: self.max_dimension,
            quality_floor: self.quality_floor,
            default_quality: self.default_quality,
            default_format: self.default_format,
            workers: self.workers.unwrap_or_else(num_cpus::get),
        }
    }

    /// Upper bound for a whole compress request: every image plus one colour
    /// profile reference and the form fields.
    pub fn request_body_limit(&self) -> usize {
        let files = (self.max_files as u64).saturating_add(1);
        let bytes = files
            .saturating_mul(self.max_file_size)
            .saturating_add(MULTIPART_OVERHEAD);
        usize::try_from(bytes).unwrap_or(usize::MAX)
    }
}
