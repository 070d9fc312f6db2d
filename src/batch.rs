use crate::codec::{Codec, Compressed, EncodeRequest};
use crate::constants::{DEFAULT_QUALITY, MAX_IMAGE_DIMENSION, MIN_QUALITY};
use crate::error::{ItemFailureKind, Result, ValidationError, VaultError};
use crate::formats::OutputFormat;
use crate::validation::{
    probe_image, resolve_quality, sanitize_stem, validate_batch_shape, BatchLimits, ItemRejection,
};
use crate::workspace::{JobStore, JobTicket};
use bytes::Bytes;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

/// One submitted file. `content_type` is whatever the client claimed.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadItem {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub limits: BatchLimits,
    pub max_dimension: u32,
    pub quality_floor: u8,
    pub default_quality: u8,
    pub default_format: OutputFormat,
    pub workers: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            limits: BatchLimits::default(),
            max_dimension: MAX_IMAGE_DIMENSION,
            quality_floor: MIN_QUALITY,
            default_quality: DEFAULT_QUALITY,
            default_format: OutputFormat::default(),
            workers: num_cpus::get(),
        }
    }
}

/// Batch-wide encode parameters, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub format: OutputFormat,
    pub quality: u8,
    pub icc_profile: Option<Vec<u8>>,
}

impl BatchRequest {
    /// Format must be on the allow-list; quality is clamped, never rejected.
    pub fn resolve(
        format: Option<&str>,
        quality: Option<&str>,
        policy: &BatchPolicy,
    ) -> std::result::Result<Self, ValidationError> {
        Ok(Self {
            format: OutputFormat::from_request(format, policy.default_format)?,
            quality: resolve_quality(quality, policy.quality_floor, policy.default_quality),
            icc_profile: None,
        })
    }

    pub fn with_icc_profile(mut self, icc_profile: Option<Vec<u8>>) -> Self {
        self.icc_profile = icc_profile;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSuccess {
    pub original_name: String,
    pub output_name: String,
    pub original_bytes: u64,
    pub output_bytes: u64,
    pub saved_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub original_name: String,
    pub kind: ItemFailureKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success(ItemSuccess),
    Failure(ItemFailure),
}

impl ItemOutcome {
    pub fn original_name(&self) -> &str {
        match self {
            ItemOutcome::Success(s) => &s.original_name,
            ItemOutcome::Failure(f) => &f.original_name,
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub ticket: JobTicket,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchOutcome {
    pub fn successes(&self) -> impl Iterator<Item = &ItemSuccess> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Success(s) => Some(s),
            ItemOutcome::Failure(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Failure(f) => Some(f),
            ItemOutcome::Success(_) => None,
        })
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }
}

/// The bytes that will actually be stored for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedOutput {
    pub bytes: Bytes,
    pub extension: &'static str,
    pub original_bytes: u64,
    pub output_bytes: u64,
    pub saved_bytes: u64,
}

/// Never hands back something bigger than the upload: if the codec grew the
/// file, the original bytes (and container) are kept and savings are zero.
pub fn select_output(original: &Bytes, compressed: Compressed, original_format: OutputFormat) -> SelectedOutput {
    let original_bytes = original.len() as u64;
    let (bytes, extension) = if compressed.bytes.len() as u64 <= original_bytes {
        (Bytes::from(compressed.bytes), compressed.extension)
    } else {
        (original.clone(), original_format.extension())
    };
    let output_bytes = bytes.len() as u64;

    SelectedOutput {
        bytes,
        extension,
        original_bytes,
        output_bytes,
        saved_bytes: original_bytes.saturating_sub(output_bytes),
    }
}

/// Box to shrink into when the longest edge exceeds `max_dimension`.
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    (width > max_dimension || height > max_dimension).then_some((max_dimension, max_dimension))
}

/// Picks `stem.ext`, then `stem-1.ext`, `stem-2.ext`, … until unused.
pub fn unique_output_name(stem: &str, extension: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = format!("{}.{}", stem, extension);
    let mut suffix = 1;
    while taken.contains(&candidate) {
        candidate = format!("{}-{}.{}", stem, suffix, extension);
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Writes through a temporary sibling and renames into place, so a name that
/// exists in the directory always has its full contents.
pub fn persist_output(dir: &Path, file_name: &str, bytes: &[u8]) -> io::Result<()> {
    let mut partial = tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(dir)?;
    partial.write_all(bytes)?;
    partial.as_file().sync_all()?;
    partial
        .persist_noclobber(dir.join(file_name))
        .map_err(|e| e.error)?;
    Ok(())
}

pub struct BatchProcessor {
    store: Arc<JobStore>,
    codec: Arc<dyn Codec>,
    policy: BatchPolicy,
    pool: rayon::ThreadPool,
}

impl BatchProcessor {
    pub fn new(store: Arc<JobStore>, codec: Arc<dyn Codec>, policy: BatchPolicy) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(policy.workers.max(1))
            .thread_name(|i| format!("squeeze-encode-{}", i))
            .build()
            .map_err(|e| VaultError::Config(format!("failed to build encoder pool: {}", e)))?;

        Ok(Self {
            store,
            codec,
            policy,
            pool,
        })
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn process(&self, items: Vec<UploadItem>, request: &BatchRequest) -> Result<BatchOutcome> {
        self.process_with_progress(items, request, &ProgressBar::hidden())
    }

    /// Runs one upload batch into a fresh job.
    ///
    /// Request-shape problems fail the call before a job exists. After that,
    /// every item produces exactly one outcome; a bad file never aborts the rest.
    pub fn process_with_progress(
        &self,
        items: Vec<UploadItem>,
        request: &BatchRequest,
        progress: &ProgressBar,
    ) -> Result<BatchOutcome> {
        validate_batch_shape(
            items.iter().map(|i| (i.name.as_str(), i.bytes.len() as u64)),
            &self.policy.limits,
        )?;

        let ticket = self.store.create()?;
        tracing::info!(
            job_id = %ticket.id,
            files = items.len(),
            format = %request.format,
            quality = request.quality,
            "Processing batch"
        );

        // Encoding is CPU-bound and independent per item; persistence below
        // stays sequential so name allocation needs no locking.
        let encoded: Vec<std::result::Result<SelectedOutput, ItemRejection>> =
            self.pool.install(|| {
                items
                    .par_iter()
                    .map(|item| {
                        let result = self.encode_item(item, request);
                        progress.inc(1);
                        result
                    })
                    .collect()
            });

        let mut taken = HashSet::new();
        let outcomes = items
            .iter()
            .zip(encoded)
            .map(|(item, result)| match result {
                Ok(selected) => self.store_item(&ticket, item, selected, &mut taken),
                Err(rejection) => {
                    tracing::warn!(
                        job_id = %ticket.id,
                        file = %item.name,
                        category = ?rejection.kind,
                        detail = %rejection.detail,
                        "Batch item rejected"
                    );
                    ItemOutcome::Failure(ItemFailure {
                        original_name: item.name.clone(),
                        kind: rejection.kind,
                        detail: rejection.detail,
                    })
                }
            })
            .collect();

        Ok(BatchOutcome { ticket, outcomes })
    }

    fn encode_item(
        &self,
        item: &UploadItem,
        request: &BatchRequest,
    ) -> std::result::Result<SelectedOutput, ItemRejection> {
        let probe = probe_image(&item.bytes, item.content_type.as_deref())?;

        let encode_request = EncodeRequest {
            format: request.format,
            quality: request.quality,
            icc_profile: request.icc_profile.as_deref(),
            resize_to: bounded_dimensions(probe.width, probe.height, self.policy.max_dimension),
        };
        if encode_request.resize_to.is_some() {
            tracing::debug!(
                file = %item.name,
                width = probe.width,
                height = probe.height,
                "Downscaling oversized input"
            );
        }

        let compressed = self
            .codec
            .compress(&item.bytes, &encode_request)
            .map_err(|e| ItemRejection::new(e.kind(), e.to_string()))?;

        Ok(select_output(&item.bytes, compressed, probe.format))
    }

    fn store_item(
        &self,
        ticket: &JobTicket,
        item: &UploadItem,
        selected: SelectedOutput,
        taken: &mut HashSet<String>,
    ) -> ItemOutcome {
        let output_name = unique_output_name(&sanitize_stem(&item.name), selected.extension, taken);

        let stored = persist_output(&ticket.dir, &output_name, &selected.bytes)
            .map_err(VaultError::from)
            .and_then(|()| {
                self.store
                    .register_file(&ticket.id, &output_name)
                    .map_err(VaultError::from)
            });

        match stored {
            Ok(()) => ItemOutcome::Success(ItemSuccess {
                original_name: item.name.clone(),
                output_name,
                original_bytes: selected.original_bytes,
                output_bytes: selected.output_bytes,
                saved_bytes: selected.saved_bytes,
            }),
            Err(e) => {
                tracing::error!(
                    job_id = %ticket.id,
                    file = %item.name,
                    error = %e,
                    "Failed to store compressed output"
                );
                ItemOutcome::Failure(ItemFailure {
                    original_name: item.name.clone(),
                    kind: ItemFailureKind::Internal,
                    detail: "internal storage error".to_string(),
                })
            }
        }
    }
}
