//! Zip packaging of a job's outputs.
//!
//! Archives are written with [`ZipWriter::new_stream`], so nothing needs to be
//! seekable and nothing is buffered in full: the HTTP side reads entries as
//! they are produced.

use crate::constants::ARCHIVE_CHUNK_SIZE;
use crate::error::Result;
use crate::validation::is_safe_file_name;
use crate::workspace::AuthorizedJob;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tokio::io::DuplexStream;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub bytes: u64,
    pub skipped: Vec<String>,
}

/// Writes one flat entry per listed file. Files that vanished since the list
/// was taken are skipped, not fatal.
pub fn write_archive<W: Write>(dir: &Path, files: &[String], sink: &mut W) -> Result<ArchiveSummary> {
    // Outputs are already compressed images; deflating them again is wasted work.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o644);

    let mut summary = ArchiveSummary::default();
    let mut zip = ZipWriter::new_stream(&mut *sink);

    for name in files {
        if !is_safe_file_name(name) {
            tracing::warn!(file = %name, "Refusing to archive unsafe file name");
            summary.skipped.push(name.clone());
            continue;
        }

        let mut file = match File::open(dir.join(name)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(file = %name, "Output disappeared before archiving");
                summary.skipped.push(name.clone());
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        zip.start_file(name.as_str(), options)?;
        summary.bytes += io::copy(&mut file, &mut zip)?;
        summary.entries += 1;
    }

    zip.finish()?;
    sink.flush()?;
    Ok(summary)
}

/// Streams the archive for an authorized job as an HTTP-ready byte stream.
///
/// The zip is produced on a blocking thread that owns the job's read lease, so
/// the directory outlives the transfer. Must be called inside a Tokio runtime.
pub fn stream_archive(job: AuthorizedJob) -> ReaderStream<DuplexStream> {
    let (reader, writer) = tokio::io::duplex(ARCHIVE_CHUNK_SIZE);
    let bridge = SyncIoBridge::new(writer);

    tokio::task::spawn_blocking(move || {
        let mut sink = BufWriter::with_capacity(ARCHIVE_CHUNK_SIZE, bridge);
        match write_archive(&job.dir, &job.files, &mut sink) {
            Ok(summary) => tracing::debug!(
                job_id = %job.id,
                entries = summary.entries,
                bytes = summary.bytes,
                skipped = summary.skipped.len(),
                "Archive streamed"
            ),
            // Usually the client hung up mid-transfer.
            Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Archive stream aborted"),
        }
        drop(sink);
        drop(job);
    });

    ReaderStream::with_capacity(reader, ARCHIVE_CHUNK_SIZE)
}
