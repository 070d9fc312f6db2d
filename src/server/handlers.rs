use super::error::ApiError;
use super::response::CompressResponse;
use super::AppState;
use crate::archive::stream_archive;
use crate::batch::{BatchRequest, UploadItem};
use crate::codec::extract_icc_profile;
use crate::error::{ValidationError, VaultError};
use crate::formats::OutputFormat;
use crate::utils::archive_file_name;
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    /// The job token. Absent means an empty token, which never matches.
    #[serde(default)]
    pub t: String,
}

/// `POST /api/compress`
pub async fn compress(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CompressResponse>, ApiError> {
    let max_file_size = state.processor.policy().limits.max_file_size;
    let mut items = Vec::new();
    let mut profile_ref: Option<Bytes> = None;
    let mut format: Option<String> = None;
    let mut quality: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "images" => {
                let name = field.file_name().unwrap_or("image").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                items.push(UploadItem {
                    name,
                    content_type,
                    bytes,
                });
            }
            "profileRef" => {
                let bytes = field.bytes().await?;
                if bytes.len() as u64 > max_file_size {
                    return Err(ValidationError::FileTooLarge {
                        name: "profileRef".to_string(),
                        size: bytes.len() as u64,
                        max: max_file_size,
                    }
                    .into());
                }
                profile_ref = Some(bytes);
            }
            "format" => format = Some(field.text().await?),
            "quality" => quality = Some(field.text().await?),
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    let request = BatchRequest::resolve(
        format.as_deref(),
        quality.as_deref(),
        state.processor.policy(),
    )?;

    let processor = Arc::clone(&state.processor);
    let outcome = tokio::task::spawn_blocking(move || {
        let icc_profile = profile_ref.as_deref().and_then(extract_icc_profile);
        processor.process(items, &request.with_icc_profile(icc_profile))
    })
    .await??;

    tracing::info!(
        job_id = %outcome.ticket.id,
        succeeded = outcome.success_count(),
        failed = outcome.failures().count(),
        "Batch complete"
    );

    Ok(Json(CompressResponse::from_outcome(
        &outcome,
        state.store.now(),
    )))
}

/// `GET /download/{job_id}/{file}?t=<token>`
pub async fn download(
    State(state): State<AppState>,
    Path((job_id, file_name)): Path<(String, String)>,
    Query(query): Query<AccessQuery>,
) -> Result<Response, ApiError> {
    let job = state.store.authorize(&job_id, &query.t)?;
    let path = job.file_path(&file_name).ok_or(ApiError::NotFound)?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(job_id = %job_id, file = %file_name, "Registered output missing on disk");
            return Err(ApiError::NotFound);
        }
        Err(e) => return Err(VaultError::from(e).into()),
    };
    let length = file.metadata().await.map(|m| m.len()).ok();

    let content_type = std::path::Path::new(&file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(OutputFormat::from_extension)
        .map_or(OCTET_STREAM, |format| format.mime_type());

    // The lease rides along with the body and is released when it is dropped,
    // whether the transfer finished or the client went away.
    let lease = job.into_lease();
    let body_stream = ReaderStream::new(file).map(move |chunk| {
        let _lease = &lease;
        chunk
    });

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        )
        .header(header::CACHE_CONTROL, "private, no-store");
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder.body(Body::from_stream(body_stream)).map_err(|e| {
        VaultError::from(io::Error::other(format!("failed to build response: {}", e))).into()
    })
}

/// `GET /zip/{job_id}?t=<token>`
pub async fn archive(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<AccessQuery>,
) -> Result<Response, ApiError> {
    let job = state.store.authorize(&job_id, &query.t)?;
    tracing::debug!(job_id = %job_id, files = job.files.len(), "Streaming archive");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", archive_file_name(&job_id)),
        )
        .header(header::CACHE_CONTROL, "private, no-store")
        .body(Body::from_stream(stream_archive(job)))
        .map_err(|e| {
            VaultError::from(io::Error::other(format!("failed to build response: {}", e))).into()
        })
}
