use crate::batch::BatchOutcome;
use crate::error::ItemFailureKind;
use crate::utils::{archive_url, describe_savings, download_url};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressResponse {
    pub job_id: String,
    pub token: String,
    pub count: usize,
    pub results: Vec<ResultEntry>,
    pub errors: Vec<ErrorEntry>,
    pub expires_in_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub original_name: String,
    pub output_name: String,
    pub original_bytes: u64,
    pub output_bytes: u64,
    pub saved_bytes: u64,
    pub saved_human: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub file: String,
    pub category: ItemFailureKind,
    pub friendly: String,
    pub technical: String,
}

impl CompressResponse {
    pub fn from_outcome(outcome: &BatchOutcome, now: DateTime<Utc>) -> Self {
        let ticket = &outcome.ticket;

        let results: Vec<ResultEntry> = outcome
            .successes()
            .map(|s| ResultEntry {
                original_name: s.original_name.clone(),
                output_name: s.output_name.clone(),
                original_bytes: s.original_bytes,
                output_bytes: s.output_bytes,
                saved_bytes: s.saved_bytes,
                saved_human: describe_savings(s.saved_bytes),
                url: download_url(&ticket.id, &s.output_name, &ticket.token),
            })
            .collect();

        let errors = outcome
            .failures()
            .map(|f| ErrorEntry {
                file: f.original_name.clone(),
                category: f.kind,
                friendly: f.kind.friendly_message().to_string(),
                technical: f.detail.clone(),
            })
            .collect();

        Self {
            job_id: ticket.id.clone(),
            token: ticket.token.clone(),
            count: results.len(),
            zip_url: (!results.is_empty()).then(|| archive_url(&ticket.id, &ticket.token)),
            results,
            errors,
            expires_in_ms: (ticket.expires_at - now).num_milliseconds().max(0),
        }
    }
}
