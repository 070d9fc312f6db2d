pub mod archive;
pub mod batch;
pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod formats;
pub mod logger;
pub mod reaper;
pub mod server;
pub mod utils;
pub mod validation;
pub mod workspace;

pub use archive::{stream_archive, write_archive, ArchiveSummary};
pub use batch::{
    BatchOutcome, BatchPolicy, BatchProcessor, BatchRequest, ItemFailure, ItemOutcome,
    ItemSuccess, UploadItem,
};
pub use codec::{Codec, Compressed, EncodeRequest, ImageCodec};
pub use config::ServiceConfig;
pub use error::{AuthError, ItemFailureKind, Result, ValidationError, VaultError};
pub use formats::OutputFormat;
pub use reaper::{Reaper, SweepReport};
pub use workspace::{AuthorizedJob, Clock, JobStore, JobTicket, ManualClock, SystemClock};
