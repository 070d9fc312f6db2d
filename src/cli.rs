use crate::config::ServiceConfig;
use crate::constants::{DEFAULT_WORKSPACE_ROOT, ORPHAN_GRACE_SECS};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "img-squeeze-vault",
    about = "Image compression service with short-lived, token-gated downloads",
    long_about = "img-squeeze-vault compresses uploaded images into JPEG, PNG, WebP or AVIF and keeps the \
                  results in a private per-job workspace. Every download link carries a secret token and \
                  expires with its job; a background sweep removes expired and orphaned workspaces.",
    version,
    after_help = "EXAMPLES:\n  \
    img-squeeze-vault serve --bind 127.0.0.1:3080\n  \
    img-squeeze-vault batch \"./images/*.png\" -f webp -q 80\n  \
    img-squeeze-vault sweep --workspace-root ./tmp --orphan-grace-secs 0"
)]
pub struct Args {
    #[arg(short, long, global = true, help = "Show debug output")]
    pub verbose: bool,

    #[arg(short = 'Q', long, global = true, help = "Only show warnings and errors")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP service")]
    Serve(ServiceConfig),

    #[command(
        about = "Compress local images into a fresh job workspace",
        long_about = "Runs the same pipeline as the upload endpoint on local files. \
                      Input can be a file, a directory or a glob pattern."
    )]
    Batch {
        #[arg(
            help = "Input directory, file pattern, or glob",
            long_help = "Input can be a directory path, file pattern, or glob expression. \
                         Examples: './images', '*.jpg', '/path/to/images/*.png'"
        )]
        input: String,

        #[arg(short = 'f', long, help = "Output format (jpg, png, webp, avif; default: webp)")]
        format: Option<String>,

        #[arg(
            short = 'q',
            long,
            help = "Compression quality (1-100, default: 78)",
            long_help = "Compression quality from 1 (lowest) to 100 (highest). Out-of-range values are clamped. \
                         For PNG: >=90 uses Zopfli, >=70 uses high compression, <70 uses standard compression."
        )]
        quality: Option<String>,

        #[arg(short = 'r', long, help = "Process subdirectories recursively")]
        recursive: bool,

        #[arg(long, default_value = DEFAULT_WORKSPACE_ROOT, help = "Directory to create the job workspace in")]
        workspace_root: PathBuf,
    },

    #[command(
        about = "Remove orphaned workspaces left by a previous run",
        long_about = "Deletes every directory under the workspace root that is older than the grace period. \
                      Use this after a restart; a running service sweeps on its own."
    )]
    Sweep {
        #[arg(long, default_value = DEFAULT_WORKSPACE_ROOT)]
        workspace_root: PathBuf,

        #[arg(long, default_value_t = ORPHAN_GRACE_SECS, help = "Minimum age in seconds")]
        orphan_grace_secs: u64,
    },
}
