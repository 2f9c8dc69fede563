use std::path::PathBuf;

use clap::Args;

/// Blocks until the single download in a directory is finished.
#[derive(Args, Debug, Clone)]
pub struct AwaitDownloadArgs {
    /// Directory to watch (defaults to browser.download_dir)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Overrides the in-progress suffix (e.g. .part)
    #[arg(long)]
    pub suffix: Option<String>,
}
