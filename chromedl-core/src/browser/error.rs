use std::path::PathBuf;

use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("profile error: {0}")]
    Profile(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("element not interactable: {0}")]
    NotInteractable(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("download directory {dir} must be empty, but found: {entries:?}")]
    DownloadDirNotExclusive { dir: PathBuf, entries: Vec<PathBuf> },
    #[error("download never started in {dir} after {polls} polls")]
    DownloadNeverStarted { dir: PathBuf, polls: u32 },
    #[error(
        "unexpected download state: {} downloading, {} downloaded, expected exactly one \
         (downloading: {downloading:?}, downloaded: {downloaded:?})",
        .downloading.len(),
        .downloaded.len()
    )]
    DownloadAnomaly {
        downloading: Vec<PathBuf>,
        downloaded: Vec<PathBuf>,
    },
    #[error("download appears frozen at size {size} bytes: {path}")]
    DownloadStalled { path: PathBuf, size: u64 },
    #[error("download vanished: neither {partial} nor {target} exists")]
    DownloadVanished { partial: PathBuf, target: PathBuf },
    #[error("{0}")]
    DriverUnavailable(String),
}
