use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/78.0.3904.70 Safari/537.36";

/// Top-level configuration. Work and download directories are always
/// supplied by the caller; every other knob has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChromedlConfig {
    pub browser: BrowserSection,
    #[serde(default)]
    pub download: DownloadSection,
    #[serde(default)]
    pub retry: RetrySection,
}

impl ChromedlConfig {
    pub fn new<W, D>(work_dir: W, download_dir: D) -> Self
    where
        W: Into<PathBuf>,
        D: Into<PathBuf>,
    {
        Self {
            browser: BrowserSection::new(work_dir.into(), download_dir.into()),
            download: DownloadSection::default(),
            retry: RetrySection::default(),
        }
    }

    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.browser.work_dir.join(path)
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.download.validate()?;
        let [width, height] = self.browser.window_size;
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid {
                field: "browser.window_size",
                message: format!("{width}x{height} is not a usable window"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    pub work_dir: PathBuf,
    pub download_dir: PathBuf,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_true")]
    pub verify: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_window_size")]
    pub window_size: [u32; 2],
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default = "default_true")]
    pub disable_extensions: bool,
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

impl BrowserSection {
    fn new(work_dir: PathBuf, download_dir: PathBuf) -> Self {
        Self {
            work_dir,
            download_dir,
            headless: false,
            verify: true,
            user_agent: default_user_agent(),
            window_size: default_window_size(),
            sandbox: false,
            disable_extensions: true,
            executable_path: None,
            request_timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub in_progress_suffix: String,
    pub start_poll_interval_seconds: u64,
    pub start_poll_limit: u32,
    pub progress_poll_interval_seconds: u64,
    pub stall_window: usize,
}

impl DownloadSection {
    pub fn start_poll_interval(&self) -> Duration {
        Duration::from_secs(self.start_poll_interval_seconds)
    }

    pub fn progress_poll_interval(&self) -> Duration {
        Duration::from_secs(self.progress_poll_interval_seconds)
    }

    /// An empty suffix would classify every entry as in progress.
    pub fn validate(&self) -> Result<()> {
        if self.in_progress_suffix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "download.in_progress_suffix",
                message: "suffix must not be empty".to_string(),
            });
        }
        if self.stall_window == 0 {
            return Err(ConfigError::Invalid {
                field: "download.stall_window",
                message: "window must hold at least one sample".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            in_progress_suffix: ".crdownload".to_string(),
            start_poll_interval_seconds: 2,
            start_poll_limit: 10,
            progress_poll_interval_seconds: 10,
            stall_window: 5,
        }
    }
}

/// `max_attempts` counts every invocation, the first one included.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub retry_interval_seconds: u64,
    pub max_attempts: usize,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            retry_interval_seconds: 2,
            max_attempts: 5,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_window_size() -> [u32; 2] {
    [1920, 1080]
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ChromedlConfig> {
    let config: ChromedlConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
