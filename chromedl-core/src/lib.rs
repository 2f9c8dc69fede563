pub mod browser;
pub mod config;
pub mod error;

pub use browser::{
    BrowserError, BrowserLauncher, BrowserResult, BrowserSession, Classify, DownloadWatcher,
    FailureKind, HostEnvironment, HostOs, LaunchOverrides, PatientRetry, RetryOutcome, Sleeper,
    TokioSleeper,
};
pub use config::{
    load_config, BrowserSection, ChromedlConfig, DownloadSection, RetrySection,
    DEFAULT_USER_AGENT,
};
pub use error::{ConfigError, Result};
