mod download;
mod error;
pub mod interact;
mod launcher;
mod options;
mod profile;
mod retry;
mod sleeper;
mod verify;

pub use download::DownloadWatcher;
pub use error::{BrowserError, BrowserResult};
pub use launcher::{BrowserLauncher, BrowserSession, LaunchOverrides};
pub use options::{HostEnvironment, HostOs, LaunchPlan, BUNDLED_BROWSER_PATH};
pub use profile::{BrowserProfile, ProfileManager};
pub use retry::{Classify, FailureKind, PatientRetry, RetryOutcome};
pub use sleeper::{Sleeper, TokioSleeper};
pub use verify::{install_message, verify_browser};
