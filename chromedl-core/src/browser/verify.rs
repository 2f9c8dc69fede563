use futures::future::BoxFuture;
use tracing::{info, warn};

use super::error::{BrowserError, BrowserResult};
use super::launcher::{BrowserLauncher, LaunchOverrides};
use super::options::HostOs;

/// One-shot check that Chromium can be started: launch headless without
/// verification, then tear the session down.
pub fn verify_browser(launcher: &BrowserLauncher) -> BoxFuture<'_, BrowserResult<()>> {
    Box::pin(async move {
        let overrides = LaunchOverrides {
            headless: Some(true),
            verify: Some(false),
        };

        let plan = launcher.plan(&overrides);
        if plan.bundled {
            if let Some(executable) = plan.executable.as_ref().filter(|path| !path.exists()) {
                return Err(BrowserError::DriverUnavailable(format!(
                    "Bundled Chromium not found at {}. Unpack a Chromium snapshot there, \
                     or set browser.executable_path.",
                    executable.display()
                )));
            }
        }

        match launcher.launch_with_overrides(overrides).await {
            Ok(session) => {
                session.shutdown().await?;
                info!("Chromium is installed and launchable");
                Ok(())
            }
            Err(BrowserError::Launch(reason)) => {
                warn!(error = %reason, "Chromium failed to launch");
                Err(BrowserError::DriverUnavailable(install_message(
                    launcher.host().os,
                    &reason,
                )))
            }
            Err(other) => Err(other),
        }
    })
}

pub fn install_message(os: HostOs, reason: &str) -> String {
    let mut message = match os {
        HostOs::MacOs => String::from(
            "Please install Chromium. Try:\n\n\t$ brew install --cask chromium\n\n\t\tOR\n\n\t\
             $ brew upgrade --cask chromium\n\nThen run:\n\n\t\
             $ xattr -d com.apple.quarantine /Applications/Chromium.app",
        ),
        other => format!("Please install Chromium for: {}", other.name()),
    };
    message.push_str(&format!("\n\nLaunch error: {reason}"));
    message
}
