use std::path::{Path, PathBuf};
use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::page::Page;
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChromedlConfig;

use super::download::DownloadWatcher;
use super::error::{BrowserError, BrowserResult};
use super::options::{HostEnvironment, LaunchPlan};
use super::profile::{BrowserProfile, ProfileManager};
use super::retry::PatientRetry;
use super::verify;

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
    pub verify: Option<bool>,
}

/// Builds Chromium sessions that drop downloads into the configured directory.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<ChromedlConfig>,
    host: HostEnvironment,
    profiles: ProfileManager,
}

impl BrowserLauncher {
    pub fn new(config: ChromedlConfig) -> BrowserResult<Self> {
        Self::with_host(config, HostEnvironment::detect())
    }

    pub fn with_host(config: ChromedlConfig, host: HostEnvironment) -> BrowserResult<Self> {
        config
            .validate()
            .map_err(|err| BrowserError::Configuration(err.to_string()))?;
        let profiles = ProfileManager::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            host,
            profiles,
        })
    }

    pub fn config(&self) -> &ChromedlConfig {
        &self.config
    }

    pub fn host(&self) -> HostEnvironment {
        self.host
    }

    pub fn plan(&self, overrides: &LaunchOverrides) -> LaunchPlan {
        let headless = overrides.headless.unwrap_or(self.config.browser.headless);
        LaunchPlan::build(&self.config, &self.host, headless)
    }

    pub fn download_watcher(&self) -> BrowserResult<DownloadWatcher> {
        DownloadWatcher::new(self.config.download.clone())
    }

    pub fn retry_policy(&self) -> PatientRetry {
        PatientRetry::new(self.config.retry.clone())
    }

    pub async fn launch(&self) -> BrowserResult<BrowserSession> {
        self.launch_with_overrides(LaunchOverrides::default()).await
    }

    pub async fn launch_with_overrides(
        &self,
        overrides: LaunchOverrides,
    ) -> BrowserResult<BrowserSession> {
        if overrides.verify.unwrap_or(self.config.browser.verify) {
            verify::verify_browser(self).await?;
        }

        let plan = self.plan(&overrides);
        std::fs::create_dir_all(&plan.download_dir)?;
        self.profiles.cleanup_expired().await?;
        let profile = self.profiles.allocate()?;
        let chromium_config = match prepare_profile(&plan, &profile).await {
            Ok(config) => config,
            Err(err) => {
                discard_profile(&profile).await;
                return Err(err);
            }
        };

        info!(
            profile = %profile.id(),
            headless = plan.headless,
            bundled = plan.bundled,
            download_dir = %plan.download_dir.display(),
            "Launching Chromium instance"
        );

        let (browser, mut handler) = match Browser::launch(chromium_config).await {
            Ok(pair) => pair,
            Err(err) => {
                discard_profile(&profile).await;
                return Err(BrowserError::Launch(err.to_string()));
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        let session = BrowserSession {
            browser,
            profile,
            handler_task: Some(handler_task),
            download_dir: plan.download_dir,
        };
        if let Err(err) = session.allow_downloads().await {
            if let Err(shutdown) = session.shutdown().await {
                warn!(error = %shutdown, "Failed to shut down after CDP setup error");
            }
            return Err(err);
        }
        Ok(session)
    }

    /// Runs `f` against a fresh session and shuts the session down on every
    /// exit path. An error from `f` takes precedence over a shutdown error.
    pub async fn with_session<T, F>(&self, f: F) -> BrowserResult<T>
    where
        F: for<'a> FnOnce(&'a BrowserSession) -> BoxFuture<'a, BrowserResult<T>>,
    {
        let session = self.launch().await?;
        let outcome = f(&session).await;
        let shutdown = session.shutdown().await;
        let value = outcome?;
        shutdown?;
        Ok(value)
    }
}

async fn prepare_profile(
    plan: &LaunchPlan,
    profile: &BrowserProfile,
) -> BrowserResult<BrowserConfig> {
    profile.write_preferences(&plan.preferences()).await?;
    plan.to_chromium_config(profile.path())
}

async fn discard_profile(profile: &BrowserProfile) {
    if let Err(err) = profile.remove().await {
        warn!(profile = %profile.id(), error = %err, "Failed to remove unused profile");
    }
}

#[derive(Debug)]
pub struct BrowserSession {
    browser: Browser,
    profile: BrowserProfile,
    handler_task: Option<JoinHandle<()>>,
    download_dir: PathBuf,
}

impl BrowserSession {
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Managed and headless sessions ignore the download preference, so the
    /// behavior is also forced over CDP.
    async fn allow_downloads(&self) -> BrowserResult<()> {
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(self.download_dir.to_string_lossy().into_owned())
            .build()
            .map_err(BrowserError::Configuration)?;
        self.browser.execute(params).await?;
        debug!(download_dir = %self.download_dir.display(), "Automatic downloads allowed");
        Ok(())
    }

    pub async fn new_page(&self, url: &str) -> BrowserResult<Page> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|err| BrowserError::Navigation(format!("{url}: {err}")))?;
        page.wait_for_navigation()
            .await
            .map_err(|err| BrowserError::Navigation(format!("{url}: {err}")))?;
        Ok(page)
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!(profile = %self.profile.id(), "Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        self.profile.remove().await
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile.id(),
                    "BrowserSession dropped without explicit shutdown"
                );
            }
        }
    }
}
