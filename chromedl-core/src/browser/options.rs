use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::browser::BrowserConfig as ChromiumConfig;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use serde_json::{json, Value};

use crate::config::ChromedlConfig;

use super::error::{BrowserError, BrowserResult};

/// Location of the self-managed Chromium build, relative to the work dir.
pub const BUNDLED_BROWSER_PATH: &str = "chrome-linux/chrome";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Linux,
    MacOs,
    Windows,
    Other(&'static str),
}

impl HostOs {
    pub fn current() -> Self {
        Self::from_name(std::env::consts::OS)
    }

    pub fn from_name(name: &'static str) -> Self {
        match name {
            "linux" => HostOs::Linux,
            "macos" => HostOs::MacOs,
            "windows" => HostOs::Windows,
            other => HostOs::Other(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostOs::Linux => "linux",
            HostOs::MacOs => "macos",
            HostOs::Windows => "windows",
            HostOs::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEnvironment {
    pub os: HostOs,
    pub ci: bool,
}

impl HostEnvironment {
    pub fn detect() -> Self {
        let ci = std::env::var("CI").ok();
        Self::from_ci_value(HostOs::current(), ci.as_deref())
    }

    /// Any `CI` value other than `false`, empty included, marks a CI run.
    pub fn from_ci_value(os: HostOs, ci: Option<&str>) -> Self {
        Self {
            os,
            ci: ci.map_or(false, |value| value != "false"),
        }
    }

    /// Developer Linux boxes run a Chromium build unpacked under the work dir
    /// instead of a system-wide install.
    pub fn uses_bundled_browser(&self) -> bool {
        self.os == HostOs::Linux && !self.ci
    }
}

/// Everything needed to start Chromium, computed up front from config and host.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub executable: Option<PathBuf>,
    pub bundled: bool,
    pub headless: bool,
    pub sandbox: bool,
    pub window_size: [u32; 2],
    pub user_agent: String,
    pub download_dir: PathBuf,
    pub request_timeout: Option<Duration>,
    pub args: Vec<String>,
}

impl LaunchPlan {
    pub fn build(config: &ChromedlConfig, host: &HostEnvironment, headless: bool) -> Self {
        let browser = &config.browser;
        let bundled = browser.executable_path.is_none() && host.uses_bundled_browser();
        let executable = match &browser.executable_path {
            Some(path) => Some(config.resolve_path(path)),
            None if bundled => Some(config.resolve_path(BUNDLED_BROWSER_PATH)),
            None => None,
        };

        let [width, height] = browser.window_size;
        let mut args = Vec::new();
        if browser.disable_extensions {
            args.push("--disable-extensions".to_string());
        }
        args.push(format!("--window-size={width},{height}"));
        args.push(format!("--user-agent={}", browser.user_agent));

        Self {
            executable,
            bundled,
            headless,
            sandbox: browser.sandbox,
            window_size: browser.window_size,
            user_agent: browser.user_agent.clone(),
            download_dir: config.resolve_path(&browser.download_dir),
            request_timeout: browser.request_timeout_seconds.map(Duration::from_secs),
            args,
        }
    }

    /// Chrome preferences that keep downloads silent and unfiltered.
    pub fn preferences(&self) -> Value {
        json!({
            "download": {
                "default_directory": self.download_dir.to_string_lossy(),
                "prompt_for_download": false,
                "directory_upgrade": true,
            },
            "safebrowsing": {
                "enabled": false,
                "disable_download_protection": true,
            },
        })
    }

    pub fn to_chromium_config(&self, user_data_dir: &Path) -> BrowserResult<ChromiumConfig> {
        let [width, height] = self.window_size;
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(user_data_dir)
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            });

        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.request_timeout {
            builder = builder.request_timeout(timeout);
        }

        // Without an explicit executable the builder searches the host for an
        // installed Chromium, so a failure here means nothing was found.
        builder
            .args(self.args.clone())
            .build()
            .map_err(|err| match self.executable {
                None => BrowserError::Launch(err),
                Some(_) => BrowserError::Configuration(err),
            })
    }
}
