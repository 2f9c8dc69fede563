pub mod commands;

use std::path::{Path, PathBuf};

use chromedl_core::browser::interact;
use chromedl_core::{
    load_config, BrowserLauncher, ChromedlConfig, DownloadWatcher, FailureKind,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use commands::{AwaitDownloadArgs, FetchArgs};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] chromedl_core::ConfigError),
    #[error("browser error: {0}")]
    Browser(#[from] chromedl_core::BrowserError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no configuration: pass --config or --work-dir")]
    MissingConfig,
    #[error("download directory {0} is not empty; clear it before fetching")]
    DownloadDirBusy(PathBuf),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive Chromium downloads from the command line", long_about = None)]
pub struct Cli {
    /// Path to chromedl.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Work directory (used when no config file is given)
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
    /// Overrides browser.download_dir
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
    /// Run Chromium without a window
    #[arg(long)]
    pub headless: bool,
    /// Skip the launch check before opening a session
    #[arg(long)]
    pub no_verify: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Checks that Chromium can be launched
    Verify,
    /// Waits for the download in progress to finish
    AwaitDownload(AwaitDownloadArgs),
    /// Opens a page, triggers a download and waits for it
    Fetch(FetchArgs),
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Verify => {
            let report = context.verify().await?;
            render(&report, cli.format)?;
        }
        Commands::AwaitDownload(args) => {
            let report = context.await_download(args).await?;
            render(&report, cli.format)?;
        }
        Commands::Fetch(args) => {
            let report = context.fetch(args).await?;
            render(&report, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: ChromedlConfig,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = match (&cli.config, &cli.work_dir) {
            (Some(path), _) => load_config(path)?,
            (None, Some(work_dir)) => {
                let download_dir = cli
                    .download_dir
                    .clone()
                    .unwrap_or_else(|| work_dir.join("downloads"));
                ChromedlConfig::new(work_dir.clone(), download_dir)
            }
            (None, None) => return Err(AppError::MissingConfig),
        };

        if let Some(work_dir) = &cli.work_dir {
            config.browser.work_dir = work_dir.clone();
        }
        if let Some(download_dir) = &cli.download_dir {
            config.browser.download_dir = download_dir.clone();
        }
        if cli.headless {
            config.browser.headless = true;
        }
        if cli.no_verify {
            config.browser.verify = false;
        }
        config.validate()?;

        Ok(Self { config })
    }

    fn download_dir(&self) -> PathBuf {
        self.config.resolve_path(&self.config.browser.download_dir)
    }

    async fn verify(&self) -> Result<VerifyReport> {
        let launcher = BrowserLauncher::new(self.config.clone())?;
        chromedl_core::browser::verify_browser(&launcher).await?;
        let plan = launcher.plan(&Default::default());
        Ok(VerifyReport {
            status: "ok".to_string(),
            os: launcher.host().os.name().to_string(),
            executable: plan
                .executable
                .map(|path| path.display().to_string()),
        })
    }

    async fn await_download(&self, args: &AwaitDownloadArgs) -> Result<DownloadReport> {
        let dir = args.dir.clone().unwrap_or_else(|| self.download_dir());
        let mut settings = self.config.download.clone();
        if let Some(suffix) = &args.suffix {
            settings.in_progress_suffix = suffix.clone();
        }
        let path = DownloadWatcher::new(settings)?.await_download(&dir).await?;
        DownloadReport::from_path(&path)
    }

    async fn fetch(&self, args: &FetchArgs) -> Result<DownloadReport> {
        let download_dir = self.download_dir();
        if download_dir.is_dir() && std::fs::read_dir(&download_dir)?.next().is_some() {
            return Err(AppError::DownloadDirBusy(download_dir));
        }

        let launcher = BrowserLauncher::new(self.config.clone())?;
        let mut retry = launcher.retry_policy();
        if args.retry_timeouts {
            retry = retry.also_retry(FailureKind::Timeout);
        }
        let watcher = launcher.download_watcher()?;
        let url = args.url.clone();
        let selector = args.click.clone();
        let fields = args.fill.clone();

        let path = launcher
            .with_session(move |session| {
                Box::pin(async move {
                    let page = session.new_page(&url).await?;
                    for (field, text) in &fields {
                        retry.run(|| interact::fill(&page, field, text)).await?;
                        debug!(field = %field, "Field filled");
                    }
                    let outcome = retry.run(|| interact::click(&page, &selector)).await?;
                    info!(selector = %selector, attempts = outcome.attempts, "Download triggered");
                    watcher.await_download(session.download_dir()).await
                })
            })
            .await?;
        DownloadReport::from_path(&path)
    }
}

#[derive(Debug, Serialize)]
struct VerifyReport {
    status: String,
    os: String,
    executable: Option<String>,
}

impl DisplayFallback for VerifyReport {
    fn display(&self) -> String {
        let executable = self
            .executable
            .clone()
            .unwrap_or_else(|| "system default".to_string());
        format!(
            "Chromium launch check: {}\nHost: {}\nExecutable: {}",
            self.status, self.os, executable
        )
    }
}

#[derive(Debug, Serialize)]
struct DownloadReport {
    path: String,
    bytes: u64,
}

impl DownloadReport {
    fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.display().to_string(),
            bytes,
        })
    }
}

impl DisplayFallback for DownloadReport {
    fn display(&self) -> String {
        format!("{} ({} bytes)", self.path, self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn cli(command: Commands) -> Cli {
        Cli {
            config: None,
            work_dir: None,
            download_dir: None,
            headless: false,
            no_verify: false,
            format: OutputFormat::Json,
            command,
        }
    }

    #[test]
    fn context_requires_some_configuration() {
        let err = AppContext::new(&cli(Commands::Verify)).unwrap_err();
        assert!(matches!(err, AppError::MissingConfig));
    }

    #[test]
    fn flags_override_config_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("chromedl.toml");
        fs::write(
            &config_path,
            format!(
                "[browser]\nwork_dir = {:?}\ndownload_dir = \"downloads\"\nheadless = false\n",
                temp.path().display().to_string()
            ),
        )
        .unwrap();

        let mut args = cli(Commands::Verify);
        args.config = Some(config_path);
        args.headless = true;
        args.no_verify = true;
        let context = AppContext::new(&args).unwrap();

        assert!(context.config.browser.headless);
        assert!(!context.config.browser.verify);
        assert_eq!(context.download_dir(), temp.path().join("downloads"));
    }

    #[test]
    fn work_dir_alone_derives_download_dir() {
        let temp = TempDir::new().unwrap();
        let mut args = cli(Commands::Verify);
        args.work_dir = Some(temp.path().to_path_buf());
        let context = AppContext::new(&args).unwrap();
        assert_eq!(context.download_dir(), temp.path().join("downloads"));
    }

    #[tokio::test]
    async fn await_download_reports_finished_file() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();
        fs::write(downloads.join("invoice.pdf"), b"%PDF-1.7").unwrap();

        let mut args = cli(Commands::Verify);
        args.work_dir = Some(temp.path().to_path_buf());
        let context = AppContext::new(&args).unwrap();

        let report = context
            .await_download(&AwaitDownloadArgs {
                dir: None,
                suffix: None,
            })
            .await
            .unwrap();
        assert!(report.path.ends_with("invoice.pdf"));
        assert_eq!(report.bytes, 8);
        assert!(report.display().contains("(8 bytes)"));
    }

    #[tokio::test]
    async fn fetch_refuses_a_busy_download_dir() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();
        fs::write(downloads.join("leftover.zip"), b"zip").unwrap();

        let mut args = cli(Commands::Verify);
        args.work_dir = Some(temp.path().to_path_buf());
        let context = AppContext::new(&args).unwrap();

        let err = context
            .fetch(&FetchArgs {
                url: "https://example.com/export".to_string(),
                click: "#download".to_string(),
                fill: vec![("#email".to_string(), "ops@example.com".to_string())],
                retry_timeouts: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DownloadDirBusy(_)));
    }

    #[tokio::test]
    async fn empty_suffix_override_is_refused() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();
        fs::write(downloads.join("report.csv.crdownload"), b"partial").unwrap();

        let mut args = cli(Commands::Verify);
        args.work_dir = Some(temp.path().to_path_buf());
        let context = AppContext::new(&args).unwrap();

        let err = context
            .await_download(&AwaitDownloadArgs {
                dir: None,
                suffix: Some(String::new()),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Browser(chromedl_core::BrowserError::Configuration(_))
        ));
    }

    #[test]
    fn fetch_accepts_repeated_fill_flags() {
        let cli = Cli::try_parse_from([
            "chromedlctl",
            "--work-dir",
            "/srv/chromedl",
            "fetch",
            "--url",
            "https://example.com/export",
            "--click",
            "#download",
            "--fill",
            "#from=2024-01-01",
            "--fill",
            "input[name=to]=2024-12-31",
        ])
        .unwrap();
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(
                    args.fill,
                    vec![
                        ("#from".to_string(), "2024-01-01".to_string()),
                        ("input[name=to]".to_string(), "2024-12-31".to_string()),
                    ]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
