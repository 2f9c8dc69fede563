use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::DownloadSection;

use super::error::{BrowserError, BrowserResult};
use super::sleeper::{Sleeper, TokioSleeper};

/// Blocks until the single download written into a directory is finalized.
///
/// The directory must be dedicated to one pending download: Chromium writes
/// `<name><suffix>` while transferring and renames it to `<name>` when done.
pub struct DownloadWatcher {
    settings: DownloadSection,
    sleeper: Arc<dyn Sleeper>,
}

#[derive(Debug, Default)]
struct DirectorySnapshot {
    downloading: Vec<PathBuf>,
    downloaded: Vec<PathBuf>,
}

impl DirectorySnapshot {
    fn is_empty(&self) -> bool {
        self.downloading.is_empty() && self.downloaded.is_empty()
    }
}

impl DownloadWatcher {
    pub fn new(settings: DownloadSection) -> BrowserResult<Self> {
        settings
            .validate()
            .map_err(|err| BrowserError::Configuration(err.to_string()))?;
        Ok(Self {
            settings,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn settings(&self) -> &DownloadSection {
        &self.settings
    }

    pub async fn await_download(&self, dir: &Path) -> BrowserResult<PathBuf> {
        let entries = list_entries(dir).await?;
        if entries.len() > 1 {
            return Err(BrowserError::DownloadDirNotExclusive {
                dir: dir.to_path_buf(),
                entries,
            });
        }

        let mut snapshot = self.partition(entries);
        let mut polls = 0u32;
        while snapshot.is_empty() {
            if polls >= self.settings.start_poll_limit {
                return Err(BrowserError::DownloadNeverStarted {
                    dir: dir.to_path_buf(),
                    polls,
                });
            }
            info!(dir = %dir.display(), poll = polls + 1, "Waiting for download to start");
            self.sleeper
                .sleep(self.settings.start_poll_interval())
                .await;
            polls += 1;
            snapshot = self.partition(list_entries(dir).await?);
        }

        let DirectorySnapshot {
            mut downloading,
            mut downloaded,
        } = snapshot;
        match (downloading.len(), downloaded.len()) {
            (0, 1) => {
                let done = downloaded.remove(0);
                info!(path = %done.display(), "Download already complete");
                Ok(done)
            }
            (1, 0) => {
                let partial = downloading.remove(0);
                match self.target_for(&partial) {
                    Some(target) => self.track(partial, target).await,
                    None => Err(BrowserError::DownloadAnomaly {
                        downloading: vec![partial],
                        downloaded,
                    }),
                }
            }
            _ => Err(BrowserError::DownloadAnomaly {
                downloading,
                downloaded,
            }),
        }
    }

    async fn track(&self, partial: PathBuf, target: PathBuf) -> BrowserResult<PathBuf> {
        let window = self.settings.stall_window.max(1);
        // Seeded non-zero so a stall needs a full window of zero deltas.
        let mut deltas: VecDeque<i64> = std::iter::repeat(1).take(window).collect();
        let mut previous_size = 0u64;
        let mut missing_polls = 0usize;

        info!(
            partial = %partial.display(),
            target = %target.display(),
            "Download in progress"
        );

        while !fs::try_exists(&target).await? {
            self.sleeper
                .sleep(self.settings.progress_poll_interval())
                .await;

            match fs::metadata(&partial).await {
                Ok(metadata) => {
                    missing_polls = 0;
                    let size = metadata.len();
                    deltas.pop_front();
                    deltas.push_back(size as i64 - previous_size as i64);
                    previous_size = size;

                    if deltas.iter().sum::<i64>() == 0 {
                        warn!(path = %partial.display(), size, "Download appears frozen");
                        return Err(BrowserError::DownloadStalled {
                            path: partial,
                            size,
                        });
                    }
                    info!(size, "Downloading");
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    missing_polls += 1;
                    if missing_polls >= window && !fs::try_exists(&target).await? {
                        return Err(BrowserError::DownloadVanished { partial, target });
                    }
                    debug!(
                        path = %partial.display(),
                        "Partial file gone, presumably renamed to its final name"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(path = %target.display(), "Download complete");
        Ok(target)
    }

    fn partition(&self, entries: Vec<PathBuf>) -> DirectorySnapshot {
        let mut snapshot = DirectorySnapshot::default();
        for entry in entries {
            if self.is_in_progress(&entry) {
                snapshot.downloading.push(entry);
            } else {
                snapshot.downloaded.push(entry);
            }
        }
        snapshot
    }

    fn is_in_progress(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| {
                name.to_string_lossy()
                    .ends_with(&self.settings.in_progress_suffix)
            })
            .unwrap_or(false)
    }

    fn target_for(&self, partial: &Path) -> Option<PathBuf> {
        let name = partial.file_name()?.to_string_lossy().into_owned();
        let stem = name.strip_suffix(&self.settings.in_progress_suffix)?;
        if stem.is_empty() {
            None
        } else {
            Some(partial.with_file_name(stem))
        }
    }
}

async fn list_entries(dir: &Path) -> BrowserResult<Vec<PathBuf>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingSleeper {
        calls: Mutex<Vec<Duration>>,
    }

    #[async_trait::async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.calls.lock().unwrap().push(duration);
        }
    }

    fn watcher(sleeper: Arc<CountingSleeper>) -> DownloadWatcher {
        DownloadWatcher::new(DownloadSection::default())
            .unwrap()
            .with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn finished_file_is_returned_without_sleeping() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("invoice.pdf"), b"%PDF").unwrap();
        let sleeper = Arc::new(CountingSleeper::default());

        let path = watcher(Arc::clone(&sleeper))
            .await_download(dir.path())
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("invoice.pdf"));
        assert!(sleeper.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn crowded_directory_fails_before_sleeping() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.csv"), b"a").unwrap();
        std::fs::write(dir.path().join("b.csv.crdownload"), b"b").unwrap();
        let sleeper = Arc::new(CountingSleeper::default());

        let err = watcher(Arc::clone(&sleeper))
            .await_download(dir.path())
            .await
            .unwrap_err();

        match err {
            BrowserError::DownloadDirNotExclusive { entries, .. } => assert_eq!(entries.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(sleeper.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_directory_gives_up_after_poll_limit() {
        let dir = TempDir::new().unwrap();
        let sleeper = Arc::new(CountingSleeper::default());

        let err = watcher(Arc::clone(&sleeper))
            .await_download(dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, BrowserError::DownloadNeverStarted { polls: 10, .. }));
        let calls = sleeper.calls.lock().unwrap();
        assert_eq!(calls.len(), 10);
        assert!(calls.iter().all(|d| *d == Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = watcher(Arc::new(CountingSleeper::default()))
            .await_download(&dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Io(_)));
    }

    #[test]
    fn target_strips_only_the_trailing_suffix() {
        let watcher = watcher(Arc::new(CountingSleeper::default()));
        assert_eq!(
            watcher.target_for(Path::new("/dl/report.crdownload.csv.crdownload")),
            Some(PathBuf::from("/dl/report.crdownload.csv"))
        );
        assert_eq!(watcher.target_for(Path::new("/dl/.crdownload")), None);
        assert_eq!(watcher.target_for(Path::new("/dl/report.csv")), None);
    }

    #[test]
    fn partition_splits_on_suffix() {
        let watcher = watcher(Arc::new(CountingSleeper::default()));
        let snapshot = watcher.partition(vec![
            PathBuf::from("/dl/a.zip.crdownload"),
            PathBuf::from("/dl/b.zip"),
        ]);
        assert_eq!(snapshot.downloading, vec![PathBuf::from("/dl/a.zip.crdownload")]);
        assert_eq!(snapshot.downloaded, vec![PathBuf::from("/dl/b.zip")]);
    }

    #[test]
    fn empty_suffix_is_refused_up_front() {
        let settings = DownloadSection {
            in_progress_suffix: String::new(),
            ..DownloadSection::default()
        };
        let err = DownloadWatcher::new(settings).err().unwrap();
        match err {
            BrowserError::Configuration(message) => {
                assert!(message.contains("download.in_progress_suffix"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
