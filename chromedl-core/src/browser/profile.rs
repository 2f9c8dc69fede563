use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ChromedlConfig;

use super::error::{BrowserError, BrowserResult};

/// Throwaway Chromium user-data directory, one per launch.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    id: String,
    path: PathBuf,
}

impl BrowserProfile {
    pub fn new(base_dir: &Path) -> BrowserResult<Self> {
        let id = Uuid::new_v4().to_string();
        let path = base_dir.join(&id);
        std::fs::create_dir_all(&path)
            .map_err(|err| BrowserError::Profile(format!("failed to create profile dir: {err}")))?;
        Ok(Self { id, path })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.path.join("Default").join("Preferences")
    }

    /// Seeds `Default/Preferences` before Chromium starts; Chromium merges
    /// it into its own defaults on first read.
    pub async fn write_preferences(&self, preferences: &Value) -> BrowserResult<()> {
        let target = self.preferences_path();
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|err| {
                BrowserError::Profile(format!("failed to create preferences dir: {err}"))
            })?;
        }
        let body = serde_json::to_vec_pretty(preferences)
            .map_err(|err| BrowserError::Profile(format!("failed to encode preferences: {err}")))?;
        fs::write(&target, body)
            .await
            .map_err(|err| BrowserError::Profile(format!("failed to write preferences: {err}")))?;
        Ok(())
    }

    pub async fn remove(&self) -> BrowserResult<()> {
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BrowserError::Profile(format!(
                "failed to remove profile {}: {err}",
                self.id
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileManager {
    base_dir: PathBuf,
    ttl: Duration,
}

impl ProfileManager {
    pub fn new<P: AsRef<Path>>(base_dir: P, ttl: Duration) -> BrowserResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to create profile base dir: {err}"))
        })?;
        Ok(Self { base_dir, ttl })
    }

    pub fn from_config(config: &ChromedlConfig) -> BrowserResult<Self> {
        // Leftovers from crashed runs are swept after a day.
        let ttl = Duration::from_secs(24 * 60 * 60);
        Self::new(config.resolve_path("profiles"), ttl)
    }

    pub fn allocate(&self) -> BrowserResult<BrowserProfile> {
        BrowserProfile::new(&self.base_dir)
    }

    /// Deletes profile directories untouched for longer than the TTL and
    /// returns how many were removed.
    pub async fn cleanup_expired(&self) -> BrowserResult<usize> {
        let now = SystemTime::now();
        let mut entries = fs::read_dir(&self.base_dir).await.map_err(|err| {
            BrowserError::Profile(format!("failed to list profile directory: {err}"))
        })?;

        let mut swept = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|err| {
            BrowserError::Profile(format!("failed to list profile directory: {err}"))
        })? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_dir() => metadata,
                Ok(_) => continue,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to stat profile");
                    continue;
                }
            };
            let expired = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map_or(false, |age| age > self.ttl);
            if !expired {
                continue;
            }
            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed stale profile");
                    swept += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to remove stale profile")
                }
            }
        }

        if swept > 0 {
            info!(swept, base_dir = %self.base_dir.display(), "Swept stale Chromium profiles");
        }
        Ok(swept)
    }
}
