// ─── Runtime Configuration ───
// Settings file + on-disk layout of the runtime cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::platform::Platform;

pub const DEFAULT_DATA_DIR_NAME: &str = "InterfaceOficial";
const SETTINGS_FILE: &str = "runtime_settings.json";
const RUNTIME_DIR: &str = "runtime";
const FORENSICS_DIR: &str = ".forensics";
const WRITE_PROBE_FILE: &str = ".write_test";

/// Tunables for the runtime subsystem, persisted as `runtime_settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Base URL of the Adoptium API (overridable for mirrors and tests).
    pub api_base_url: String,
    /// Timeout for interactive compatibility checks.
    pub probe_timeout_secs: u64,
    /// Timeout for probes issued while scanning the cache.
    pub scan_probe_timeout_secs: u64,
    /// How deep the executable locator descends into an extracted tree.
    pub max_search_depth: usize,
    /// Refuse to install an artifact whose digest cannot be obtained.
    pub require_integrity_verification: bool,
    pub min_free_disk_bytes: u64,
    pub http_timeout_secs: u64,
    /// Run one background cleanup pass right after `initialize_paths`.
    pub scan_on_startup: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.adoptium.net".to_string(),
            probe_timeout_secs: 5,
            scan_probe_timeout_secs: 3,
            max_search_depth: 10,
            require_integrity_verification: true,
            min_free_disk_bytes: 512 * 1024 * 1024,
            http_timeout_secs: 120,
            scan_on_startup: true,
        }
    }
}

impl RuntimeSettings {
    /// Load settings from `<data_dir>/runtime_settings.json`, falling back to
    /// defaults when the file is missing or unreadable.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("No runtime settings at {:?}, using defaults", path);
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Corrupt runtime settings at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        let path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| LauncherError::io(&path, source))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn scan_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_probe_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Directory layout: `<appData>/<dataDir>/runtime/<tag>/...`.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    data_dir: PathBuf,
    runtime_root: PathBuf,
}

impl RuntimePaths {
    /// `data_dir_name` is dot-prefixed everywhere except macOS, matching
    /// where the game itself keeps its data.
    pub fn new(app_data_dir: &Path, data_dir_name: &str) -> Self {
        let dir_name = match Platform::current() {
            Platform::Mac => data_dir_name.to_string(),
            _ => format!(".{}", data_dir_name.trim_start_matches('.')),
        };
        let data_dir = app_data_dir.join(dir_name);
        let runtime_root = data_dir.join(RUNTIME_DIR);
        Self {
            data_dir,
            runtime_root,
        }
    }

    /// Paths rooted at the host-provided application-data directory, or the
    /// platform data directory when the host gives none.
    pub fn from_host(app_data_dir: Option<PathBuf>, data_dir_name: Option<&str>) -> Self {
        let base = app_data_dir
            .or_else(dirs::data_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(&base, data_dir_name.unwrap_or(DEFAULT_DATA_DIR_NAME))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn runtime_root(&self) -> &Path {
        &self.runtime_root
    }

    pub fn forensics_dir(&self) -> PathBuf {
        self.runtime_root.join(FORENSICS_DIR)
    }
}

/// Create `dir` if needed and prove it is writable by writing and removing a
/// probe file. Fails fast with `PermissionDenied` instead of deep inside a
/// download.
pub async fn ensure_writable(dir: &Path) -> LauncherResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| classify_permission(dir, source))?;

    let probe = dir.join(WRITE_PROBE_FILE);
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|source| classify_permission(dir, source))?;
    let _ = tokio::fs::remove_file(&probe).await;
    Ok(())
}

fn classify_permission(dir: &Path, source: std::io::Error) -> LauncherError {
    if source.kind() == std::io::ErrorKind::PermissionDenied {
        LauncherError::PermissionDenied {
            path: dir.to_path_buf(),
        }
    } else {
        LauncherError::io(dir, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn runtime_root_lives_under_data_dir() {
        let paths = RuntimePaths::new(Path::new("/appdata"), "MyLauncher");
        assert!(paths.runtime_root().starts_with(paths.data_dir()));
        assert!(paths.runtime_root().ends_with("runtime"));
        let name = paths.data_dir().file_name().unwrap().to_string_lossy();
        if cfg!(target_os = "macos") {
            assert_eq!(name, "MyLauncher");
        } else {
            assert_eq!(name, ".MyLauncher");
        }
    }

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(RuntimeSettings::load(dir.path()), RuntimeSettings::default());
    }

    #[test]
    fn partial_settings_keep_defaults_for_missing_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "require_integrity_verification": false, "probe_timeout_secs": 9 }"#,
        )
        .unwrap();
        let settings = RuntimeSettings::load(dir.path());
        assert!(!settings.require_integrity_verification);
        assert_eq!(settings.probe_timeout_secs, 9);
        assert_eq!(settings.max_search_depth, 10);
    }

    #[test]
    fn settings_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let settings = RuntimeSettings {
            scan_on_startup: false,
            ..RuntimeSettings::default()
        };
        settings.save(dir.path()).unwrap();
        assert_eq!(RuntimeSettings::load(dir.path()), settings);
    }

    #[tokio::test]
    async fn ensure_writable_creates_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a").join("runtime");
        ensure_writable(&target).await.unwrap();
        assert!(target.is_dir());
        assert!(!target.join(WRITE_PROBE_FILE).exists());
    }
}
