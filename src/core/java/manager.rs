// ─── Runtime Manager ───
// Entry point for the host. Decides, per game version, whether to reuse a
// caller-supplied runtime, an installed one, a fresh install, or a
// degraded fallback.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::core::config::{ensure_writable, RuntimePaths, RuntimeSettings};
use crate::core::error::LauncherResult;

use super::cleaner::{Cleaner, CleanupReport, ScanReport};
use super::compat::{check, CompatibilityReport};
use super::download::Downloader;
use super::guard::{GameSession, SessionId, UsageGuard};
use super::install::{InstallCallbacks, Installer};
use super::store::{InstallationRecord, RuntimeStore};
use super::version::{required_tag, RuntimeTag, TargetVersion};

/// Snapshot of running games for the host UI.
#[derive(Debug, Clone, Serialize)]
pub struct GameStatus {
    pub running: bool,
    pub sessions: Vec<GameSession>,
}

#[derive(Debug, Clone)]
pub struct RuntimeManager {
    paths: RuntimePaths,
    settings: RuntimeSettings,
    store: RuntimeStore,
    guard: UsageGuard,
    cleaner: Cleaner,
    installer: Installer,
}

impl RuntimeManager {
    pub fn new(paths: RuntimePaths, settings: RuntimeSettings) -> LauncherResult<Self> {
        let store = RuntimeStore::new(paths.runtime_root().to_path_buf(), &settings);
        let guard = UsageGuard::new();
        let cleaner = Cleaner::new(store.clone(), guard.clone(), paths.forensics_dir());
        let downloader = Downloader::new(&settings)?;
        let installer = Installer::new(store.clone(), downloader, guard.clone(), &settings);
        Ok(Self {
            paths,
            settings,
            store,
            guard,
            cleaner,
            installer,
        })
    }

    /// Build from the host's application-data directory, loading
    /// `runtime_settings.json` from the data directory when present.
    pub fn from_host(app_data_dir: Option<PathBuf>, data_dir_name: Option<&str>) -> LauncherResult<Self> {
        let paths = RuntimePaths::from_host(app_data_dir, data_dir_name);
        let settings = RuntimeSettings::load(paths.data_dir());
        Self::new(paths, settings)
    }

    /// Create the cache root and prove it writable. Optionally kicks off one
    /// background integrity pass.
    pub async fn initialize_paths(&self) -> LauncherResult<PathBuf> {
        let root = self.runtime_root().to_path_buf();
        ensure_writable(&root).await?;
        info!("Runtime cache ready at {:?}", root);

        if self.settings.scan_on_startup {
            let cleaner = self.cleaner.clone();
            tokio::spawn(async move {
                match cleaner.scan_and_clean().await {
                    Ok(report) => info!(
                        "Startup scan: cleaned {} of {} entries",
                        report.cleaned, report.total
                    ),
                    Err(e) => warn!("Startup scan failed: {}", e),
                }
            });
        }
        Ok(root)
    }

    /// Executable to launch Minecraft `version` with.
    #[instrument(skip(self, callbacks))]
    pub async fn get_runtime_for(
        &self,
        version: &str,
        preferred: Option<&Path>,
        callbacks: InstallCallbacks,
    ) -> LauncherResult<PathBuf> {
        let target: TargetVersion = version.parse()?;
        let probe_timeout = self.settings.probe_timeout();

        if let Some(preferred) = preferred {
            let report = check(preferred, &target, probe_timeout).await;
            if report.compatible && report.optimal {
                info!("Using preferred runtime {:?}", preferred);
                return Ok(preferred.to_path_buf());
            }
            info!("Preferred runtime {:?} not used: {}", preferred, report.message);
        }

        let required = required_tag(&target);
        if let Some(existing) = self.store.find_existing(required) {
            let report = check(&existing, &target, probe_timeout).await;
            if report.compatible && report.optimal {
                info!("Using installed {} at {:?}", required, existing);
                return Ok(existing);
            }
        }

        let install_error = match self.installer.install(&target, &callbacks).await {
            Ok(executable) => return Ok(executable),
            Err(e) => e,
        };
        error!("Installing {} failed: {}", required, install_error);

        match self.fallback_for(required).await {
            Some(record) => {
                let major = record.probed_major().unwrap_or_default();
                warn!(
                    "Falling back to installed Java {} for Minecraft {}; install {} when the network is available",
                    major, target, required
                );
                record.executable_path.ok_or(install_error)
            }
            None => Err(install_error),
        }
    }

    /// Lowest valid installation whose major is at least `required`.
    async fn fallback_for(&self, required: RuntimeTag) -> Option<InstallationRecord> {
        let installed = match self.cleaner.list(true).await {
            Ok(installed) => installed,
            Err(e) => {
                warn!("Could not list runtimes for fallback: {}", e);
                return None;
            }
        };
        installed
            .into_iter()
            .filter(|record| record.executable_path.is_some())
            .filter(|record| record.probed_major().is_some_and(|m| m >= required.major()))
            .min_by_key(|record| record.probed_major())
    }

    /// Compatibility of an arbitrary executable with Minecraft `version`.
    pub async fn check_runtime(&self, path: &Path, version: &str) -> LauncherResult<CompatibilityReport> {
        let target: TargetVersion = version.parse()?;
        Ok(check(path, &target, self.settings.probe_timeout()).await)
    }

    pub async fn list_installed(&self, auto_cleanup: bool) -> LauncherResult<Vec<InstallationRecord>> {
        self.cleaner.list(auto_cleanup).await
    }

    pub async fn cleanup_unused(&self, force: bool) -> LauncherResult<CleanupReport> {
        self.cleaner.cleanup_unused(force).await
    }

    pub async fn scan_and_clean(&self) -> LauncherResult<ScanReport> {
        self.cleaner.scan_and_clean().await
    }

    pub fn mark_in_use(&self, runtime_path: &Path, label: Option<&str>) -> SessionId {
        self.guard.mark_in_use(runtime_path, label)
    }

    pub fn release(&self, session: SessionId) -> bool {
        self.guard.release(session)
    }

    pub fn mark_free(&self) {
        self.guard.mark_free();
    }

    pub fn is_in_use(&self, path: &Path) -> bool {
        self.guard.is_in_use(path)
    }

    pub fn game_status(&self) -> GameStatus {
        let sessions = self.guard.sessions();
        GameStatus {
            running: !sessions.is_empty(),
            sessions,
        }
    }

    pub fn runtime_root(&self) -> &Path {
        self.paths.runtime_root()
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }
}
