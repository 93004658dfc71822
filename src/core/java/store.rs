// ─── Runtime Store ───
// The on-disk cache: one directory per runtime tag under the cache root.
// Records are synthesized by scanning, never persisted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::core::config::RuntimeSettings;
use crate::core::error::{LauncherError, LauncherResult};

use super::locate::find_java_executable;
use super::platform::Platform;
use super::probe::{probe_java, JavaVersion};
use super::version::RuntimeTag;

const STAGING_PREFIX: &str = ".staging-";
const BACKUP_PREFIX: &str = ".backup-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    Valid,
    /// Executable present but does not answer `-version` in time.
    Corrupted,
    Empty,
    /// Files present but no executable.
    Incomplete,
    /// The directory itself cannot be read.
    Inaccessible,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallationRecord {
    /// Directory name, e.g. `java17`.
    pub name: String,
    /// `None` for directories that do not match a known tag.
    pub tag: Option<RuntimeTag>,
    pub executable_path: Option<PathBuf>,
    pub probed_version: Option<JavaVersion>,
    pub directory: PathBuf,
    pub size_bytes: u64,
    pub status: InstallStatus,
    pub error: Option<String>,
}

impl InstallationRecord {
    pub fn is_valid(&self) -> bool {
        self.status == InstallStatus::Valid
    }

    pub fn probed_major(&self) -> Option<u32> {
        self.probed_version.as_ref().map(|v| v.major)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeftoverKind {
    /// Extraction target of an install that never got promoted.
    Staging,
    /// Previous install moved aside during promotion.
    Backup,
}

/// A hidden working directory left behind by an interrupted install.
#[derive(Debug, Clone)]
pub struct Leftover {
    pub path: PathBuf,
    pub kind: LeftoverKind,
    pub tag: Option<RuntimeTag>,
}

impl Leftover {
    fn parse(path: PathBuf) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let (kind, rest) = if let Some(rest) = name.strip_prefix(STAGING_PREFIX) {
            (LeftoverKind::Staging, rest)
        } else if let Some(rest) = name.strip_prefix(BACKUP_PREFIX) {
            (LeftoverKind::Backup, rest)
        } else {
            return None;
        };
        let tag = rest
            .split_once('-')
            .and_then(|(tag, _)| RuntimeTag::from_dir_name(tag));
        Some(Self { path, kind, tag })
    }
}

/// One async mutex per tag. Installs hold it for their whole pipeline;
/// cleanup passes only `try_lock` and skip busy tags.
#[derive(Debug, Clone, Default)]
pub struct TagLocks {
    locks: Arc<Mutex<HashMap<RuntimeTag, Arc<tokio::sync::Mutex<()>>>>>,
}

impl TagLocks {
    fn slot(&self, tag: RuntimeTag) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(tag).or_default())
    }

    pub async fn lock(&self, tag: RuntimeTag) -> OwnedMutexGuard<()> {
        self.slot(tag).lock_owned().await
    }

    pub fn try_lock(&self, tag: RuntimeTag) -> Option<OwnedMutexGuard<()>> {
        self.slot(tag).try_lock_owned().ok()
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStore {
    root: PathBuf,
    platform: Platform,
    max_search_depth: usize,
    scan_probe_timeout: Duration,
    locks: TagLocks,
}

impl RuntimeStore {
    pub fn new(root: PathBuf, settings: &RuntimeSettings) -> Self {
        Self {
            root,
            platform: Platform::current(),
            max_search_depth: settings.max_search_depth,
            scan_probe_timeout: settings.scan_probe_timeout(),
            locks: TagLocks::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn locks(&self) -> &TagLocks {
        &self.locks
    }

    pub fn tag_dir(&self, tag: RuntimeTag) -> PathBuf {
        self.root.join(tag.dir_name())
    }

    /// Fresh extraction directory for an install of `tag`.
    pub fn staging_dir(&self, tag: RuntimeTag) -> PathBuf {
        self.root
            .join(format!("{STAGING_PREFIX}{}-{}", tag.dir_name(), Uuid::new_v4().simple()))
    }

    /// Fresh name to move the current install of `tag` aside to.
    pub fn backup_dir(&self, tag: RuntimeTag) -> PathBuf {
        self.root
            .join(format!("{BACKUP_PREFIX}{}-{}", tag.dir_name(), Uuid::new_v4().simple()))
    }

    pub async fn ensure_tag_dir(&self, tag: RuntimeTag) -> LauncherResult<PathBuf> {
        let dir = self.tag_dir(tag);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| LauncherError::io(&dir, source))?;
        Ok(dir)
    }

    /// Run the executable locator over `dir`.
    pub fn locate_in(&self, dir: &Path) -> Option<PathBuf> {
        find_java_executable(dir, self.platform.java_exe(), self.max_search_depth)
    }

    /// Executable of the cached runtime for `tag`, if any.
    pub fn find_existing(&self, tag: RuntimeTag) -> Option<PathBuf> {
        let dir = self.tag_dir(tag);
        if !dir.is_dir() {
            return None;
        }
        self.locate_in(&dir)
    }

    /// Visible subdirectories of the cache root. Dot-prefixed entries
    /// (staging, backups, forensics) and plain files are not installations.
    pub async fn entry_dirs(&self) -> LauncherResult<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
            Err(source) => return Err(LauncherError::io(&self.root, source)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| LauncherError::io(&self.root, source))?
        {
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !path.is_dir() {
                continue;
            }
            dirs.push(path);
        }

        dirs.sort();
        Ok(dirs)
    }

    /// Staging and backup directories under the root, in name order.
    pub async fn leftovers(&self) -> LauncherResult<Vec<Leftover>> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(source) => return Err(LauncherError::io(&self.root, source)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| LauncherError::io(&self.root, source))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(leftover) = Leftover::parse(path) {
                found.push(leftover);
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    /// Classify every installation. Probes run one at a time.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> LauncherResult<Vec<InstallationRecord>> {
        let mut records = Vec::new();
        for dir in self.entry_dirs().await? {
            records.push(self.classify(&dir).await);
        }
        Ok(records)
    }

    /// Classify a single installation directory.
    pub async fn classify(&self, dir: &Path) -> InstallationRecord {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut record = InstallationRecord {
            tag: RuntimeTag::from_dir_name(&name),
            name,
            executable_path: None,
            probed_version: None,
            directory: dir.to_path_buf(),
            size_bytes: 0,
            status: InstallStatus::Valid,
            error: None,
        };

        let store = self.clone();
        let owned = dir.to_path_buf();
        let inspected = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let is_empty = std::fs::read_dir(&owned)?.next().is_none();
            let executable = if is_empty { None } else { store.locate_in(&owned) };
            Ok((is_empty, executable, directory_size_bytes(&owned)))
        })
        .await;

        let (is_empty, executable, size) = match inspected {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                record.status = InstallStatus::Inaccessible;
                record.error = Some(format!("cannot read directory: {e}"));
                return record;
            }
            Err(e) => {
                record.status = InstallStatus::Inaccessible;
                record.error = Some(format!("inspection task failed: {e}"));
                return record;
            }
        };
        record.size_bytes = size;

        if is_empty {
            record.status = InstallStatus::Empty;
            record.error = Some("empty directory".to_string());
            return record;
        }

        let Some(executable) = executable else {
            record.status = InstallStatus::Incomplete;
            record.error = Some("Java executable not found".to_string());
            return record;
        };
        record.executable_path = Some(executable.clone());

        match probe_java(&executable, self.scan_probe_timeout).await {
            Ok(version) => {
                debug!("{} is Java {}", record.name, version.raw);
                record.probed_version = Some(version);
            }
            Err(e) => {
                warn!("{} failed its version probe: {}", record.name, e);
                record.status = InstallStatus::Corrupted;
                record.error = Some(e.to_string());
            }
        }
        record
    }
}

/// Total size of regular files below `path`; symlinks are not followed.
pub fn directory_size_bytes(path: &Path) -> u64 {
    let mut total_size = 0_u64;
    let mut stack = vec![path.to_path_buf()];

    while let Some(current) = stack.pop() {
        let read_dir = match std::fs::read_dir(&current) {
            Ok(read_dir) => read_dir,
            Err(_) => continue,
        };

        for entry in read_dir.flatten() {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    total_size = total_size.saturating_add(metadata.len());
                } else if metadata.is_dir() {
                    stack.push(entry.path());
                }
            }
        }
    }

    total_size
}
