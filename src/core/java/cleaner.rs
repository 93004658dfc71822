// ─── Integrity Scanner / Cleaner ───
// Removes broken or unused installations. Every deletion is gated by the
// usage guard and the per-tag install lock; failures are logged per entry
// and never abort a pass.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::guard::UsageGuard;
use super::store::{InstallStatus, InstallationRecord, Leftover, LeftoverKind, RuntimeStore};
use super::version::RuntimeTag;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub cleaned: usize,
    pub total: usize,
    /// Non-valid entries kept because a running game uses them.
    pub retained_in_use: Vec<PathBuf>,
    /// Staging and backup directories of interrupted installs that were
    /// removed or restored.
    pub leftovers_reconciled: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub cleaned: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub total_size: u64,
    pub freed_space: u64,
}

/// Written next to the cache before an installation is deleted.
#[derive(Debug, Serialize)]
struct ForensicRecord<'a> {
    timestamp: DateTime<Utc>,
    tag: Option<RuntimeTag>,
    name: &'a str,
    path: &'a Path,
    status: InstallStatus,
    reason: &'a str,
}

enum Removal {
    Removed,
    InUse,
    Busy,
}

#[derive(Debug, Clone)]
pub struct Cleaner {
    store: RuntimeStore,
    guard: UsageGuard,
    forensics_dir: PathBuf,
}

impl Cleaner {
    pub fn new(store: RuntimeStore, guard: UsageGuard, forensics_dir: PathBuf) -> Self {
        Self {
            store,
            guard,
            forensics_dir,
        }
    }

    /// Classify every installation. With `auto_cleanup`, non-valid entries
    /// are removed on the spot and only valid ones are returned.
    #[instrument(skip(self))]
    pub async fn list(&self, auto_cleanup: bool) -> LauncherResult<Vec<InstallationRecord>> {
        let records = self.store.scan().await?;
        if !auto_cleanup {
            return Ok(records);
        }

        let mut valid = Vec::new();
        for record in records {
            if record.is_valid() {
                valid.push(record);
                continue;
            }
            let reason = record
                .error
                .clone()
                .unwrap_or_else(|| format!("{:?}", record.status));
            if let Err(e) = self.remove_guarded(&record, &reason, false).await {
                warn!("Could not remove {:?}: {}", record.directory, e);
            }
        }
        Ok(valid)
    }

    /// One full pass: remove every non-valid entry that is neither in use
    /// nor being installed. Calling it twice in a row cleans nothing the
    /// second time.
    #[instrument(skip(self))]
    pub async fn scan_and_clean(&self) -> LauncherResult<ScanReport> {
        let leftovers_reconciled = self.reconcile_leftovers().await?;
        let records = self.store.scan().await?;
        let mut report = ScanReport {
            total: records.len(),
            leftovers_reconciled,
            ..ScanReport::default()
        };

        for record in records.iter().filter(|r| !r.is_valid()) {
            let reason = record
                .error
                .clone()
                .unwrap_or_else(|| format!("{:?}", record.status));
            match self.remove_guarded(record, &reason, false).await {
                Ok(Removal::Removed) => report.cleaned += 1,
                Ok(Removal::InUse) => report.retained_in_use.push(record.directory.clone()),
                Ok(Removal::Busy) => {}
                Err(e) => warn!("Could not remove {:?}: {}", record.directory, e),
            }
        }

        info!(
            "Integrity scan finished: {} of {} entries cleaned, {} retained in use",
            report.cleaned,
            report.total,
            report.retained_in_use.len()
        );
        Ok(report)
    }

    /// Delete every installation not in use (or every one, with `force`).
    #[instrument(skip(self))]
    pub async fn cleanup_unused(&self, force: bool) -> LauncherResult<CleanupReport> {
        let mut report = CleanupReport::default();
        self.reconcile_leftovers().await?;

        for record in self.store.scan().await? {
            report.total_size = report.total_size.saturating_add(record.size_bytes);
            match self.remove_guarded(&record, "unused runtime cleanup", force).await {
                Ok(Removal::Removed) => {
                    report.cleaned += 1;
                    report.freed_space = report.freed_space.saturating_add(record.size_bytes);
                }
                Ok(Removal::InUse) | Ok(Removal::Busy) => report.skipped += 1,
                Err(e) => report.errors.push(format!("{}: {}", record.name, e)),
            }
        }

        info!(
            "Cleanup finished: cleaned={} skipped={} errors={} freed={} bytes",
            report.cleaned,
            report.skipped,
            report.errors.len(),
            report.freed_space
        );
        Ok(report)
    }

    /// Settle what interrupted installs left behind. Staging directories are
    /// deleted. A backup is moved back when its tag directory is missing and
    /// deleted otherwise. Tags with a running install are left alone.
    pub async fn reconcile_leftovers(&self) -> LauncherResult<usize> {
        let mut reconciled = 0;
        for leftover in self.store.leftovers().await? {
            let _lock = match leftover.tag {
                Some(tag) => match self.store.locks().try_lock(tag) {
                    Some(lock) => Some(lock),
                    None => {
                        debug!("Leaving {:?}: an install of {} is running", leftover.path, tag);
                        continue;
                    }
                },
                None => None,
            };

            match self.reconcile_one(&leftover).await {
                Ok(()) => reconciled += 1,
                Err(e) => warn!("Could not reconcile {:?}: {}", leftover.path, e),
            }
        }
        Ok(reconciled)
    }

    async fn reconcile_one(&self, leftover: &Leftover) -> LauncherResult<()> {
        if leftover.kind == LeftoverKind::Backup {
            if let Some(tag) = leftover.tag {
                let tag_dir = self.store.tag_dir(tag);
                if !tag_dir.exists() {
                    tokio::fs::rename(&leftover.path, &tag_dir)
                        .await
                        .map_err(|source| LauncherError::io(&tag_dir, source))?;
                    info!("Restored {:?} from interrupted install backup", tag_dir);
                    return Ok(());
                }
            }
        }

        remove_tree(&leftover.path).await?;
        info!("Removed leftover {:?}", leftover.path);
        Ok(())
    }

    async fn remove_guarded(
        &self,
        record: &InstallationRecord,
        reason: &str,
        force: bool,
    ) -> LauncherResult<Removal> {
        if self.guard.is_in_use(&record.directory) {
            if !force {
                info!("Keeping {:?}: in use by a running game", record.directory);
                return Ok(Removal::InUse);
            }
            warn!("Force-removing {:?} although it is in use", record.directory);
        }

        let _lock = match record.tag {
            Some(tag) => match self.store.locks().try_lock(tag) {
                Some(lock) => Some(lock),
                None => {
                    info!("Skipping {:?}: an install of {} is running", record.directory, tag);
                    return Ok(Removal::Busy);
                }
            },
            None => None,
        };

        self.write_forensic_record(record, reason).await;
        remove_tree(&record.directory).await?;

        if record.directory.exists() {
            return Err(LauncherError::Other(format!(
                "{} still exists after removal",
                record.directory.display()
            )));
        }
        info!("Removed {:?} ({})", record.directory, reason);
        Ok(Removal::Removed)
    }

    async fn write_forensic_record(&self, record: &InstallationRecord, reason: &str) {
        let now = Utc::now();
        let entry = ForensicRecord {
            timestamp: now,
            tag: record.tag,
            name: &record.name,
            path: &record.directory,
            status: record.status,
            reason,
        };
        let file = self
            .forensics_dir
            .join(format!("{}-{}.json", now.format("%Y%m%dT%H%M%S%.3fZ"), record.name));

        let result = async {
            tokio::fs::create_dir_all(&self.forensics_dir).await?;
            let payload = serde_json::to_vec_pretty(&entry).map_err(std::io::Error::other)?;
            tokio::fs::write(&file, payload).await
        }
        .await;
        if let Err(e) = result {
            warn!("Could not write forensic record {:?}: {}", file, e);
        }
    }
}

/// Recursive delete; on failure, clear read-only flags and try once more.
async fn remove_tree(dir: &Path) -> LauncherResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(first) => {
            warn!("First removal of {:?} failed ({}), retrying", dir, first);
            let owned = dir.to_path_buf();
            let _ = tokio::task::spawn_blocking(move || clear_readonly(&owned)).await;
            tokio::fs::remove_dir_all(dir)
                .await
                .map_err(|source| LauncherError::io(dir, source))
        }
    }
}

#[allow(clippy::permissions_set_readonly_false)]
fn clear_readonly(root: &Path) {
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(metadata) = std::fs::symlink_metadata(&current) else {
            continue;
        };
        let mut perms = metadata.permissions();
        if perms.readonly() {
            perms.set_readonly(false);
            let _ = std::fs::set_permissions(&current, perms);
        }
        if metadata.is_dir() {
            if let Ok(entries) = std::fs::read_dir(&current) {
                stack.extend(entries.flatten().map(|entry| entry.path()));
            }
        }
    }
}
