// ─── Archive Installer ───
// Acquisition pipeline for one runtime tag:
//   resolve → download → verify → extract (staging) → locate → check → promote
// The whole pipeline runs under the tag's lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use crate::core::config::RuntimeSettings;
use crate::core::error::{LauncherError, LauncherResult};

use super::compat::check;
use super::download::{verify_sha256, DownloadDescriptor, Downloader, ProgressCallback};
use super::extract::{extract_archive, ArchiveFormat};
use super::guard::UsageGuard;
use super::platform::{Arch, Platform};
use super::store::RuntimeStore;
use super::version::{required_tag, RuntimeTag, TargetVersion};

/// Receives a human-readable phase string.
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional observers of an install.
#[derive(Clone, Default)]
pub struct InstallCallbacks {
    pub on_progress: Option<ProgressCallback>,
    pub on_status: Option<StatusCallback>,
}

impl InstallCallbacks {
    fn status(&self, phase: &str) {
        debug!("Install status: {}", phase);
        if let Some(callback) = &self.on_status {
            callback(phase);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Installer {
    store: RuntimeStore,
    downloader: Downloader,
    guard: UsageGuard,
    arch: Arch,
    probe_timeout: Duration,
    require_integrity: bool,
    min_free_disk_bytes: u64,
}

impl Installer {
    pub fn new(
        store: RuntimeStore,
        downloader: Downloader,
        guard: UsageGuard,
        settings: &RuntimeSettings,
    ) -> Self {
        Self {
            store,
            downloader,
            guard,
            arch: Arch::current(),
            probe_timeout: settings.probe_timeout(),
            require_integrity: settings.require_integrity_verification,
            min_free_disk_bytes: settings.min_free_disk_bytes,
        }
    }

    fn platform(&self) -> Platform {
        self.store.platform()
    }

    /// Make sure the runtime `target` needs is installed and return its
    /// executable.
    #[instrument(skip(self, callbacks))]
    pub async fn install(
        &self,
        target: &TargetVersion,
        callbacks: &InstallCallbacks,
    ) -> LauncherResult<PathBuf> {
        let tag = required_tag(target);
        let _lock = self.store.locks().lock(tag).await;

        match self.install_locked(tag, target, callbacks).await {
            Ok(executable) => {
                callbacks.status("installed");
                Ok(executable)
            }
            Err(e) => {
                callbacks.status(&format!("error: {e}"));
                Err(e)
            }
        }
    }

    async fn install_locked(
        &self,
        tag: RuntimeTag,
        target: &TargetVersion,
        callbacks: &InstallCallbacks,
    ) -> LauncherResult<PathBuf> {
        let tag_dir = self.store.ensure_tag_dir(tag).await?;

        if let Some(existing) = self.store.find_existing(tag) {
            let report = check(&existing, target, self.probe_timeout).await;
            if report.compatible && report.optimal {
                info!("Reusing installed {} at {:?}", tag, existing);
                return Ok(existing);
            }
            debug!("Installed {} not reusable: {}", tag, report.message);
        }

        let descriptor = self
            .downloader
            .resolve_descriptor(tag, self.platform(), self.arch)
            .await?;
        ensure_min_disk_space(self.store.root(), self.min_free_disk_bytes)?;

        callbacks.status(&format!("downloading {tag}"));
        let download_start = Instant::now();
        let archive = tag_dir.join(format!(".{}.download", tag.dir_name()));
        let outcome = self
            .downloader
            .download(&descriptor.url, &archive, callbacks.on_progress.as_ref())
            .await?;
        info!(
            "Runtime download finished in {:?} ({} bytes)",
            download_start.elapsed(),
            outcome.bytes
        );

        let verified = match self.verify_artifact(tag, &descriptor, &archive, callbacks).await {
            Ok(()) => ensure_min_disk_space(self.store.root(), self.min_free_disk_bytes),
            Err(e) => Err(e),
        };
        if let Err(e) = verified {
            remove_file_quietly(&archive).await;
            return Err(e);
        }

        let format = ArchiveFormat::detect(
            &descriptor.url,
            &outcome.final_url,
            &archive,
            self.platform(),
        );
        callbacks.status("extracting");
        let staging = self.store.staging_dir(tag);

        let extract_start = Instant::now();
        let (archive_path, staging_path) = (archive.clone(), staging.clone());
        let extracted = tokio::task::spawn_blocking(move || {
            extract_archive(&archive_path, format, &staging_path)
        })
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))
        .and_then(|result| result);
        remove_file_quietly(&archive).await;

        let result = match extracted {
            Ok(()) => {
                info!("Runtime extraction finished in {:?}", extract_start.elapsed());
                self.validate_and_promote(tag, target, &staging, &tag_dir).await
            }
            Err(e) => Err(e),
        };
        if result.is_err() && staging.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
                warn!("Failed to remove staging directory {:?}: {}", staging, e);
            }
        }
        result
    }

    /// Check the digest of the downloaded artifact. Without a digest the
    /// install proceeds only when verification is not required.
    async fn verify_artifact(
        &self,
        tag: RuntimeTag,
        descriptor: &DownloadDescriptor,
        archive: &Path,
        callbacks: &InstallCallbacks,
    ) -> LauncherResult<()> {
        let expected = match &descriptor.expected_hash {
            Some(hash) => Some(hash.clone()),
            None if descriptor.dynamic => {
                callbacks.status("obtaining checksum");
                self.downloader
                    .resolve_checksum(tag, self.platform(), self.arch)
                    .await
            }
            None => None,
        };

        match expected {
            Some(hash) => {
                callbacks.status("verifying integrity");
                verify_sha256(archive, &hash).await?;
                info!("SHA-256 verified for {} archive", tag);
                Ok(())
            }
            None if self.require_integrity => Err(LauncherError::ChecksumUnavailable {
                tag: tag.to_string(),
            }),
            None => {
                warn!(
                    "No checksum available for {}; integrity verification skipped by configuration",
                    tag
                );
                Ok(())
            }
        }
    }

    async fn validate_and_promote(
        &self,
        tag: RuntimeTag,
        target: &TargetVersion,
        staging: &Path,
        tag_dir: &Path,
    ) -> LauncherResult<PathBuf> {
        let store = self.store.clone();
        let search_root = staging.to_path_buf();
        let executable = tokio::task::spawn_blocking(move || store.locate_in(&search_root))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
            .ok_or_else(|| LauncherError::ExecutableNotFound(staging.to_path_buf()))?;

        let report = check(&executable, target, self.probe_timeout).await;
        if !report.compatible {
            return Err(LauncherError::Incompatible {
                path: executable,
                reason: report.message,
            });
        }

        let relative = executable
            .strip_prefix(staging)
            .map_err(|_| LauncherError::Other(format!("{:?} escaped staging", executable)))?
            .to_path_buf();

        if self.guard.is_in_use(tag_dir) {
            return Err(LauncherError::RuntimeInUse(tag_dir.to_path_buf()));
        }
        promote(staging, tag_dir, &self.store.backup_dir(tag)).await?;

        let installed = tag_dir.join(relative);
        info!("Installed {} at {:?}", tag, installed);
        Ok(installed)
    }
}

/// Swap `staging` into place, moving the previous directory aside to
/// `backup` and restoring it on failure. A backup that cannot be restored or
/// removed is left for the next integrity scan.
async fn promote(staging: &Path, tag_dir: &Path, backup: &Path) -> LauncherResult<()> {
    let had_previous = tag_dir.exists();
    if had_previous {
        tokio::fs::rename(tag_dir, backup)
            .await
            .map_err(|source| LauncherError::io(backup, source))?;
    }

    if let Err(source) = tokio::fs::rename(staging, tag_dir).await {
        if had_previous {
            if let Err(rollback) = tokio::fs::rename(backup, tag_dir).await {
                error!(
                    "Could not restore {:?} from {:?}: {}; the next scan will retry",
                    tag_dir, backup, rollback
                );
            }
        }
        return Err(LauncherError::io(tag_dir, source));
    }

    if had_previous {
        if let Err(e) = tokio::fs::remove_dir_all(backup).await {
            warn!("Failed to remove previous runtime {:?}: {}", backup, e);
        }
    }
    Ok(())
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

/// Fail with `InsufficientDisk` when the volume holding `path` has less
/// than `minimum_bytes` free. Unknown volumes pass.
fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> LauncherResult<()> {
    if minimum_bytes == 0 {
        return Ok(());
    }
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let available = disks
        .list()
        .iter()
        .filter(|disk| canonical.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space());

    match available {
        Some(available) if available < minimum_bytes => Err(LauncherError::InsufficientDisk {
            available,
            required: minimum_bytes,
        }),
        _ => Ok(()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::java::extract::tests::build_tar_gz;
    use crate::core::java::probe::tests::fake_java;
    use sha2::{Digest, Sha256};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const JAVA17_SCRIPT: &[u8] = b"#!/bin/sh\necho 'openjdk version \"17.0.12\" 2024-07-16' >&2\n";

    fn settings(base: &str) -> RuntimeSettings {
        RuntimeSettings {
            api_base_url: base.to_string(),
            min_free_disk_bytes: 0,
            scan_on_startup: false,
            ..RuntimeSettings::default()
        }
    }

    fn installer(root: &Path, settings: &RuntimeSettings) -> Installer {
        let store = RuntimeStore::new(root.to_path_buf(), settings);
        let downloader = Downloader::new(settings).unwrap();
        Installer::new(store, downloader, UsageGuard::new(), settings)
    }

    fn java17_archive() -> Vec<u8> {
        build_tar_gz(&[
            ("jdk-17.0.12+7-jre/bin/java", JAVA17_SCRIPT, 0o755),
            ("jdk-17.0.12+7-jre/release", b"JAVA_VERSION=\"17.0.12\"", 0o644),
        ])
    }

    async fn serve_java17(
        server: &mut mockito::ServerGuard,
        archive: &[u8],
        checksum: Option<&str>,
    ) -> Vec<mockito::Mock> {
        let binary = mockito::Matcher::Regex(r"^/v3/binary/latest/17/ga/".into());
        let mut mocks = vec![
            server
                .mock("HEAD", binary.clone())
                .with_status(200)
                .create_async()
                .await,
            server
                .mock("GET", binary)
                .with_status(200)
                .with_body(archive)
                .create_async()
                .await,
        ];
        let assets = server
            .mock("GET", mockito::Matcher::Regex(r"^/v3/assets/latest/17/hotspot".into()))
            .match_query(mockito::Matcher::Any);
        let assets = match checksum {
            Some(checksum) => assets.with_status(200).with_body(format!(
                r#"[{{"binary":{{"package":{{"checksum":"{checksum}"}}}}}}]"#
            )),
            None => assets.with_status(404),
        };
        mocks.push(assets.create_async().await);
        mocks
    }

    #[tokio::test]
    async fn installs_and_finds_same_path() {
        let mut server = mockito::Server::new_async().await;
        let archive = java17_archive();
        let digest = hex::encode(Sha256::digest(&archive));
        let _mocks = serve_java17(&mut server, &archive, Some(&digest)).await;

        let dir = TempDir::new().unwrap();
        let settings = settings(&server.url());
        let installer = installer(dir.path(), &settings);

        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&phases);
        let callbacks = InstallCallbacks {
            on_progress: None,
            on_status: Some(Arc::new(move |phase: &str| {
                sink.lock().unwrap().push(phase.to_string())
            })),
        };

        let target: TargetVersion = "1.18.2".parse().unwrap();
        let installed = installer.install(&target, &callbacks).await.unwrap();
        assert_eq!(installed, dir.path().join("java17/jdk-17.0.12+7-jre/bin/java"));
        assert_eq!(installer.store.find_existing(RuntimeTag::Java17), Some(installed.clone()));

        let report = check(&installed, &"1.20.4".parse().unwrap(), Duration::from_secs(5)).await;
        assert!(report.compatible && report.optimal);

        let phases = phases.lock().unwrap();
        assert!(phases.iter().any(|p| p == "verifying integrity"));
        assert_eq!(phases.last().map(String::as_str), Some("installed"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with(".staging") || name.starts_with(".backup"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn digest_mismatch_deletes_artifact() {
        let mut server = mockito::Server::new_async().await;
        let archive = java17_archive();
        let _mocks = serve_java17(&mut server, &archive, Some(&"0".repeat(64))).await;

        let dir = TempDir::new().unwrap();
        let installer = installer(dir.path(), &settings(&server.url()));
        let err = installer
            .install(&"1.19".parse().unwrap(), &InstallCallbacks::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::IntegrityFailure { .. }));
        let tag_dir = dir.path().join("java17");
        assert_eq!(std::fs::read_dir(&tag_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_checksum_follows_policy() {
        let mut server = mockito::Server::new_async().await;
        let archive = java17_archive();
        let _mocks = serve_java17(&mut server, &archive, None).await;
        let dir = TempDir::new().unwrap();
        let target: TargetVersion = "1.17.1".parse().unwrap();

        let strict = installer(dir.path(), &settings(&server.url()));
        let err = strict
            .install(&target, &InstallCallbacks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::ChecksumUnavailable { .. }));
        assert_eq!(std::fs::read_dir(dir.path().join("java17")).unwrap().count(), 0);

        let relaxed_settings = RuntimeSettings {
            require_integrity_verification: false,
            ..settings(&server.url())
        };
        let relaxed = installer(dir.path(), &relaxed_settings);
        let installed = relaxed
            .install(&target, &InstallCallbacks::default())
            .await
            .unwrap();
        assert!(installed.starts_with(dir.path().join("java17")));
    }

    #[tokio::test]
    async fn optimal_existing_runtime_short_circuits() {
        let server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let existing = fake_java(
            &dir.path().join("java21/jdk/bin"),
            "openjdk version \"21.0.4\"",
            0,
        );

        let installer = installer(dir.path(), &settings(&server.url()));
        let found = installer
            .install(&"1.21".parse().unwrap(), &InstallCallbacks::default())
            .await
            .unwrap();
        assert_eq!(found, existing);
    }

    #[tokio::test]
    async fn incompatible_archive_keeps_previous_install() {
        let mut server = mockito::Server::new_async().await;
        let archive = build_tar_gz(&[(
            "jdk/bin/java",
            b"#!/bin/sh\necho 'openjdk version \"11.0.2\"' >&2\n",
            0o755,
        )]);
        let digest = hex::encode(Sha256::digest(&archive));
        let _mocks = serve_java17(&mut server, &archive, Some(&digest)).await;

        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("java17/keep")).unwrap();
        std::fs::write(dir.path().join("java17/keep/marker"), b"x").unwrap();

        let installer = installer(dir.path(), &settings(&server.url()));
        let err = installer
            .install(&"1.18".parse().unwrap(), &InstallCallbacks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::Incompatible { .. }));
        assert!(dir.path().join("java17/keep/marker").exists());
    }
}
