// ─── Runtime Downloader ───
// Resolves where a runtime archive comes from and streams it to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::core::config::RuntimeSettings;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;

use super::platform::{Arch, Platform};
use super::version::RuntimeTag;

/// `(percent, bytes_so_far, total_bytes)`, invoked per received chunk when the
/// server announces a length.
pub type ProgressCallback = Arc<dyn Fn(u8, u64, u64) + Send + Sync>;

/// Where to fetch a runtime archive from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadDescriptor {
    pub url: String,
    pub expected_hash: Option<String>,
    /// Resolved through the release API; the hash has to be looked up separately.
    pub dynamic: bool,
}

/// Result of a finished download.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    /// URL after redirects; carries the real archive name for dynamic links.
    pub final_url: String,
}

struct StaticRuntime {
    tag: RuntimeTag,
    platform: Platform,
    arch: Arch,
    url: &'static str,
    sha256: Option<&'static str>,
}

/// Pinned Temurin JRE builds used when the release API is unreachable.
const STATIC_RUNTIMES: &[StaticRuntime] = &[
    StaticRuntime {
        tag: RuntimeTag::Java8,
        platform: Platform::Windows,
        arch: Arch::X64,
        url: "https://github.com/adoptium/temurin8-binaries/releases/download/jdk8u412-b08/OpenJDK8U-jre_x64_windows_hotspot_8u412b08.zip",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java8,
        platform: Platform::Mac,
        arch: Arch::X64,
        url: "https://github.com/adoptium/temurin8-binaries/releases/download/jdk8u412-b08/OpenJDK8U-jre_x64_mac_hotspot_8u412b08.tar.gz",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java8,
        platform: Platform::Mac,
        arch: Arch::Arm64,
        url: "https://github.com/adoptium/temurin8-binaries/releases/download/jdk8u412-b08/OpenJDK8U-jre_aarch64_mac_hotspot_8u412b08.tar.gz",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java8,
        platform: Platform::Linux,
        arch: Arch::X64,
        url: "https://github.com/adoptium/temurin8-binaries/releases/download/jdk8u412-b08/OpenJDK8U-jre_x64_linux_hotspot_8u412b08.tar.gz",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java17,
        platform: Platform::Windows,
        arch: Arch::X64,
        url: "https://github.com/adoptium/temurin17-binaries/releases/download/jdk-17.0.12%2B7/OpenJDK17U-jre_x64_windows_hotspot_17.0.12_7.zip",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java17,
        platform: Platform::Mac,
        arch: Arch::X64,
        url: "https://github.com/adoptium/temurin17-binaries/releases/download/jdk-17.0.12%2B7/OpenJDK17U-jre_x64_mac_hotspot_17.0.12_7.tar.gz",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java17,
        platform: Platform::Mac,
        arch: Arch::Arm64,
        url: "https://github.com/adoptium/temurin17-binaries/releases/download/jdk-17.0.12%2B7/OpenJDK17U-jre_aarch64_mac_hotspot_17.0.12_7.tar.gz",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java17,
        platform: Platform::Linux,
        arch: Arch::X64,
        url: "https://github.com/adoptium/temurin17-binaries/releases/download/jdk-17.0.12%2B7/OpenJDK17U-jre_x64_linux_hotspot_17.0.12_7.tar.gz",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java21,
        platform: Platform::Windows,
        arch: Arch::X64,
        url: "https://github.com/adoptium/temurin21-binaries/releases/download/jdk-21.0.4%2B7/OpenJDK21U-jre_x64_windows_hotspot_21.0.4_7.zip",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java21,
        platform: Platform::Mac,
        arch: Arch::X64,
        url: "https://github.com/adoptium/temurin21-binaries/releases/download/jdk-21.0.4%2B7/OpenJDK21U-jre_x64_mac_hotspot_21.0.4_7.tar.gz",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java21,
        platform: Platform::Mac,
        arch: Arch::Arm64,
        url: "https://github.com/adoptium/temurin21-binaries/releases/download/jdk-21.0.4%2B7/OpenJDK21U-jre_aarch64_mac_hotspot_21.0.4_7.tar.gz",
        sha256: None,
    },
    StaticRuntime {
        tag: RuntimeTag::Java21,
        platform: Platform::Linux,
        arch: Arch::X64,
        url: "https://github.com/adoptium/temurin21-binaries/releases/download/jdk-21.0.4%2B7/OpenJDK21U-jre_x64_linux_hotspot_21.0.4_7.tar.gz",
        sha256: None,
    },
];

#[derive(Debug, Clone, Deserialize)]
struct AdoptiumRelease {
    binary: AdoptiumBinary,
}

#[derive(Debug, Clone, Deserialize)]
struct AdoptiumBinary {
    package: AdoptiumPackage,
}

#[derive(Debug, Clone, Deserialize)]
struct AdoptiumPackage {
    checksum: String,
}

/// Release lookups and artifact streaming against the Adoptium API.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    api_base_url: String,
}

impl Downloader {
    pub fn new(settings: &RuntimeSettings) -> LauncherResult<Self> {
        let client = build_http_client(settings.http_timeout())?;
        Ok(Self {
            client,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Dynamic "latest release" link when the API confirms it exists, else the
    /// pinned static table.
    #[instrument(skip(self))]
    pub async fn resolve_descriptor(
        &self,
        tag: RuntimeTag,
        platform: Platform,
        arch: Arch,
    ) -> LauncherResult<DownloadDescriptor> {
        let dynamic_url = self.latest_binary_url(tag, platform, arch);
        match self.client.head(&dynamic_url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Dynamic runtime link available: {}", dynamic_url);
                return Ok(DownloadDescriptor {
                    url: dynamic_url,
                    expected_hash: None,
                    dynamic: true,
                });
            }
            Ok(response) => warn!(
                "Release API answered HTTP {} for {}, using static table",
                response.status().as_u16(),
                dynamic_url
            ),
            Err(e) => warn!("Release API unreachable ({}), using static table", e),
        }

        static_descriptor(tag, platform, arch).ok_or_else(|| LauncherError::NoDownload {
            tag: tag.to_string(),
            platform: platform.to_string(),
            arch: arch.to_string(),
            supported: supported_matrix(),
        })
    }

    /// Stream `url` into `dest`. On any failure the partial file is removed
    /// before the error is returned.
    #[instrument(skip(self, on_progress))]
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: Option<&ProgressCallback>,
    ) -> LauncherResult<DownloadOutcome> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LauncherError::io(parent, source))?;
        }

        match self.stream_to_file(url, dest, on_progress).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(dest).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {:?}: {}", dest, rm);
                    }
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        on_progress: Option<&ProgressCallback>,
    ) -> LauncherResult<DownloadOutcome> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let total = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|source| LauncherError::io(dest, source))?;

        let mut stream = response.bytes_stream();
        let mut downloaded = 0_u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|source| LauncherError::io(dest, source))?;
            downloaded = downloaded.saturating_add(chunk.len() as u64);

            if total > 0 {
                if let Some(callback) = on_progress {
                    let percent = (downloaded.saturating_mul(100) / total).min(100) as u8;
                    callback(percent, downloaded, total);
                }
            }
        }

        file.flush()
            .await
            .map_err(|source| LauncherError::io(dest, source))?;
        drop(file);

        info!("Downloaded {} bytes from {} to {:?}", downloaded, url, dest);
        Ok(DownloadOutcome {
            path: dest.to_path_buf(),
            bytes: downloaded,
            final_url,
        })
    }

    /// SHA-256 of the latest release package, or `None` when the metadata
    /// endpoint cannot provide one.
    #[instrument(skip(self))]
    pub async fn resolve_checksum(
        &self,
        tag: RuntimeTag,
        platform: Platform,
        arch: Arch,
    ) -> Option<String> {
        let url = format!(
            "{}/v3/assets/latest/{}/hotspot?architecture={}&image_type=jre&os={}",
            self.api_base_url,
            tag.major(),
            arch.api_key(),
            platform.api_key()
        );

        let response = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("Checksum lookup returned HTTP {}", response.status().as_u16());
                return None;
            }
            Err(e) => {
                warn!("Checksum lookup failed: {}", e);
                return None;
            }
        };

        match response.json::<Vec<AdoptiumRelease>>().await {
            Ok(releases) => releases
                .into_iter()
                .map(|release| release.binary.package.checksum)
                .find(|checksum| !checksum.trim().is_empty()),
            Err(e) => {
                warn!("Checksum metadata could not be parsed: {}", e);
                None
            }
        }
    }

    fn latest_binary_url(&self, tag: RuntimeTag, platform: Platform, arch: Arch) -> String {
        format!(
            "{}/v3/binary/latest/{}/ga/{}/{}/jre/hotspot/normal/eclipse",
            self.api_base_url,
            tag.major(),
            platform.api_key(),
            arch.api_key()
        )
    }
}

/// Static fallback for `(tag, platform, arch)`; a missing architecture falls
/// back to the platform's x64 build.
pub fn static_descriptor(tag: RuntimeTag, platform: Platform, arch: Arch) -> Option<DownloadDescriptor> {
    let lookup = |wanted: Arch| {
        STATIC_RUNTIMES
            .iter()
            .find(|rt| rt.tag == tag && rt.platform == platform && rt.arch == wanted)
    };
    let entry = lookup(arch).or_else(|| lookup(Arch::X64))?;
    Some(DownloadDescriptor {
        url: entry.url.to_string(),
        expected_hash: entry.sha256.map(str::to_string),
        dynamic: false,
    })
}

/// Human-readable list of every statically supported combination.
pub fn supported_matrix() -> String {
    STATIC_RUNTIMES
        .iter()
        .map(|rt| format!("{} {}-{}", rt.tag, rt.platform, rt.arch))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lower-case hex SHA-256 of a file, hashed in chunks off the async runtime.
pub async fn sha256_file(path: &Path) -> LauncherResult<String> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> LauncherResult<String> {
        use std::io::Read;
        let mut file = std::fs::File::open(&owned).map_err(|source| LauncherError::io(&owned, source))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0_u8; 64 * 1024];
        loop {
            let read = file
                .read(&mut buf)
                .map_err(|source| LauncherError::io(&owned, source))?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}

/// Compare the digest of `path` with `expected` (case-insensitive hex).
pub async fn verify_sha256(path: &Path, expected: &str) -> LauncherResult<()> {
    let actual = sha256_file(path).await?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(LauncherError::IntegrityFailure {
            path: path.to_path_buf(),
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn downloader(base: &str) -> Downloader {
        let settings = RuntimeSettings {
            api_base_url: base.to_string(),
            http_timeout_secs: 10,
            ..RuntimeSettings::default()
        };
        Downloader::new(&settings).unwrap()
    }

    #[test]
    fn static_table_falls_back_to_x64() {
        let d = static_descriptor(RuntimeTag::Java17, Platform::Linux, Arch::Arm64).unwrap();
        assert!(d.url.contains("x64_linux"));
        assert!(!d.dynamic);

        let d = static_descriptor(RuntimeTag::Java21, Platform::Mac, Arch::Arm64).unwrap();
        assert!(d.url.contains("aarch64_mac"));
    }

    #[test]
    fn supported_matrix_lists_every_tag() {
        let matrix = supported_matrix();
        for tag in RuntimeTag::ALL {
            assert!(matrix.contains(tag.dir_name()));
        }
    }

    #[tokio::test]
    async fn dynamic_descriptor_when_api_confirms() {
        let mut server = mockito::Server::new_async().await;
        let _head = server
            .mock("HEAD", "/v3/binary/latest/17/ga/linux/x64/jre/hotspot/normal/eclipse")
            .with_status(200)
            .create_async()
            .await;

        let d = downloader(&server.url())
            .resolve_descriptor(RuntimeTag::Java17, Platform::Linux, Arch::X64)
            .await
            .unwrap();
        assert!(d.dynamic);
        assert!(d.expected_hash.is_none());
        assert!(d.url.starts_with(&server.url()));
    }

    #[tokio::test]
    async fn static_descriptor_when_api_fails() {
        let mut server = mockito::Server::new_async().await;
        let _head = server
            .mock("HEAD", "/v3/binary/latest/8/ga/windows/x64/jre/hotspot/normal/eclipse")
            .with_status(503)
            .create_async()
            .await;

        let d = downloader(&server.url())
            .resolve_descriptor(RuntimeTag::Java8, Platform::Windows, Arch::X64)
            .await
            .unwrap();
        assert!(!d.dynamic);
        assert!(d.url.ends_with(".zip"));
    }

    #[tokio::test]
    async fn download_reports_progress() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![7_u8; 4096];
        let _get = server
            .mock("GET", "/artifact.zip")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("artifact.zip");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |pct, so_far, total| {
            sink.lock().unwrap().push((pct, so_far, total));
        });

        let outcome = downloader(&server.url())
            .download(&format!("{}/artifact.zip", server.url()), &dest, Some(&callback))
            .await
            .unwrap();

        assert_eq!(outcome.bytes, 4096);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        let seen = seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(*last, (100, 4096, 4096));
    }

    #[tokio::test]
    async fn failed_download_leaves_no_file() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/missing.tar.gz")
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing.tar.gz");
        let err = downloader(&server.url())
            .download(&format!("{}/missing.tar.gz", server.url()), &dest, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::DownloadFailed { status: 404, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn checksum_comes_from_release_metadata() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", mockito::Matcher::Regex(r"^/v3/assets/latest/21/hotspot".into()))
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"binary":{"package":{"checksum":"abc123","link":"x"}}}]"#)
            .create_async()
            .await;

        let checksum = downloader(&server.url())
            .resolve_checksum(RuntimeTag::Java21, Platform::Linux, Arch::X64)
            .await;
        assert_eq!(checksum.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn verify_sha256_detects_mismatch() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("blob");
        std::fs::write(&file, b"hello").unwrap();

        let good = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        verify_sha256(&file, &good.to_uppercase()).await.unwrap();
        let err = verify_sha256(&file, "deadbeef").await.unwrap_err();
        assert!(matches!(err, LauncherError::IntegrityFailure { .. }));
    }
}
