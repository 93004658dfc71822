// ─── Archive Extraction ───
// zip (Windows builds) and tar.gz (macOS / Linux builds).

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

use super::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }

    /// Format implied by a URL's file suffix, ignoring any query string.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }

    /// Format implied by the file's magic bytes.
    pub fn sniff(path: &Path) -> Option<Self> {
        let mut header = [0_u8; 4];
        let mut file = File::open(path).ok()?;
        let read = file.read(&mut header).ok()?;
        if read >= 4 && header == [0x50, 0x4b, 0x03, 0x04] {
            Some(ArchiveFormat::Zip)
        } else if read >= 2 && header[..2] == [0x1f, 0x8b] {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }

    /// What Adoptium ships for `platform`.
    pub fn platform_default(platform: Platform) -> Self {
        match platform {
            Platform::Windows => ArchiveFormat::Zip,
            _ => ArchiveFormat::TarGz,
        }
    }

    /// Requested URL suffix, then redirected URL suffix, then content, then
    /// platform default.
    pub fn detect(url: &str, final_url: &str, archive: &Path, platform: Platform) -> Self {
        Self::from_url(url)
            .or_else(|| Self::from_url(final_url))
            .or_else(|| Self::sniff(archive))
            .unwrap_or_else(|| Self::platform_default(platform))
    }
}

/// Extract `archive` into `dest`, creating it if needed. Blocking.
pub fn extract_archive(archive: &Path, format: ArchiveFormat, dest: &Path) -> LauncherResult<()> {
    std::fs::create_dir_all(dest).map_err(|source| LauncherError::io(dest, source))?;
    debug!("Extracting {:?} ({:?}) into {:?}", archive, format, dest);
    match format {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest),
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> LauncherResult<()> {
    let file = File::open(archive).map_err(|source| LauncherError::io(archive, source))?;
    let mut zip = zip::ZipArchive::new(file)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let rel = sanitize_rel_path(Path::new(entry.name()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        let out_path = dest.join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|source| LauncherError::io(&out_path, source))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LauncherError::io(parent, source))?;
        }
        let mut out = File::create(&out_path).map_err(|source| LauncherError::io(&out_path, source))?;
        std::io::copy(&mut entry, &mut out).map_err(|source| LauncherError::io(&out_path, source))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|source| LauncherError::io(&out_path, source))?;
            }
        }
    }

    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> LauncherResult<()> {
    let file = File::open(archive).map_err(|source| LauncherError::io(archive, source))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let entries = tar
        .entries()
        .map_err(|source| LauncherError::io(archive, source))?;

    for entry in entries {
        let mut entry = entry.map_err(|source| LauncherError::io(archive, source))?;
        let entry_path = entry
            .path()
            .map_err(|source| LauncherError::io(archive, source))?
            .to_path_buf();
        let rel = sanitize_rel_path(&entry_path)?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        let link_target = entry
            .link_name()
            .map_err(|source| LauncherError::io(archive, source))?
            .map(|target| target.to_path_buf());
        if let Some(target) = link_target {
            let inside = match entry.header().entry_type() {
                tar::EntryType::Symlink => symlink_stays_inside(&rel, &target),
                _ => sanitize_rel_path(&target).is_ok(),
            };
            if !inside {
                return Err(LauncherError::UnsafeArchiveEntry(entry_path));
            }
        }

        // `unpack_in` refuses to write through a symlink that leaves `dest`.
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|source| LauncherError::io(dest.join(&rel), source))?;
        if !unpacked {
            return Err(LauncherError::UnsafeArchiveEntry(entry_path));
        }
    }

    Ok(())
}

/// Reject absolute paths and `..` so an archive cannot write outside `dest`.
fn sanitize_rel_path(path: &Path) -> LauncherResult<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                return Err(LauncherError::UnsafeArchiveEntry(path.to_path_buf()))
            }
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
        }
    }
    Ok(out)
}

/// Whether a symlink at `entry` (relative to the extraction root) pointing
/// at `target` resolves to somewhere inside the root.
fn symlink_stays_inside(entry: &Path, target: &Path) -> bool {
    let mut depth = entry
        .parent()
        .map(|parent| parent.components().count())
        .unwrap_or(0);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::Prefix(_) | Component::RootDir => return false,
        }
    }
    true
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Build a tar.gz holding `files` (`(relative path, contents, mode)`).
    pub(crate) fn build_tar_gz(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, data, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            for (path, data) in files {
                writer
                    .start_file(*path, zip::write::SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn format_from_url_suffix() {
        assert_eq!(ArchiveFormat::from_url("https://x/jre.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_url("https://x/jre.tar.gz?x=1"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_url("https://x/jre.tgz"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_url("https://api/v3/binary/latest/17/ga"), None);
    }

    #[test]
    fn format_sniffed_from_content() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("a");
        std::fs::write(&zip_path, build_zip(&[("f", b"x")])).unwrap();
        let tgz_path = dir.path().join("b");
        std::fs::write(&tgz_path, build_tar_gz(&[("f", b"x", 0o644)])).unwrap();

        assert_eq!(ArchiveFormat::sniff(&zip_path), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::sniff(&tgz_path), Some(ArchiveFormat::TarGz));
        assert_eq!(
            ArchiveFormat::detect("https://api/latest", "https://cdn/latest", &tgz_path, Platform::Windows),
            ArchiveFormat::TarGz
        );
    }

    #[test]
    fn extracts_tar_gz_tree() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("jre.tar.gz");
        std::fs::write(
            &archive,
            build_tar_gz(&[
                ("jdk-17.0.12+7-jre/bin/java", b"#!/bin/sh\n", 0o755),
                ("jdk-17.0.12+7-jre/release", b"JAVA_VERSION=\"17.0.12\"", 0o644),
            ]),
        )
        .unwrap();

        let out = dir.path().join("out");
        extract_archive(&archive, ArchiveFormat::TarGz, &out).unwrap();
        assert!(out.join("jdk-17.0.12+7-jre/bin/java").is_file());
        assert!(out.join("jdk-17.0.12+7-jre/release").is_file());
    }

    #[test]
    fn extracts_zip_tree() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("jre.zip");
        std::fs::write(&archive, build_zip(&[("jdk8u412-b08-jre/bin/java.exe", b"MZ")])).unwrap();

        let out = dir.path().join("out");
        extract_archive(&archive, ArchiveFormat::Zip, &out).unwrap();
        assert_eq!(std::fs::read(out.join("jdk8u412-b08-jre/bin/java.exe")).unwrap(), b"MZ");
    }

    /// Tar.gz with a symlink `link -> target` followed by `files`.
    #[cfg(unix)]
    fn build_tar_gz_with_symlink(link: &str, target: &Path, files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, link, target).unwrap();

        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_dest_is_rejected() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        let out = dir.path().join("out");

        let absolute = dir.path().join("abs.tar.gz");
        std::fs::write(
            &absolute,
            build_tar_gz_with_symlink("jre/escape", &outside, &[("jre/escape/pwned", b"x")]),
        )
        .unwrap();
        let err = extract_archive(&absolute, ArchiveFormat::TarGz, &out).unwrap_err();
        assert!(matches!(err, LauncherError::UnsafeArchiveEntry(_)));

        let relative = dir.path().join("rel.tar.gz");
        std::fs::write(
            &relative,
            build_tar_gz_with_symlink(
                "jre/escape",
                Path::new("../../outside"),
                &[("jre/escape/pwned", b"x")],
            ),
        )
        .unwrap();
        let err = extract_archive(&relative, ArchiveFormat::TarGz, &out).unwrap_err();
        assert!(matches!(err, LauncherError::UnsafeArchiveEntry(_)));

        assert!(!outside.join("pwned").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_dest_is_kept() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("jre.tar.gz");
        std::fs::write(
            &archive,
            build_tar_gz_with_symlink(
                "jre/Contents/MacOS/libjli.dylib",
                Path::new("../Home/lib/libjli.dylib"),
                &[("jre/Contents/Home/lib/libjli.dylib", b"lib")],
            ),
        )
        .unwrap();

        let out = dir.path().join("out");
        extract_archive(&archive, ArchiveFormat::TarGz, &out).unwrap();
        let link = out.join("jre/Contents/MacOS/libjli.dylib");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read(&link).unwrap(), b"lib");
    }

    #[test]
    fn rejects_parent_traversal() {
        assert!(matches!(
            sanitize_rel_path(Path::new("../evil")),
            Err(LauncherError::UnsafeArchiveEntry(_))
        ));
        assert!(sanitize_rel_path(Path::new("/etc/passwd")).is_err());
        assert!(!symlink_stays_inside(Path::new("jre/bin/java"), Path::new("../../../etc")));
        assert!(symlink_stays_inside(Path::new("jre/bin/java"), Path::new("../lib/java")));
        assert_eq!(
            sanitize_rel_path(Path::new("./a/b")).unwrap(),
            PathBuf::from("a/b")
        );
    }
}
