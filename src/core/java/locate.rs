use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Find the Java executable anywhere below `root`, at most `max_depth`
/// directories deep. A match directly inside a `bin` directory wins over
/// any other; ties go to the first match in name order. The winner is
/// marked executable.
pub fn find_java_executable(root: &Path, exe_name: &str, max_depth: usize) -> Option<PathBuf> {
    let mut matches = Vec::new();
    collect_matches(root, exe_name, max_depth, &mut matches);

    let chosen = matches
        .iter()
        .find(|path| {
            path.parent()
                .and_then(|parent| parent.file_name())
                .map(|name| name == "bin")
                .unwrap_or(false)
        })
        .or_else(|| matches.first())
        .cloned()?;

    make_executable(&chosen);
    debug!("Located Java executable {:?} under {:?}", chosen, root);
    Some(chosen)
}

fn collect_matches(dir: &Path, exe_name: &str, depth_left: usize, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if depth_left > 0 {
                collect_matches(&path, exe_name, depth_left - 1, out);
            }
        } else if entry.file_name() == exe_name && path.is_file() {
            out.push(path);
        }
    }
}

/// Best-effort `chmod 755`; archives do not always carry the exec bit.
pub fn make_executable(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let result = std::fs::metadata(path).and_then(|meta| {
            let mut perms = meta.permissions();
            if perms.mode() & 0o111 == 0o111 {
                return Ok(());
            }
            perms.set_mode(0o755);
            std::fs::set_permissions(path, perms)
        });
        if let Err(e) = result {
            warn!("Could not mark {:?} executable: {}", path, e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
