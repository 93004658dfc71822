// ─── Usage Guard ───
// Remembers which runtimes drive running games so cleanup never deletes them.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A running game and the runtime it was started with.
#[derive(Debug, Clone, Serialize)]
pub struct GameSession {
    pub id: SessionId,
    pub runtime_path: PathBuf,
    pub label: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Active sessions keyed by id. Cloning shares the same set.
#[derive(Debug, Clone, Default)]
pub struct UsageGuard {
    sessions: Arc<Mutex<HashMap<SessionId, GameSession>>>,
}

impl UsageGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a game now runs on `runtime_path`.
    pub fn mark_in_use(&self, runtime_path: &Path, label: Option<&str>) -> SessionId {
        let id = SessionId(Uuid::new_v4());
        let session = GameSession {
            id,
            runtime_path: normalize(runtime_path),
            label: label.map(str::to_string),
            started_at: Utc::now(),
        };
        info!(
            "Runtime {:?} in use by session {} ({})",
            session.runtime_path,
            id,
            session.label.as_deref().unwrap_or("unnamed")
        );
        self.lock().insert(id, session);
        id
    }

    /// End one session. Returns whether it was active.
    pub fn release(&self, id: SessionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        debug!("Session {} released: {}", id, removed);
        removed
    }

    /// End every session.
    pub fn mark_free(&self) {
        self.lock().clear();
    }

    /// True when `path` is the in-use runtime path, lies inside it, or is a
    /// directory that contains it.
    pub fn is_in_use(&self, path: &Path) -> bool {
        let candidate = normalize(path);
        self.lock().values().any(|session| {
            session.runtime_path.starts_with(&candidate)
                || candidate.starts_with(&session.runtime_path)
        })
    }

    pub fn sessions(&self) -> Vec<GameSession> {
        let mut sessions: Vec<_> = self.lock().values().cloned().collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, GameSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn guards_executable_and_its_directories() {
        let dir = TempDir::new().unwrap();
        let install = dir.path().join("java17");
        let exe = install.join("jdk/bin/java");
        std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
        std::fs::write(&exe, b"").unwrap();

        let guard = UsageGuard::new();
        assert!(!guard.is_in_use(&install));

        let id = guard.mark_in_use(&exe, Some("survival"));
        assert!(guard.is_in_use(&exe));
        assert!(guard.is_in_use(&install));
        assert!(!guard.is_in_use(&dir.path().join("java8")));

        assert!(guard.release(id));
        assert!(!guard.is_in_use(&install));
    }

    #[test]
    fn sibling_with_common_prefix_is_not_guarded() {
        let guard = UsageGuard::new();
        guard.mark_in_use(Path::new("/cache/runtime/java1/bin/java"), None);
        assert!(!guard.is_in_use(Path::new("/cache/runtime/java17")));
    }

    #[test]
    fn mark_free_clears_all_sessions() {
        let guard = UsageGuard::new();
        guard.mark_in_use(Path::new("/a/java"), Some("one"));
        guard.mark_in_use(Path::new("/b/java"), Some("two"));
        assert_eq!(guard.sessions().len(), 2);

        guard.mark_free();
        assert!(guard.sessions().is_empty());
        assert!(!guard.is_in_use(Path::new("/a/java")));
    }
}
