pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::config::{RuntimePaths, RuntimeSettings};
pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::java::{
    CompatibilityReport, GameStatus, InstallCallbacks, InstallStatus, InstallationRecord,
    RuntimeManager, RuntimeTag, SessionId, TargetVersion,
};

/// Install the structured logging subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init_logging() {
    let initialized = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,launcher_runtime=debug")),
        )
        .try_init()
        .is_ok();

    if initialized {
        tracing::info!("Launcher runtime backend starting...");
    }
}
