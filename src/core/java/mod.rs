// ─── Java Runtime Management ───
// Version → runtime mapping, compatibility checks and the managed cache at
// `<data dir>/runtime/<tag>/`.

pub mod cleaner;
pub mod compat;
pub mod download;
pub mod extract;
pub mod guard;
pub mod install;
pub mod locate;
pub mod manager;
pub mod platform;
pub mod probe;
pub mod store;
pub mod version;

pub use compat::{check, CompatibilityReport, Incompatibility};
pub use guard::{GameSession, SessionId, UsageGuard};
pub use install::{InstallCallbacks, StatusCallback};
pub use download::ProgressCallback;
pub use manager::{GameStatus, RuntimeManager};
pub use store::{InstallStatus, InstallationRecord};
pub use version::{required_tag, RuntimeTag, TargetVersion};
