// ─── Compatibility Checker ───
// Validates a Java binary against a game version. Results are values, not
// errors, so callers can render guidance for each kind of mismatch.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::probe::{probe_java, JavaVersion};
use super::version::{required_tag, RuntimeTag, TargetVersion};

/// Newest release line that still needs the legacy classloader.
const LEGACY_LAST: (u32, u32) = (1, 16);
/// 1.17 shipped alongside Java 17 and still runs on 21; the window starts after it.
const STABILITY_FIRST: (u32, u32) = (1, 18);
const STABILITY_LAST: (u32, u32) = (1, 20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Incompatibility {
    /// The binary could not be run or did not report a version.
    ProbeFailed,
    /// Older than the required runtime.
    BelowMinimum,
    /// Java 17+ breaks the classloader assumptions of 1.16 and older.
    LegacyClassloader,
    /// Java 21+ is known to destabilize 1.18–1.20.
    ModernStability,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityReport {
    pub compatible: bool,
    /// Probed major equals the required major exactly.
    pub optimal: bool,
    pub required: RuntimeTag,
    pub probed: Option<JavaVersion>,
    pub incompatibility: Option<Incompatibility>,
    pub recommended_tag: Option<RuntimeTag>,
    /// Why the runtime was rejected, or a note about a sufficient-but-not-optimal match.
    pub message: String,
}

/// Probe `path` and judge it against `target`.
pub async fn check(path: &Path, target: &TargetVersion, timeout: Duration) -> CompatibilityReport {
    match probe_java(path, timeout).await {
        Ok(probed) => evaluate(probed, target),
        Err(e) => {
            debug!("Compatibility probe failed for {:?}: {}", path, e);
            CompatibilityReport {
                compatible: false,
                optimal: false,
                required: required_tag(target),
                probed: None,
                incompatibility: Some(Incompatibility::ProbeFailed),
                recommended_tag: None,
                message: e.to_string(),
            }
        }
    }
}

/// Pure judgement of an already-probed version.
pub fn evaluate(probed: JavaVersion, target: &TargetVersion) -> CompatibilityReport {
    let required = required_tag(target);
    let release = target.release();
    let major = probed.major;

    let reject = |kind, recommended, message| CompatibilityReport {
        compatible: false,
        optimal: false,
        required,
        probed: Some(probed.clone()),
        incompatibility: Some(kind),
        recommended_tag: recommended,
        message,
    };

    if major < required.major() {
        return reject(
            Incompatibility::BelowMinimum,
            Some(required),
            format!(
                "Java {}+ is required for Minecraft {target}; found Java {major}",
                required.major()
            ),
        );
    }

    if release <= LEGACY_LAST && major >= 17 {
        return reject(
            Incompatibility::LegacyClassloader,
            Some(RuntimeTag::Java8),
            format!(
                "Minecraft {target} does not run on Java {major}: versions up to 1.16 \
                 rely on the pre-Java-9 classloader and need Java 8"
            ),
        );
    }

    if (STABILITY_FIRST..=STABILITY_LAST).contains(&release) && major >= 21 {
        return reject(
            Incompatibility::ModernStability,
            Some(RuntimeTag::Java17),
            format!(
                "Minecraft {target} is unstable on Java {major}; Java 17 is recommended"
            ),
        );
    }

    let optimal = major == required.major();
    let message = if optimal {
        format!("Java {major} is the optimal runtime for Minecraft {target}")
    } else {
        format!(
            "Java {major} runs Minecraft {target}, but Java {} would be optimal",
            required.major()
        )
    };

    CompatibilityReport {
        compatible: true,
        optimal,
        required,
        probed: Some(probed),
        incompatibility: None,
        recommended_tag: None,
        message,
    }
}
