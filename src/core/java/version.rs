// ─── Version Resolution ───
// Maps a game version to the Java runtime bucket it needs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::LauncherError;

/// A bucket of interchangeable Java distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeTag {
    Java8,
    Java17,
    Java21,
}

impl RuntimeTag {
    pub const ALL: [RuntimeTag; 3] = [RuntimeTag::Java8, RuntimeTag::Java17, RuntimeTag::Java21];

    /// Java feature release this bucket is built around.
    pub fn major(self) -> u32 {
        match self {
            RuntimeTag::Java8 => 8,
            RuntimeTag::Java17 => 17,
            RuntimeTag::Java21 => 21,
        }
    }

    /// Name of the tag's install directory inside the cache root.
    pub fn dir_name(self) -> &'static str {
        match self {
            RuntimeTag::Java8 => "java8",
            RuntimeTag::Java17 => "java17",
            RuntimeTag::Java21 => "java21",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.dir_name() == name)
    }
}

impl fmt::Display for RuntimeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A dotted game version such as `1.20.4`.
///
/// Ordering is numeric per component, so `1.9 < 1.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl TargetVersion {
    /// The `(major, minor)` release line, e.g. `1.20.4` → `1.20`.
    pub fn release(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

impl FromStr for TargetVersion {
    type Err = LauncherError;

    /// Accepts `1`, `1.20`, `1.20.4` and tolerates pre-release suffixes on the
    /// last numeric component (`1.21-pre1`, `1.20.5-rc1`).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || LauncherError::InvalidVersion(raw.to_string());
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut parts = trimmed.split('.');
        let major = parts.next().and_then(leading_number).ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(part) => leading_number(part).ok_or_else(invalid)?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(part) => Some(leading_number(part).ok_or_else(invalid)?),
            None => None,
        };

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let digits: &str = &part[..part
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(part.len())];
    digits.parse().ok()
}

/// Release lines with a known runtime requirement.
const COMPATIBILITY_TABLE: &[((u32, u32), RuntimeTag)] = &[
    ((1, 7), RuntimeTag::Java8),
    ((1, 8), RuntimeTag::Java8),
    ((1, 9), RuntimeTag::Java8),
    ((1, 10), RuntimeTag::Java8),
    ((1, 11), RuntimeTag::Java8),
    ((1, 12), RuntimeTag::Java8),
    ((1, 13), RuntimeTag::Java8),
    ((1, 14), RuntimeTag::Java8),
    ((1, 15), RuntimeTag::Java8),
    ((1, 16), RuntimeTag::Java8),
    ((1, 17), RuntimeTag::Java17),
    ((1, 18), RuntimeTag::Java17),
    ((1, 19), RuntimeTag::Java17),
    ((1, 20), RuntimeTag::Java17),
    ((1, 21), RuntimeTag::Java21),
    ((1, 22), RuntimeTag::Java21),
    ((1, 23), RuntimeTag::Java21),
];

const JAVA21_FROM: (u32, u32) = (1, 21);
const JAVA17_FROM: (u32, u32) = (1, 17);

/// Runtime bucket required by `target`.
///
/// Exact table hit first; otherwise threshold comparison so that versions
/// newer than the table still resolve.
pub fn required_tag(target: &TargetVersion) -> RuntimeTag {
    let release = target.release();
    if let Some((_, tag)) = COMPATIBILITY_TABLE.iter().find(|(key, _)| *key == release) {
        return *tag;
    }

    if release >= JAVA21_FROM {
        RuntimeTag::Java21
    } else if release >= JAVA17_FROM {
        RuntimeTag::Java17
    } else {
        RuntimeTag::Java8
    }
}

/// String convenience over [`required_tag`].
pub fn required_tag_for(raw: &str) -> Result<RuntimeTag, LauncherError> {
    Ok(required_tag(&raw.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(v: &str) -> RuntimeTag {
        required_tag_for(v).unwrap()
    }

    #[test]
    fn legacy_versions_need_java8() {
        for v in ["1.8", "1.12", "1.16.5", "1.7.10"] {
            assert_eq!(tag(v), RuntimeTag::Java8, "{v}");
        }
    }

    #[test]
    fn modern_versions_need_java17() {
        for v in ["1.17", "1.19", "1.20.6", "1.18.2"] {
            assert_eq!(tag(v), RuntimeTag::Java17, "{v}");
        }
    }

    #[test]
    fn current_versions_need_java21() {
        for v in ["1.21", "1.22", "1.21.4"] {
            assert_eq!(tag(v), RuntimeTag::Java21, "{v}");
        }
    }

    #[test]
    fn unlisted_versions_use_thresholds() {
        assert_eq!(tag("1.30"), RuntimeTag::Java21);
        assert_eq!(tag("2"), RuntimeTag::Java21);
        assert_eq!(tag("1.5.2"), RuntimeTag::Java8);
    }

    #[test]
    fn ordering_is_numeric_not_lexical() {
        let nine: TargetVersion = "1.9".parse().unwrap();
        let ten: TargetVersion = "1.10".parse().unwrap();
        assert!(nine < ten);
    }

    #[test]
    fn parses_prerelease_suffix() {
        let v: TargetVersion = "1.21-pre1".parse().unwrap();
        assert_eq!(v.release(), (1, 21));
        let v: TargetVersion = "1.20.5-rc1".parse().unwrap();
        assert_eq!(v.patch, Some(5));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<TargetVersion>().is_err());
        assert!("latest".parse::<TargetVersion>().is_err());
        assert!("1.x".parse::<TargetVersion>().is_err());
    }

    #[test]
    fn tag_dir_names_round_trip() {
        for tag in RuntimeTag::ALL {
            assert_eq!(RuntimeTag::from_dir_name(tag.dir_name()), Some(tag));
        }
        assert_eq!(RuntimeTag::from_dir_name("java11"), None);
    }
}
