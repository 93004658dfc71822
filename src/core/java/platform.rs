use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Mac,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Platform::Windows,
            "macos" => Platform::Mac,
            _ => Platform::Linux,
        }
    }

    /// `os` value understood by the Adoptium API.
    pub fn api_key(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Linux => "linux",
        }
    }

    pub fn java_exe(self) -> &'static str {
        match self {
            Platform::Windows => "java.exe",
            _ => "java",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X64,
    Arm64,
}

impl Arch {
    /// Unknown architectures are treated as x64, which is what every
    /// distribution table entry exists for.
    pub fn current() -> Self {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    pub fn from_rust_arch(arch: &str) -> Self {
        match arch {
            "aarch64" | "arm64" => Arch::Arm64,
            _ => Arch::X64,
        }
    }

    /// `architecture` value understood by the Adoptium API.
    pub fn api_key(self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "aarch64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::X64 => f.write_str("x64"),
            Arch::Arm64 => f.write_str("arm64"),
        }
    }
}
