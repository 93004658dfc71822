// ─── Runtime Core ───
// Java runtime acquisition backend for the launcher.
//
// Architecture:
//   core/
//     config      — Settings file + cache directory layout
//     error       — Central error type
//     http        — Shared HTTP client
//     java/       — Version rules, probing, download, install, cache upkeep

pub mod config;
pub mod error;
pub mod http;
pub mod java;
