//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, built {})", self.version, self.git_hash, self.build_time)
    }
}

/// Generate an opaque correlation token for one scheduling run
pub fn generate_deployment_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Short prefix of a deployment id, used in file names
pub fn short_id(deployment_id: &str) -> &str {
    let end = deployment_id
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(deployment_id.len());
    &deployment_id[..end]
}

/// Replace characters that are awkward in file names
pub fn file_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
