//! Version information for toldyou
//!
//! This module provides the crate version and the proof format version.

/// Crate version (semver format)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Proof format version (incremented on wire format changes)
pub const FORMAT_VERSION: u8 = 1;

/// Git commit hash (if available)
pub const GIT_HASH: Option<&str> = option_env!("GIT_HASH");

/// Full version string with metadata
pub fn version_string() -> String {
    let mut version = format!("toldyou v{}", VERSION);

    if let Some(hash) = GIT_HASH {
        version.push_str(&format!(" ({})", &hash[..hash.len().min(8)]));
    }

    if cfg!(debug_assertions) {
        version.push_str(" [debug]");
    }

    version
}

/// User-Agent header sent to calendar servers
pub fn user_agent() -> String {
    format!("toldyou/{}", VERSION)
}

/// Check whether a stored proof's format version can be read
pub fn is_format_compatible(version: u8) -> bool {
    version == FORMAT_VERSION
}
