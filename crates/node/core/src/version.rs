//! Version information for the Isthmus CLI.

/// The version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The short version information for Isthmus.
pub const SHORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The git commit SHA, when the build environment provides one.
pub const GIT_SHA: &str = {
    match option_env!("ISTHMUS_GIT_SHA") {
        Some(sha) => sha,
        None => "unknown",
    }
};
