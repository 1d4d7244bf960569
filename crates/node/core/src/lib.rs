//! Shared CLI infrastructure.
//!
//! - [`args`] - CLI argument structs shared by every command
//! - [`logging`] - Logging initialization
//! - [`version`] - Version information

pub mod args;
pub mod logging;
pub mod version;
