//! Skiff Core - Foundational Types
//!
//! Error taxonomy and registry configuration shared by the Skiff crates.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::RegistryOptions;
pub use error::{Result, SkiffError};

/// Skiff version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
