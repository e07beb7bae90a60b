//! Skiff CLI - resolve, fetch and log in to OCI registries.

pub mod commands;
pub mod output;
