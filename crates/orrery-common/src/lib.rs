//! Orrery Common - Shared types, traits, and errors
//!
//! This crate provides the foundational types used across all Orrery components:
//! - The `OrreryError` taxonomy and `Result` alias
//! - Collaborator traits for cluster membership, messaging and direct routing
//! - Common constants

pub mod error;
pub mod traits;

// Re-exports for convenience
pub use error::{OrreryError, Result};
pub use traits::*;

/// Shared broadcast channel carrying replicated object snapshots
pub const OBJECTS_CHANNEL: &str = "/oort/objects";

/// Prefix of the private sender session each replicated object opens
pub const DEFAULT_SESSION_PREFIX: &str = "ReplicatedObject";
