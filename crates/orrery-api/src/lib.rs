//! Orrery API - wire model definitions
//!
//! This crate provides:
//! - The `ObjectInfo` snapshot exchanged between nodes
//! - Field names and the `InfoKind` handshake marker

pub mod object;

// Re-export commonly used types
pub use object::*;
