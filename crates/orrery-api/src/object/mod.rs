//! Replicated object wire models
//!
//! This module defines the snapshot shape published on the objects channel.

pub mod model;

pub use model::*;
