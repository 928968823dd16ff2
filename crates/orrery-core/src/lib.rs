//! Orrery Core - Replicated per-node named objects
//!
//! This crate provides:
//! - The replication engine (`ReplicatedObject`) and its first-contact protocol
//! - Construction and merge contracts with standard factories and strategies
//! - Ordered, failure-isolated change notification
//! - Membership event publishing and in-process cluster collaborators
//! - Configuration and metrics

pub mod metrics;
pub mod model;
pub mod service;
pub mod value;

// Re-export commonly used types
pub use model::Configuration;
pub use service::{
    LocalCluster, MapFactory, MergeStrategy, ObjectConfig, ObjectFactory, ObjectListener,
    ObjectMap, ReplicatedObject, UnionListMerge, UnionMapMerge,
};
pub use value::{ConcurrentList, ConcurrentMap};

// Re-export wire model and errors
pub use orrery_api::{InfoKind, ObjectInfo};
pub use orrery_common::{OrreryError, Result};
