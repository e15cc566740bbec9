//! Container classification
//!
//! Turns inspected containers into expiry decisions and tracks which images
//! and volume-source containers the survivors still depend on.

pub mod classifier;
pub mod record;

pub use classifier::{
    classify_containers, ContainerClassification, Retention, UsageMap, VolumeRefCount,
};
pub use record::ContainerRecord;
