//! Image classification
//!
//! Decides which images are old enough and unused by any surviving container.

pub mod classifier;
pub mod record;

pub use classifier::{classify_images, ImageFilter};
pub use record::ImageRecord;
