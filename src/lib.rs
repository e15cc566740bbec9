//! rune-gc - garbage collector for Docker-compatible container engines
//!
//! Periodically enumerates the containers and images of a host, decides
//! which have expired, and removes them:
//!
//! - Containers that exited long ago, unless another surviving container
//!   mounts volumes from them
//! - Images older than a threshold that no surviving container uses
//!
//! Works against Docker, and against any engine exposing the Docker
//! Engine API such as Rune.

pub mod config;
pub mod container;
pub mod daemon;
pub mod error;
pub mod image;
pub mod runtime;

pub use config::GcConfig;
pub use daemon::{run_cycle, CycleOptions, GcDaemon, Summary};
pub use error::{GcError, Result};
