//! Collection cycles
//!
//! A cycle classifies containers, then images, then removes what expired.
//! The runner repeats cycles on an interval until told to stop.

pub mod cycle;
pub mod remover;
mod runner;

pub use cycle::{run_cycle, CycleOptions, Summary};
pub use remover::{RemovalOutcome, Remover};
pub use runner::GcDaemon;
