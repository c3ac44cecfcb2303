//! Session Management Layer
//!
//! Provides per-tab session identity, lifecycle teardown and the periodic
//! orphan sweep

pub mod registry;
pub mod sweeper;

pub use registry::*;
pub use sweeper::*;
