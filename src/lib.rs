//! Stowage - bundle membership, variant and payload planning
//!
//! This crate decides, for every package bundle in a build graph, which build
//! units are packaged inside it, which variants those units are built in, and
//! which files land where in the bundle's payload. It validates availability
//! opt-in and minimum-version monotonicity along the way.

pub mod builder;
pub mod core;
pub mod ops;
pub mod resolver;
pub mod util;

/// Test utilities for Stowage unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a declarative graph builder and graph file
/// fixtures.
#[cfg(test)]
pub mod test_support;

pub use builder::{BundlePlan, PayloadFile};
pub use core::{Bundle, BundleError, BundleErrors, UnitGraph};
pub use ops::{plan_file, plan_graph, Planned};
pub use util::{Config, Name};
