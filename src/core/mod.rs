//! Core data structures for Stowage.
//!
//! This module contains the foundational types used throughout Stowage:
//! - API levels, targets and multilib classes
//! - Dependency tags
//! - Build units and bundle declarations
//! - The unit graph and its depth-first walker
//! - Bundle errors

pub mod api_level;
pub mod bundle;
pub mod error;
pub mod graph;
pub mod tag;
pub mod target;
pub mod unit;
pub mod walk;

pub use api_level::ApiLevel;
pub use bundle::{Bundle, BundleOverride};
pub use error::{BundleError, BundleErrors, ErrorKind};
pub use graph::{UnitGraph, UnitId};
pub use tag::{DependencyTag, TagKind};
pub use target::{Arch, Multilib, Target, Variant};
pub use unit::{BuildUnit, Partition, UnitKind};
pub use walk::{DependencyPath, WalkStep};
