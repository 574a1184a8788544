//! High-level operations.
//!
//! Loading graph files, validating bundles and running the full planning
//! pipeline behind the `stowage` commands.

pub mod load;
pub mod pipeline;
pub mod validate;

pub use load::{load_graph, GraphFile};
pub use pipeline::{explain, plan_file, plan_graph, Explanation, Planned};
pub use validate::{validate_bundle, Baseline};
