//! Payload synthesis.
//!
//! Turns a bundle's membership into the ordered list of files the packaging
//! step stages into the image, together with the native library lists the
//! runtime linker configuration consumes.

pub mod payload;
pub mod plan;
pub mod rules;
pub mod stubs;
pub mod synth;

pub use payload::{dedup_and_sort, FileClass, PayloadFile};
pub use plan::{BundlePlan, KeyMaterial};
pub use rules::RuleContext;
pub use stubs::{check_static_linking_to_stubs, link_to_system_lib, IndirectNative};
pub use synth::synthesize;
