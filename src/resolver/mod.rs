//! Graph passes that run before payload synthesis.
//!
//! Each pass finishes for every bundle before the next one starts:
//! dependency declaration, platform availability, membership collection and
//! variant partitioning.

pub mod deps;
pub mod membership;
pub mod platform;
pub mod variants;

pub use deps::{declare_all, declare_bundle_deps};
pub use membership::{
    collect, collect_all, continue_walk, ApexContents, ApexInfo, Membership, MembershipIndex,
};
pub use platform::mark_platform_availability;
pub use variants::{partition, VariantHost, VariantPlan, PLATFORM_VARIATION};
