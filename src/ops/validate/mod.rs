//! Compatibility validation.
//!
//! Each check re-walks the payload-reachable graph of one bundle with the
//! same continuation predicate membership collection uses, so both see an
//! identical graph shape. Checks never stop at the first failure; every error
//! of the bundle is returned.

pub mod baseline;

use tracing::debug;

use crate::core::api_level::ApiLevel;
use crate::core::bundle::{Bundle, PAYLOAD_FS_TYPES, PAYLOAD_TYPES};
use crate::core::graph::{UnitGraph, UnitId};
use crate::core::tag::TagKind;
use crate::core::unit::{BuildUnit, UnitKind};
use crate::core::BundleError;
use crate::resolver::membership::continue_walk;
use crate::util::Config;

pub use baseline::{normalize_unit_name, Baseline};

/// Static executables allowed per bundle variation.
const STATIC_EXECUTABLE_ALLOWED: &[(&str, &[&str])] =
    &[("com.android.runtime", &["linker", "linkerconfig"])];

/// Run every check against one bundle.
pub fn validate_bundle(
    graph: &UnitGraph,
    bundle_id: UnitId,
    baseline: &Baseline,
    config: &Config,
) -> Vec<BundleError> {
    let Some(bundle) = graph.unit(bundle_id).as_bundle() else {
        return Vec::new();
    };
    let mut errors = check_config(bundle);
    errors.extend(check_updatable(graph, bundle_id, bundle));
    errors.extend(check_availability(graph, bundle_id, bundle, baseline, config));
    errors.extend(check_min_sdk(graph, bundle_id, bundle, config));
    errors.extend(check_static_executables(graph, bundle_id, bundle, config));
    debug!(bundle = %bundle.name, errors = errors.len(), "validated bundle");
    errors
}

/// Declared properties that are malformed on their own.
pub fn check_config(bundle: &Bundle) -> Vec<BundleError> {
    let mut errors = Vec::new();

    if !PAYLOAD_TYPES.contains(&bundle.payload_type.as_str()) {
        errors.push(BundleError::InvalidProperty {
            bundle: bundle.name,
            property: "payload_type",
            value: bundle.payload_type.clone(),
            expected: format!("one of {}", PAYLOAD_TYPES.join(", ")),
        });
    }
    if bundle.has_image_payload() && !PAYLOAD_FS_TYPES.contains(&bundle.payload_fs_type.as_str()) {
        errors.push(BundleError::InvalidProperty {
            bundle: bundle.name,
            property: "payload_fs_type",
            value: bundle.payload_fs_type.clone(),
            expected: format!("one of {}", PAYLOAD_FS_TYPES.join(", ")),
        });
    }
    if let Some(value) = &bundle.min_sdk_version {
        if let Err(reason) = ApiLevel::parse(value) {
            errors.push(BundleError::InvalidProperty {
                bundle: bundle.name,
                property: "min_sdk_version",
                value: value.clone(),
                expected: reason,
            });
        }
    }

    let m = &bundle.multilib;
    let has_tests = [&bundle.native, &m.first, &m.both, &m.lib32, &m.lib64, &m.prefer32]
        .iter()
        .any(|deps| !deps.tests.is_empty());
    if has_tests && !bundle.test {
        errors.push(BundleError::TestsInNonTestBundle {
            bundle: bundle.name,
        });
    }

    if bundle.use_vndk_as_stable && !bundle.is_vendor() {
        errors.push(BundleError::VndkAsStableOnSystem {
            bundle: bundle.name,
        });
    }
    errors
}

/// Properties an independently updated bundle must have.
pub fn check_updatable(graph: &UnitGraph, bundle_id: UnitId, bundle: &Bundle) -> Vec<BundleError> {
    let mut errors = Vec::new();
    if !bundle.updatable {
        return errors;
    }
    let mut fail = |reason: String| {
        errors.push(BundleError::Updatable {
            bundle: bundle.name,
            reason,
        })
    };

    if bundle.min_sdk_version.is_none() {
        fail("should set min_sdk_version as well".to_string());
    }
    if bundle.platform_apis {
        fail("can't use platform APIs".to_string());
    }
    if bundle.is_vendor() {
        fail("can't be a vendor bundle".to_string());
    }
    if bundle.future_updatable {
        fail("already updatable, remove `future_updatable`".to_string());
    }

    for (tag, dep) in graph.deps(bundle_id) {
        let unit = graph.unit(dep);
        let proto = match &unit.kind {
            UnitKind::BootclasspathFragment(f) => &f.classpaths_proto,
            UnitKind::SystemServerClasspathFragment(f) => &f.classpaths_proto,
            _ => continue,
        };
        if tag.is_bundle_tag() && proto.is_none() {
            fail(format!(
                "includes \"{}\", which must generate its classpaths proto",
                unit.name
            ));
        }
    }
    errors
}

/// Every co-packaged unit must opt in to the bundle.
pub fn check_availability(
    graph: &UnitGraph,
    bundle_id: UnitId,
    bundle: &Bundle,
    baseline: &Baseline,
    config: &Config,
) -> Vec<BundleError> {
    let mut errors = Vec::new();
    if config.build.host || bundle.test || bundle.vndk {
        return errors;
    }
    // Units outside system partitions cannot declare availability.
    if bundle.is_vendor_or_product() {
        return errors;
    }
    // Coverage runtime dependencies only add noise.
    if bundle.coverage || config.build.native_coverage {
        return errors;
    }

    let variation = bundle.variation_name();
    graph.walk(bundle_id, |step| {
        if !continue_walk(step, bundle) {
            return false;
        }
        let to = graph.unit(step.child);
        if to.available_for(&bundle.name, &variation)
            || baseline.allows(&bundle.name, &to.name)
            || baseline.allows(&variation, &to.name)
        {
            return true;
        }
        errors.push(BundleError::NotAvailable {
            bundle: bundle.name,
            unit: graph.unit(step.parent()).name,
            dep: to.name,
            path: step.path(),
        });
        // Keep going so every offender below is reported too.
        true
    });
    errors
}

/// The minimum version a unit must support, given the unit that pulls it in.
fn required_min_sdk(unit: &BuildUnit, bundle_min: ApiLevel) -> ApiLevel {
    if unit.as_bundle().is_some() {
        return bundle_min;
    }
    unit.min_sdk_version.unwrap_or(bundle_min)
}

/// Minimum versions never rise along an in-package edge.
pub fn check_min_sdk(
    graph: &UnitGraph,
    bundle_id: UnitId,
    bundle: &Bundle,
    config: &Config,
) -> Vec<BundleError> {
    let mut errors = Vec::new();
    if bundle.test || bundle.vndk {
        return errors;
    }
    let bundle_min = bundle.effective_min_sdk(config.min_sdk_override());

    graph.walk(bundle_id, |step| {
        if !continue_walk(step, bundle) {
            return false;
        }
        let child = graph.unit(step.child);
        let Some(unit_min) = child.min_sdk_version else {
            return true;
        };
        let required = required_min_sdk(graph.unit(step.parent()), bundle_min);
        if unit_min > required {
            errors.push(BundleError::MinSdk {
                bundle: bundle.name,
                unit: child.name,
                unit_min,
                required,
                path: step.path(),
            });
        }
        true
    });
    errors
}

fn static_executable_allowed(variation: &str, exec: &str) -> bool {
    STATIC_EXECUTABLE_ALLOWED
        .iter()
        .any(|(bundle, execs)| *bundle == variation && execs.contains(&exec))
}

/// Direct executables must link dynamically.
pub fn check_static_executables(
    graph: &UnitGraph,
    bundle_id: UnitId,
    bundle: &Bundle,
    config: &Config,
) -> Vec<BundleError> {
    if config.build.host {
        return Vec::new();
    }
    let variation = bundle.variation_name();
    graph
        .deps(bundle_id)
        .into_iter()
        .filter(|(tag, _)| tag.kind == TagKind::Executable)
        .map(|(_, id)| graph.unit(id))
        .filter(|unit| matches!(&unit.kind, UnitKind::NativeBinary(bin) if bin.static_executable))
        .filter(|unit| !static_executable_allowed(&variation, &unit.name))
        .map(|unit| BundleError::StaticExecutable {
            bundle: bundle.name,
            module: unit.name,
        })
        .collect()
}
