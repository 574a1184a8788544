//! Stub and linkage resolution.
//!
//! Decides whether a shared library reached through another member is
//! bundled or left to the runtime linker, and rejects static links to
//! libraries that expose stubs.

use tracing::trace;

use crate::core::bundle::Bundle;
use crate::core::graph::{UnitGraph, UnitId};
use crate::core::tag::TagKind;
use crate::core::walk::WalkStep;
use crate::core::BundleError;
use crate::resolver::membership::{ApexContents, MembershipIndex};
use crate::util::Config;

/// Bundle owning the dynamic linker.
pub const RUNTIME_BUNDLE: &str = "com.android.runtime";

/// Units of the runtime bundle that may link statically against stubbed libraries.
pub const STATIC_STUB_LINK_EXEMPT: &[&str] = &["linker", "crash_dump", "linkerconfig"];

/// What to do with a shared library reached indirectly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndirectNative {
    /// Bundle it as a transitive payload entry.
    Include,
    /// Satisfied by the provider's stub. The real implementation must be
    /// installed on the platform when `implementation_required` is set.
    Stub { implementation_required: bool },
    /// Loaded from outside the bundle at run time.
    External,
}

impl IndirectNative {
    /// The consumer still needs the library name at run time.
    pub fn is_required(self) -> bool {
        !matches!(self, IndirectNative::Include)
    }
}

/// Classify the indirect shared-library edge in `step`.
pub fn resolve_indirect_native(
    step: &WalkStep<'_>,
    bundle: &Bundle,
    contents: &ApexContents,
    index: &MembershipIndex,
    config: &Config,
) -> IndirectNative {
    let graph = step.graph();
    let child = graph.unit(step.child);

    // Host bundles have no platform libraries to fall back on.
    if config.build.host {
        return IndirectNative::Include;
    }
    if bundle.use_vndk_as_stable && child.is_vndk() {
        return IndirectNative::External;
    }

    let stubbed = child
        .as_native_library()
        .is_some_and(|lib| lib.has_stubs || lib.is_stubs);
    if stubbed {
        if contents.is_direct(&child.name) {
            return IndirectNative::Include;
        }
        let implementation_required = !index.directly_in_any(&child.name)
            && config.platform_image()
            && !config.build.unbundled_build;
        trace!(
            bundle = %bundle.name,
            library = %child.name,
            implementation_required,
            "linking against stub"
        );
        return IndirectNative::Stub {
            implementation_required,
        };
    }

    if graph.dep_in_same_package(step.parent(), step.child, step.tag) {
        IndirectNative::Include
    } else {
        IndirectNative::External
    }
}

/// Reject members that statically link a stubbed library that is not a
/// direct member of the bundle.
pub fn check_static_linking_to_stubs(
    graph: &UnitGraph,
    bundle_id: UnitId,
    bundle: &Bundle,
    contents: &ApexContents,
    config: &Config,
) -> Vec<BundleError> {
    let mut errors = Vec::new();
    if config.build.host || bundle.test || bundle.vndk {
        return errors;
    }

    graph.walk(bundle_id, |step| {
        let parent = graph.unit(step.parent());
        let child = graph.unit(step.child);
        if !child.enabled || !graph.dep_in_same_package(step.parent(), step.child, step.tag) {
            return false;
        }
        if bundle.name == RUNTIME_BUNDLE && STATIC_STUB_LINK_EXEMPT.contains(&parent.name.as_str())
        {
            return false;
        }
        if step.tag.kind == TagKind::Static && child.has_stubs() && !contents.is_direct(&child.name)
        {
            errors.push(BundleError::StaticLinkToStub {
                bundle: bundle.name,
                library: child.name,
                consumer: parent.name,
                path: step.path(),
            });
            return false;
        }
        true
    });
    errors
}

/// Whether bundled libraries that also exist on the platform may be replaced
/// by links to the platform copy.
pub fn link_to_system_lib(bundle: &Bundle, config: &Config) -> bool {
    if config.build.unbundled_build || config.build.host {
        return false;
    }
    if !bundle.installable || bundle.is_vendor_or_product() {
        return false;
    }
    if bundle.updatable && bundle.has_image_payload() && !config.build.force_symlink_optimization {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::membership::collect_all;
    use crate::test_support::GraphBuilder;
    use crate::util::Name;

    fn static_link_errors(builder: &mut GraphBuilder, bundle: &str) -> Vec<BundleError> {
        let graph = builder.build();
        let config = Config::default();
        let index = collect_all(&graph, &graph.bundles(), &config);
        let id = graph.find_common(bundle).unwrap();
        let unit = graph.unit(id).as_bundle().unwrap();
        let contents = index.contents(bundle).unwrap();
        check_static_linking_to_stubs(&graph, id, unit, contents, &config)
    }

    #[test]
    fn test_static_link_to_stub_rejected() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libfoo".into()];
        });
        b.shared_lib("libfoo")
            .stub_lib("libbar")
            .dep("libfoo", "libbar", TagKind::Static);

        let errors = static_link_errors(&mut b, "pkg.core");
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            BundleError::StaticLinkToStub {
                library,
                consumer,
                path,
                ..
            } => {
                assert_eq!(*library, "libbar");
                assert_eq!(*consumer, "libfoo");
                assert_eq!(
                    path.names(),
                    vec![Name::new("pkg.core"), Name::new("libfoo"), Name::new("libbar")]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_static_link_allowed_when_direct_member() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libfoo".into(), "libbar".into()];
        });
        b.shared_lib("libfoo")
            .stub_lib("libbar")
            .dep("libfoo", "libbar", TagKind::Static);

        assert!(static_link_errors(&mut b, "pkg.core").is_empty());
    }

    #[test]
    fn test_runtime_bundle_exemption() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle(RUNTIME_BUNDLE, |bundle| {
            bundle.native.binaries = vec!["linker".into()];
        });
        b.binary("linker")
            .stub_lib("libc_impl")
            .dep("linker", "libc_impl", TagKind::Static);

        assert!(static_link_errors(&mut b, RUNTIME_BUNDLE).is_empty());
    }

    #[test]
    fn test_link_to_system_lib() {
        let config = Config::default();
        let mut bundle = Bundle::new("pkg.core");
        assert!(link_to_system_lib(&bundle, &config));

        bundle.updatable = true;
        assert!(!link_to_system_lib(&bundle, &config));

        let mut forced = Config::default();
        forced.build.force_symlink_optimization = true;
        assert!(link_to_system_lib(&bundle, &forced));

        bundle.payload_type = "zip".to_string();
        assert!(link_to_system_lib(&bundle, &config));

        let mut unbundled = Config::default();
        unbundled.build.unbundled_build = true;
        assert!(!link_to_system_lib(&bundle, &unbundled));
    }
}
