//! Payload synthesis.
//!
//! One depth-first walk per bundle. Edges leaving the bundle dispatch to the
//! per-kind path rules; edges further down decide between bundling a
//! transitive dependency and leaving it to the runtime linker.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::builder::payload::{dedup_and_sort, PayloadFile};
use crate::builder::plan::{BundlePlan, KeyMaterial};
use crate::builder::rules::{self, RuleContext};
use crate::builder::stubs::{self, IndirectNative};
use crate::core::bundle::Bundle;
use crate::core::graph::{UnitGraph, UnitId};
use crate::core::tag::TagKind;
use crate::core::unit::{is_bootstrap_library, BuildUnit, UnitKind};
use crate::core::walk::WalkStep;
use crate::core::{BundleError, BundleErrors};
use crate::resolver::membership::{ApexContents, MembershipIndex};
use crate::util::{Config, Name};

/// Build the payload plan of the bundle at `bundle_id`.
pub fn synthesize(
    graph: &UnitGraph,
    index: &MembershipIndex,
    bundle_id: UnitId,
    config: &Config,
) -> Result<BundlePlan, BundleErrors> {
    let unit = graph.unit(bundle_id);
    let mut errors = BundleErrors::new(unit.name);
    let Some(bundle) = unit.as_bundle() else {
        return Err(errors);
    };

    if !bundle.apps.is_empty() {
        if let Err(e) = rules::validate_build_id(bundle.name, config.build_id()) {
            errors.push(e);
            return Err(errors);
        }
    }

    let contents = index
        .contents(&bundle.name)
        .cloned()
        .unwrap_or_else(|| Arc::new(ApexContents::new(bundle.name)));

    let mut synth = Synth {
        graph,
        bundle,
        contents: &contents,
        index,
        config,
        rules: RuleContext {
            bundle: bundle.name,
            build_id: config.build_id(),
            handle_special_libs: !bundle.ignore_system_library_special_case,
        },
        files: Vec::new(),
        provide: Vec::new(),
        require: Vec::new(),
        required_modules: Vec::new(),
        key: None,
        certificate: None,
        deferred: Vec::new(),
        errors: Vec::new(),
    };
    graph.walk(bundle_id, |step| synth.visit(step));
    synth.resolve_missing_signing();

    let Synth {
        files,
        mut provide,
        mut require,
        mut required_modules,
        key,
        certificate,
        deferred,
        errors: walk_errors,
        ..
    } = synth;
    errors.extend(walk_errors);

    let strict = bundle.strict_payload_check && !bundle.coverage && !config.build.native_coverage;
    let files = match dedup_and_sort(bundle.name, files, strict) {
        Ok(files) => files,
        Err(conflicts) => {
            errors.extend(conflicts);
            Vec::new()
        }
    };

    errors.extend(stubs::check_static_linking_to_stubs(
        graph, bundle_id, bundle, &contents, config,
    ));

    provide.sort();
    provide.dedup();
    require.sort();
    require.dedup();
    require.retain(|lib| !provide.contains(lib));
    required_modules.sort();
    required_modules.dedup();

    let mut jni_libs: Vec<String> = Vec::new();
    for file in files.iter().filter(|f| f.jni) {
        if !jni_libs.contains(&file.stem) {
            jni_libs.push(file.stem.clone());
        }
    }

    let mut plan = BundlePlan::new(bundle.name, bundle.variation_name(), contents);
    plan.min_sdk = bundle.effective_min_sdk(config.min_sdk_override());
    plan.updatable = bundle.updatable;
    plan.payload_type = bundle.payload_type.clone();
    plan.fs_type = bundle
        .has_image_payload()
        .then(|| bundle.payload_fs_type.clone());
    plan.package_name = bundle.package_name.clone();
    plan.files = files;
    plan.provide_native_libs = provide;
    plan.require_native_libs = require;
    plan.required_modules = required_modules;
    plan.jni_libs = jni_libs;
    plan.link_to_system_lib = stubs::link_to_system_lib(bundle, config);
    plan.key = key;
    plan.certificate = certificate;
    plan.deferred_errors = deferred;

    debug!(
        bundle = %plan.bundle,
        files = plan.files.len(),
        requires = plan.require_native_libs.len(),
        provides = plan.provide_native_libs.len(),
        errors = errors.len(),
        "synthesized payload"
    );
    errors.into_result(plan)
}

struct Synth<'a> {
    graph: &'a UnitGraph,
    bundle: &'a Bundle,
    contents: &'a ApexContents,
    index: &'a MembershipIndex,
    config: &'a Config,
    rules: RuleContext<'a>,
    files: Vec<PayloadFile>,
    provide: Vec<String>,
    require: Vec<String>,
    required_modules: Vec<Name>,
    key: Option<KeyMaterial>,
    certificate: Option<KeyMaterial>,
    deferred: Vec<BundleError>,
    errors: Vec<BundleError>,
}

impl Synth<'_> {
    fn visit(&mut self, step: &WalkStep<'_>) -> bool {
        let child = self.graph.unit(step.child);
        if step.tag.excluded_from_contents() || !child.enabled {
            trace!(bundle = %self.bundle.name, unit = %child.name, tag = %step.tag, "stop");
            return false;
        }
        if step.is_direct() {
            self.direct(step, child)
        } else {
            self.indirect(step, child)
        }
    }

    fn direct(&mut self, step: &WalkStep<'_>, child: &BuildUnit) -> bool {
        match step.tag.kind {
            TagKind::SharedLib | TagKind::JniLib => {
                self.add_files(child, false, step.tag.kind == TagKind::JniLib);
                if child.has_stubs()
                    && !self.bundle.vndk
                    && !is_bootstrap_library(child.name.without_prebuilt_prefix())
                {
                    self.provide.push(child.stem());
                }
                true
            }
            // Managed libraries and apps bring their permission files along.
            TagKind::Executable
            | TagKind::Test
            | TagKind::JavaLib
            | TagKind::App
            | TagKind::BootclasspathFragment
            | TagKind::SystemServerClasspathFragment => {
                self.add_files(child, false, false);
                true
            }
            TagKind::ShBinary
            | TagKind::Rro
            | TagKind::Bpf
            | TagKind::Filesystem
            | TagKind::Prebuilt
            | TagKind::CompatConfig => {
                self.add_files(child, false, false);
                false
            }
            TagKind::Key => {
                self.key = Some(self.signing_material(child));
                false
            }
            TagKind::Certificate => {
                self.certificate = Some(self.signing_material(child));
                false
            }
            _ => false,
        }
    }

    fn indirect(&mut self, step: &WalkStep<'_>, child: &BuildUnit) -> bool {
        // Members of self-identified bundles are never followed.
        if self.bundle.vndk {
            return false;
        }
        match step.tag.kind {
            TagKind::Shared | TagKind::Runtime => {
                if !child.is_shared_library() {
                    return false;
                }
                let decision = stubs::resolve_indirect_native(
                    step,
                    self.bundle,
                    self.contents,
                    self.index,
                    self.config,
                );
                if decision.is_required() {
                    self.require.push(child.stem());
                }
                match decision {
                    IndirectNative::Include => {
                        self.add_files(child, true, false);
                        true
                    }
                    IndirectNative::Stub {
                        implementation_required,
                    } => {
                        if implementation_required {
                            self.required_modules.push(child.name);
                        }
                        false
                    }
                    IndirectNative::External => false,
                }
            }
            // Nothing to stage, but its own shared dependencies may be.
            TagKind::Static => {
                self.graph
                    .dep_in_same_package(step.parent(), step.child, step.tag)
            }
            TagKind::Header | TagKind::Java | TagKind::Jni | TagKind::TestFor => false,
            TagKind::PermissionsXml => {
                self.add_files(child, true, false);
                false
            }
            TagKind::FragmentContent => {
                self.add_files(child, true, false);
                true
            }
            _ => {
                self.errors.push(BundleError::UnexpectedIndirectTag {
                    bundle: self.bundle.name,
                    tag: step.tag,
                    module: child.name,
                });
                false
            }
        }
    }

    fn add_files(&mut self, unit: &BuildUnit, transitive: bool, jni: bool) {
        match rules::files_for(&self.rules, unit) {
            Ok(files) => {
                for mut file in files {
                    file.transitive = transitive;
                    file.jni = jni;
                    trace!(bundle = %self.bundle.name, path = %file.path(), transitive, "payload file");
                    self.files.push(file);
                }
            }
            Err(e) => self.errors.push(e),
        }
    }

    fn signing_material(&mut self, unit: &BuildUnit) -> KeyMaterial {
        let (first, second) = match &unit.kind {
            UnitKind::Key(key) => (key.public.clone(), key.private.clone()),
            UnitKind::Certificate(cert) => (cert.pem.clone(), cert.key.clone()),
            _ => (None, None),
        };
        if first.is_some() && second.is_some() {
            return KeyMaterial::Resolved {
                name: unit.name,
                public: first,
                private: second,
            };
        }
        self.unavailable(unit.name)
    }

    /// Material declared but absent from the graph (tolerated missing dependencies).
    fn resolve_missing_signing(&mut self) {
        if self.key.is_none() {
            if let Some(name) = self.bundle.key {
                self.key = Some(self.unavailable(name));
            }
        }
        if self.certificate.is_none() {
            if let Some(name) = self.bundle.certificate {
                self.certificate = Some(self.unavailable(name));
            }
        }
    }

    fn unavailable(&mut self, name: Name) -> KeyMaterial {
        let error = BundleError::KeyUnavailable {
            bundle: self.bundle.name,
            key: name,
        };
        if self.config.build.allow_missing_dependencies {
            self.deferred.push(error);
        } else {
            self.errors.push(error);
        }
        KeyMaterial::Missing { name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::payload::FileClass;
    use crate::core::target::Arch;
    use crate::resolver::membership::collect_all;
    use crate::test_support::GraphBuilder;

    fn plan_of(builder: &GraphBuilder, bundle: &str) -> Result<BundlePlan, BundleErrors> {
        let graph = builder.build();
        let index = collect_all(&graph, &graph.bundles(), builder.config());
        let id = graph.find_common(bundle).unwrap();
        synthesize(&graph, &index, id, builder.config())
    }

    fn core_scenario() -> GraphBuilder {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libfoo".into()];
            bundle.native.binaries = vec!["bin1".into()];
        });
        b.shared_lib("libfoo")
            .binary("bin1")
            .stub_lib("libbar")
            .dep("libfoo", "libbar", TagKind::Shared);
        b
    }

    #[test]
    fn test_stub_provider_is_required_not_bundled() {
        let plan = plan_of(&core_scenario(), "pkg.core").unwrap();

        assert_eq!(plan.paths(), vec!["bin/bin1", "lib64/libfoo.so"]);
        assert!(plan.files.iter().all(|f| !f.transitive));
        assert_eq!(plan.require_native_libs, vec!["libbar.so"]);
        assert_eq!(plan.required_modules, vec![Name::new("libbar")]);
        assert!(plan.provide_native_libs.is_empty());
    }

    #[test]
    fn test_unbundled_build_does_not_require_implementation() {
        let b = core_scenario().with_config(|c| c.build.unbundled_build = true);
        let plan = plan_of(&b, "pkg.core").unwrap();
        assert_eq!(plan.require_native_libs, vec!["libbar.so"]);
        assert!(plan.required_modules.is_empty());
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let b = core_scenario();
        let first = plan_of(&b, "pkg.core").unwrap();
        let second = plan_of(&b, "pkg.core").unwrap();
        assert_eq!(first.files, second.files);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_transitive_dependency_bundled() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libfoo".into()];
        });
        b.shared_lib("libfoo")
            .shared_lib("libdep")
            .static_lib("libstatic")
            .shared_lib("libdeeper")
            .dep("libfoo", "libdep", TagKind::Shared)
            .dep("libfoo", "libstatic", TagKind::Static)
            .dep("libstatic", "libdeeper", TagKind::Shared);
        let plan = plan_of(&b, "pkg.core").unwrap();

        assert_eq!(plan.paths(), vec!["lib64/libdep.so", "lib64/libfoo.so"]);
        assert!(plan.file("lib64/libdep.so").unwrap().transitive);
        // A shared edge out of a static library crosses the package boundary.
        assert_eq!(plan.require_native_libs, vec!["libdeeper.so"]);
    }

    #[test]
    fn test_direct_wins_over_transitive() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libfoo".into(), "libdep".into()];
        });
        b.shared_lib("libfoo")
            .shared_lib("libdep")
            .dep("libfoo", "libdep", TagKind::Shared);
        let plan = plan_of(&b, "pkg.core").unwrap();

        assert_eq!(plan.files.len(), 2);
        assert!(!plan.file("lib64/libdep.so").unwrap().transitive);
    }

    #[test]
    fn test_listing_twice_yields_one_entry() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libfoo".into(), "libfoo".into()];
            bundle.multilib.first.native_shared_libs = vec!["libfoo".into()];
        });
        b.shared_lib("libfoo");
        let plan = plan_of(&b, "pkg.core").unwrap();
        assert_eq!(plan.paths(), vec!["lib64/libfoo.so"]);
    }

    #[test]
    fn test_multilib_payload() {
        let mut b = GraphBuilder::new().with_arches(&[Arch::Arm64, Arch::Arm]);
        b.bundle("pkg.core", |bundle| {
            bundle.multilib.both.native_shared_libs = vec!["libx".into()];
            bundle.multilib.lib64.native_shared_libs = vec!["liby".into()];
        });
        b.shared_lib("libx").shared_lib("liby");
        let plan = plan_of(&b, "pkg.core").unwrap();

        assert_eq!(
            plan.paths(),
            vec!["lib/libx.so", "lib64/libx.so", "lib64/liby.so"]
        );
    }

    #[test]
    fn test_direct_stub_library_is_provided() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libstub".into(), "libc".into()];
            bundle.native.binaries = vec!["bin1".into()];
        });
        b.stub_lib("libstub")
            .stub_lib("libc")
            .binary("bin1")
            .dep("bin1", "libstub", TagKind::Shared);
        let plan = plan_of(&b, "pkg.core").unwrap();

        assert_eq!(plan.provide_native_libs, vec!["libstub.so"]);
        // Bundled directly, so not required from outside.
        assert!(plan.require_native_libs.is_empty());
        assert!(plan.file("lib64/bionic/libc.so").is_some());
    }

    #[test]
    fn test_jni_libs_listed() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.jni_libs = vec!["libjni".into()];
        });
        b.shared_lib("libjni");
        let plan = plan_of(&b, "pkg.core").unwrap();

        assert_eq!(plan.jni_libs, vec!["libjni.so"]);
        assert!(plan.files[0].jni);
        assert_eq!(plan.files[0].class, FileClass::NativeSharedLib);
    }

    #[test]
    fn test_disabled_unit_terminates_walk() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libfoo".into()];
        });
        b.shared_lib("libfoo")
            .shared_lib("libdisabled")
            .shared_lib("libbehind")
            .dep("libfoo", "libdisabled", TagKind::Shared)
            .dep("libdisabled", "libbehind", TagKind::Shared)
            .modify("libdisabled", |u| u.enabled = false);
        let plan = plan_of(&b, "pkg.core").unwrap();
        assert_eq!(plan.paths(), vec!["lib64/libfoo.so"]);
    }

    #[test]
    fn test_unexpected_indirect_tag() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libfoo".into()];
        });
        b.shared_lib("libfoo")
            .prebuilt("foo.conf")
            .dep("libfoo", "foo.conf", TagKind::Prebuilt);
        let errors = plan_of(&b, "pkg.core").unwrap_err();
        assert!(matches!(
            errors.errors[0],
            BundleError::UnexpectedIndirectTag { .. }
        ));
    }

    #[test]
    fn test_missing_key_deferred() {
        let mut b = GraphBuilder::new()
            .single_target()
            .with_config(|c| c.build.allow_missing_dependencies = true);
        b.bundle("pkg.core", |bundle| bundle.key = Some("absent.key".into()));
        let plan = plan_of(&b, "pkg.core").unwrap();

        assert!(plan.key.as_ref().unwrap().is_missing());
        assert!(matches!(
            plan.deferred_errors[0],
            BundleError::KeyUnavailable { .. }
        ));
    }

    #[test]
    fn test_resolved_key_material() {
        let b = core_scenario();
        let plan = plan_of(&b, "pkg.core").unwrap();
        let key = plan.key.unwrap();
        assert_eq!(key.name(), "pkg.core.key");
        assert!(!key.is_missing());
    }

    #[test]
    fn test_invalid_build_id() {
        let mut b = GraphBuilder::new()
            .single_target()
            .with_config(|c| c.build.build_id = Some("bad id".to_string()));
        b.bundle("pkg.core", |bundle| bundle.apps = vec!["ExampleApp".into()]);
        b.app("ExampleApp");
        let errors = plan_of(&b, "pkg.core").unwrap_err();
        assert!(matches!(errors.errors[0], BundleError::InvalidBuildId { .. }));
    }

    fn permissions_dir(u: &mut BuildUnit) {
        if let UnitKind::Prebuilt(p) = &mut u.kind {
            p.sub_dir = Some("permissions".to_string());
        }
    }

    #[test]
    fn test_java_library_stages_permissions_xml() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.java_libs = vec!["framework-foo".into()];
        });
        b.java_lib("framework-foo")
            .prebuilt("framework-foo.xml")
            .modify("framework-foo.xml", permissions_dir)
            .dep("framework-foo", "framework-foo.xml", TagKind::PermissionsXml);
        let plan = plan_of(&b, "pkg.core").unwrap();

        assert_eq!(
            plan.paths(),
            vec!["etc/permissions/framework-foo.xml", "javalib/framework-foo.jar"]
        );
        assert!(plan.file("etc/permissions/framework-foo.xml").unwrap().transitive);
    }

    #[test]
    fn test_fragment_contents_stage_their_permissions_xml() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.bootclasspath_fragments = vec!["core-bootclasspath".into()];
        });
        b.bootclasspath_fragment("core-bootclasspath")
            .java_lib("framework-bar")
            .prebuilt("framework-bar.xml")
            .modify("framework-bar.xml", permissions_dir)
            .dep("core-bootclasspath", "framework-bar", TagKind::FragmentContent)
            .dep("framework-bar", "framework-bar.xml", TagKind::PermissionsXml);
        let plan = plan_of(&b, "pkg.core").unwrap();

        assert!(plan.file("javalib/framework-bar.jar").is_some());
        assert!(plan.file("etc/permissions/framework-bar.xml").is_some());
    }

    #[test]
    fn test_java_libraries_with_same_stem_conflict() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.java_libs = vec!["framework-a".into(), "framework-b".into()];
        });
        let framework_stem = |u: &mut BuildUnit| {
            if let UnitKind::JavaLibrary(java) = &mut u.kind {
                java.stem = Some("framework".to_string());
            }
        };
        b.java_lib("framework-a")
            .modify("framework-a", framework_stem)
            .java_lib("framework-b")
            .modify("framework-b", framework_stem);
        let errors = plan_of(&b, "pkg.core").unwrap_err();

        assert!(errors.iter().any(|e| matches!(
            e,
            BundleError::PayloadConflict { dest, .. } if dest == "javalib/framework.jar"
        )));
    }

    #[test]
    fn test_vendor_vndk_as_stable_requires_vndk_library() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.vendor", |bundle| {
            bundle.partition = crate::core::unit::Partition::Vendor;
            bundle.use_vndk_as_stable = true;
            bundle.native.binaries = vec!["vendor_bin".into()];
        });
        b.binary("vendor_bin")
            .shared_lib_with("libvndk", |lib| lib.is_vndk = true)
            .dep("vendor_bin", "libvndk", TagKind::Shared)
            .modify("vendor_bin", |u| u.partition = crate::core::unit::Partition::Vendor)
            .modify("libvndk", |u| u.partition = crate::core::unit::Partition::Vendor);
        let plan = plan_of(&b, "pkg.vendor").unwrap();

        assert_eq!(plan.paths(), vec!["bin/vendor_bin"]);
        assert_eq!(plan.require_native_libs, vec!["libvndk.so"]);
        assert!(!plan.link_to_system_lib);
    }
}
