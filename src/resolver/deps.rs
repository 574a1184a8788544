//! Bundle dependency declaration.
//!
//! Turns each bundle's member lists into tagged edges on the unit graph.
//! Native members are split by multilib class across the device targets;
//! managed code and data files use the architecture-independent variant.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::core::bundle::{Bundle, NativeDeps};
use crate::core::graph::{UnitGraph, UnitId};
use crate::core::tag::{DependencyTag, TagKind};
use crate::core::target::{Target, Variant};
use crate::core::unit::{Linkage, UnitKind};
use crate::core::BundleError;
use crate::util::interning::PREBUILT_PREFIX;
use crate::util::{Config, Name};

/// Declare edges for every bundle in the graph.
///
/// Returns the configuration errors found, keyed by bundle name. Bundles
/// without errors are absent from the map.
pub fn declare_all(graph: &mut UnitGraph, config: &Config) -> BTreeMap<Name, Vec<BundleError>> {
    let mut failures = BTreeMap::new();
    for id in graph.bundles() {
        let errors = declare_bundle_deps(graph, id, config);
        if !errors.is_empty() {
            failures.insert(graph.unit(id).name, errors);
        }
    }
    failures
}

/// Declare the edges of one bundle.
pub fn declare_bundle_deps(
    graph: &mut UnitGraph,
    bundle_id: UnitId,
    config: &Config,
) -> Vec<BundleError> {
    let Some(bundle) = graph.unit(bundle_id).as_bundle().cloned() else {
        return Vec::new();
    };
    let mut decl = Declarer {
        graph,
        bundle_id,
        bundle: &bundle,
        errors: Vec::new(),
    };
    let targets = config.targets();

    if bundle.vndk {
        decl.declare_self_identified(&targets);
    }

    let has_32 = targets.iter().any(|t| !t.arch.is_64bit());
    for (i, target) in targets.iter().enumerate() {
        let variant = Variant::Arch(target.arch);

        decl.native(&bundle.native.without_binaries(), variant);
        decl.native(&bundle.multilib.both, variant);

        if i == 0 {
            decl.native(&bundle.multilib.first, variant);
            decl.list("binaries", &bundle.native.binaries, TagKind::Executable, variant);
            decl.list("sh_binaries", &bundle.sh_binaries, TagKind::ShBinary, variant);
        }
        if target.arch.is_64bit() {
            decl.native(&bundle.multilib.lib64, variant);
            if !has_32 {
                decl.native(&bundle.multilib.prefer32, variant);
            }
        } else {
            decl.native(&bundle.multilib.lib32, variant);
            decl.native(&bundle.multilib.prefer32, variant);
        }
    }

    let common = Variant::Common;
    decl.list("filesystems", &bundle.filesystems, TagKind::Filesystem, common);
    decl.list("compat_configs", &bundle.compat_configs, TagKind::CompatConfig, common);
    decl.list("apps", &bundle.apps, TagKind::App, common);
    decl.list("rros", &bundle.rros, TagKind::Rro, common);
    decl.list("bpfs", &bundle.bpfs, TagKind::Bpf, common);
    decl.list(
        "bootclasspath_fragments",
        &bundle.bootclasspath_fragments,
        TagKind::BootclasspathFragment,
        common,
    );
    decl.list(
        "systemserverclasspath_fragments",
        &bundle.systemserverclasspath_fragments,
        TagKind::SystemServerClasspathFragment,
        common,
    );
    decl.list("java_libs", &bundle.java_libs, TagKind::JavaLib, common);

    if !bundle.prebuilts.is_empty() {
        let prebuilt_target = targets
            .iter()
            .find(|t| t.arch.is_64bit())
            .or_else(|| targets.first());
        let variant = prebuilt_target.map_or(Variant::Common, |t| Variant::Arch(t.arch));
        decl.list("prebuilts", &bundle.prebuilts, TagKind::Prebuilt, variant);
    }

    decl.signing(config);

    let Declarer { errors, .. } = decl;
    debug!(
        bundle = %bundle.name,
        edges = graph.deps(bundle_id).len(),
        errors = errors.len(),
        "declared bundle dependencies"
    );
    errors
}

struct Declarer<'a> {
    graph: &'a mut UnitGraph,
    bundle_id: UnitId,
    bundle: &'a Bundle,
    errors: Vec<BundleError>,
}

impl Declarer<'_> {
    fn native(&mut self, deps: &NativeDeps, variant: Variant) {
        self.list("native_shared_libs", &deps.native_shared_libs, TagKind::SharedLib, variant);
        self.list("jni_libs", &deps.jni_libs, TagKind::JniLib, variant);
        self.list("binaries", &deps.binaries, TagKind::Executable, variant);
        self.list("tests", &deps.tests, TagKind::Test, variant);
    }

    fn list(&mut self, property: &'static str, names: &[Name], tag: TagKind, variant: Variant) {
        for &name in names {
            if let Some(dep) = self.resolve(property, name, tag, variant) {
                trace!(bundle = %self.bundle.name, dep = %name, %variant, tag = ?tag, "add edge");
                self.graph.add_dep(self.bundle_id, dep, tag);
            }
        }
    }

    fn resolve(
        &mut self,
        property: &'static str,
        name: Name,
        tag: TagKind,
        variant: Variant,
    ) -> Option<UnitId> {
        let source = self.find(name, tag, variant);
        let found = if DependencyTag::new(tag).source_only() {
            source
        } else {
            let prebuilt = self.find(Name::new(format!("{PREBUILT_PREFIX}{name}")), tag, variant);
            match (source, prebuilt) {
                (Some(source), Some(prebuilt)) if self.graph.unit(prebuilt).caps.prefer => {
                    trace!(bundle = %self.bundle.name, dep = %name, "using preferred prebuilt");
                    Some(prebuilt)
                }
                (None, prebuilt) => prebuilt,
                (source, _) => source,
            }
        };
        let Some(id) = found else {
            self.errors.push(BundleError::UnresolvedDependency {
                bundle: self.bundle.name,
                property,
                dep: name,
                variant,
            });
            return None;
        };

        let (expected, ok) = expected_kind(tag, &self.graph.unit(id).kind);
        if !ok {
            self.errors.push(BundleError::WrongDependencyKind {
                bundle: self.bundle.name,
                property,
                dep: name,
                expected,
                found: self.graph.unit(id).kind.name(),
            });
            return None;
        }
        Some(id)
    }

    fn find(&self, name: Name, tag: TagKind, variant: Variant) -> Option<UnitId> {
        // Data files may be architecture independent even when requested per target.
        self.graph.find(&name, variant).or_else(|| {
            (tag == TagKind::Prebuilt)
                .then(|| self.graph.find_common(&name))
                .flatten()
        })
    }

    fn declare_self_identified(&mut self, targets: &[Target]) {
        let members: Vec<UnitId> = self
            .graph
            .units()
            .filter(|(_, u)| {
                u.is_vndk() && u.is_shared_library() && !u.host && u.variant != Variant::Common
            })
            .filter(|(_, u)| {
                targets
                    .iter()
                    .any(|t| u.variant == Variant::Arch(t.arch))
            })
            .map(|(id, _)| id)
            .collect();
        for id in members {
            self.graph.add_dep(self.bundle_id, id, TagKind::SharedLib);
        }
    }

    fn signing(&mut self, config: &Config) {
        match self.bundle.key {
            None => self.errors.push(BundleError::MissingKey {
                bundle: self.bundle.name,
            }),
            Some(key) => self.signing_unit("key", key, TagKind::Key, config),
        }
        if let Some(cert) = self.bundle.certificate {
            self.signing_unit("certificate", cert, TagKind::Certificate, config);
        }
    }

    fn signing_unit(&mut self, property: &'static str, name: Name, tag: TagKind, config: &Config) {
        if self.graph.find_common(&name).is_none() && config.build.allow_missing_dependencies {
            // The plan carries a deferred error instead.
            debug!(bundle = %self.bundle.name, %name, "signing material missing, deferring");
            return;
        }
        if let Some(id) = self.resolve(property, name, tag, Variant::Common) {
            self.graph.add_dep(self.bundle_id, id, tag);
        }
    }
}

impl NativeDeps {
    /// Lists that apply to every target; top-level binaries go on the primary one only.
    fn without_binaries(&self) -> NativeDeps {
        NativeDeps {
            binaries: Vec::new(),
            ..self.clone()
        }
    }
}

/// The unit kind a bundle tag accepts, and whether `kind` matches it.
fn expected_kind(tag: TagKind, kind: &UnitKind) -> (&'static str, bool) {
    match tag {
        TagKind::SharedLib | TagKind::JniLib => (
            "shared native_library",
            matches!(kind, UnitKind::NativeLibrary(l) if l.linkage == Linkage::Shared),
        ),
        TagKind::Executable => (
            "native_binary",
            matches!(kind, UnitKind::NativeBinary(_)),
        ),
        TagKind::Test => (
            "native_binary",
            matches!(kind, UnitKind::NativeBinary(_)),
        ),
        TagKind::ShBinary => ("sh_binary", matches!(kind, UnitKind::ShBinary(_))),
        TagKind::JavaLib => ("java_library", matches!(kind, UnitKind::JavaLibrary(_))),
        TagKind::App => ("app", matches!(kind, UnitKind::App(_))),
        TagKind::Rro => ("rro", matches!(kind, UnitKind::Rro(_))),
        TagKind::Bpf => ("bpf", matches!(kind, UnitKind::Bpf(_))),
        TagKind::Filesystem => ("filesystem", matches!(kind, UnitKind::Filesystem)),
        TagKind::Prebuilt => ("prebuilt", matches!(kind, UnitKind::Prebuilt(_))),
        TagKind::CompatConfig => ("compat_config", matches!(kind, UnitKind::CompatConfig(_))),
        TagKind::BootclasspathFragment => (
            "bootclasspath_fragment",
            matches!(kind, UnitKind::BootclasspathFragment(_)),
        ),
        TagKind::SystemServerClasspathFragment => (
            "systemserverclasspath_fragment",
            matches!(kind, UnitKind::SystemServerClasspathFragment(_)),
        ),
        TagKind::Key => ("key", matches!(kind, UnitKind::Key(_))),
        TagKind::Certificate => ("certificate", matches!(kind, UnitKind::Certificate(_))),
        _ => ("bundle member", false),
    }
}
