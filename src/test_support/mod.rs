//! Test utilities for Stowage unit tests.
//!
//! `GraphBuilder` declares bundles and units by name and expands them into a
//! `UnitGraph` the way the loader does: native units get one variant per
//! configured target, everything else is architecture independent.
//!
//! # Example
//!
//! ```rust,ignore
//! use stowage::test_support::GraphBuilder;
//!
//! let mut b = GraphBuilder::new().single_target();
//! b.bundle("pkg.core", |bundle| {
//!     bundle.native.native_shared_libs = vec!["libfoo".into()];
//! });
//! b.shared_lib("libfoo").available("libfoo", &["pkg.core"]);
//! let graph = b.build();
//! ```

pub mod fixtures;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::bundle::{Bundle, BundleOverride};
use crate::core::graph::{UnitGraph, UnitId};
use crate::core::tag::TagKind;
use crate::core::target::{Arch, Variant};
use crate::core::unit::{
    App, BootclasspathFragment, BuildUnit, JavaLibrary, Linkage, NativeBinary, NativeLibrary, Prebuilt, SigningKey,
    UnitKind,
};
use crate::core::BundleError;
use crate::resolver::deps::declare_all;
use crate::util::{Config, Name};

pub use fixtures::*;

/// A unit declared by name, expanded into variants at build time.
#[derive(Debug, Clone)]
struct Prototype {
    unit: BuildUnit,
    per_target: bool,
}

/// Declarative builder for unit graphs used in tests.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    config: Config,
    bundles: Vec<Bundle>,
    overrides: Vec<BundleOverride>,
    units: Vec<Prototype>,
    deps: Vec<(Name, Name, TagKind)>,
}

impl GraphBuilder {
    /// A builder for the default arm64 + arm device.
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    /// Only the primary arm64 target.
    pub fn single_target(self) -> Self {
        self.with_arches(&[Arch::Arm64])
    }

    pub fn with_arches(mut self, arches: &[Arch]) -> Self {
        self.config.targets.arches = arches.to_vec();
        self
    }

    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Declare or update a bundle. New bundles are signed with `<name>.key`.
    pub fn bundle(&mut self, name: &str, f: impl FnOnce(&mut Bundle)) -> &mut Self {
        let index = match self.bundles.iter().position(|b| b.name == name) {
            Some(index) => index,
            None => {
                let mut bundle = Bundle::new(name);
                bundle.key = Some(Name::new(format!("{name}.key")));
                self.bundles.push(bundle);
                self.bundles.len() - 1
            }
        };
        f(&mut self.bundles[index]);
        self
    }

    /// Declare an override of an already declared bundle.
    pub fn override_bundle(&mut self, name: &str, base: &str) -> &mut Self {
        self.overrides.push(BundleOverride {
            name: Name::new(name),
            base: Name::new(base),
            ..BundleOverride::default()
        });
        self
    }

    fn unit(&mut self, unit: BuildUnit, per_target: bool) -> &mut Self {
        self.units.retain(|p| p.unit.name != unit.name);
        self.units.push(Prototype { unit, per_target });
        self
    }

    fn native_library(&mut self, name: &str, lib: NativeLibrary) -> &mut Self {
        let unit = BuildUnit::new(name, UnitKind::NativeLibrary(lib), Variant::Common);
        self.unit(unit, true)
    }

    pub fn shared_lib(&mut self, name: &str) -> &mut Self {
        self.native_library(name, NativeLibrary::default())
    }

    pub fn shared_lib_with(&mut self, name: &str, f: impl FnOnce(&mut NativeLibrary)) -> &mut Self {
        let mut lib = NativeLibrary::default();
        f(&mut lib);
        self.native_library(name, lib)
    }

    /// A shared library that exports a stable stub interface.
    pub fn stub_lib(&mut self, name: &str) -> &mut Self {
        self.shared_lib_with(name, |lib| lib.has_stubs = true)
    }

    pub fn static_lib(&mut self, name: &str) -> &mut Self {
        self.shared_lib_with(name, |lib| lib.linkage = Linkage::Static)
    }

    pub fn binary(&mut self, name: &str) -> &mut Self {
        let kind = UnitKind::NativeBinary(NativeBinary::default());
        self.unit(BuildUnit::new(name, kind, Variant::Common), true)
    }

    /// A Java library compiled to dex.
    pub fn java_lib(&mut self, name: &str) -> &mut Self {
        let kind = UnitKind::JavaLibrary(JavaLibrary {
            dex_jar: Some(PathBuf::from(format!("out/common/{name}/{name}.jar"))),
            ..JavaLibrary::default()
        });
        self.unit(BuildUnit::new(name, kind, Variant::Common), false)
    }

    pub fn prebuilt(&mut self, name: &str) -> &mut Self {
        let kind = UnitKind::Prebuilt(Prebuilt::default());
        self.unit(BuildUnit::new(name, kind, Variant::Common), false)
    }

    pub fn bootclasspath_fragment(&mut self, name: &str) -> &mut Self {
        let kind = UnitKind::BootclasspathFragment(BootclasspathFragment {
            classpaths_proto: Some(PathBuf::from(format!("out/common/{name}/bootclasspath.pb"))),
            ..BootclasspathFragment::default()
        });
        self.unit(BuildUnit::new(name, kind, Variant::Common), false)
    }

    pub fn app(&mut self, name: &str) -> &mut Self {
        let kind = UnitKind::App(App::default());
        self.unit(BuildUnit::new(name, kind, Variant::Common), false)
    }

    /// Add an edge from every variant of `from` to the matching variant of `to`.
    pub fn dep(&mut self, from: &str, to: &str, tag: TagKind) -> &mut Self {
        self.deps.push((Name::new(from), Name::new(to), tag));
        self
    }

    /// Replace the availability set of a unit.
    pub fn available(&mut self, name: &str, entries: &[&str]) -> &mut Self {
        self.modify(name, |u| {
            u.apex_available = entries.iter().map(|e| e.to_string()).collect();
        })
    }

    /// Edit a declared unit; the change applies to all of its variants.
    pub fn modify(&mut self, name: &str, f: impl FnOnce(&mut BuildUnit)) -> &mut Self {
        let proto = self
            .units
            .iter_mut()
            .find(|p| p.unit.name == name)
            .unwrap_or_else(|| panic!("unit `{name}` is not declared"));
        f(&mut proto.unit);
        self
    }

    /// Build the graph, panicking on declaration errors.
    pub fn build(&self) -> UnitGraph {
        let (graph, failures) = self.build_with_errors();
        assert!(failures.is_empty(), "declaration errors: {failures:?}");
        graph
    }

    /// Build the graph and return the declaration errors per bundle.
    pub fn build_with_errors(&self) -> (UnitGraph, BTreeMap<Name, Vec<BundleError>>) {
        let mut graph = UnitGraph::new();
        let targets = self.config.targets();

        let mut bundles = self.bundles.clone();
        for over in &self.overrides {
            let base = self
                .bundles
                .iter()
                .find(|b| b.name == over.base)
                .unwrap_or_else(|| panic!("override base `{}` is not declared", over.base));
            bundles.push(over.fold(base));
        }

        for bundle in &bundles {
            let key = Name::new(format!("{}.key", bundle.name));
            if bundle.key == Some(key) && graph.find_common(&key).is_none() {
                let kind = UnitKind::Key(SigningKey {
                    public: Some(PathBuf::from(format!("keys/{key}.avbpubkey"))),
                    private: Some(PathBuf::from(format!("keys/{key}.pem"))),
                });
                add(&mut graph, BuildUnit::new(key, kind, Variant::Common));
            }
            let unit = BuildUnit::new(
                bundle.name,
                UnitKind::Bundle(Box::new(bundle.clone())),
                Variant::Common,
            );
            add(&mut graph, unit);
        }

        for proto in &self.units {
            if proto.per_target {
                for target in &targets {
                    let mut unit = proto.unit.clone();
                    unit.variant = Variant::Arch(target.arch);
                    add(&mut graph, unit);
                }
            } else {
                add(&mut graph, proto.unit.clone());
            }
        }

        let primary = targets.first().map(|t| Variant::Arch(t.arch));
        for (from, to, tag) in &self.deps {
            let sources = graph.variants_of(from);
            assert!(!sources.is_empty(), "unit `{from}` is not declared");
            for source in sources {
                let variant = graph.unit(source).variant;
                let target = graph
                    .find(to, variant)
                    .or_else(|| graph.find_common(to))
                    .or_else(|| primary.and_then(|v| graph.find(to, v)))
                    .unwrap_or_else(|| panic!("unit `{to}` is not declared"));
                graph.add_dep(source, target, *tag);
            }
        }

        let failures = declare_all(&mut graph, &self.config);
        (graph, failures)
    }
}

fn add(graph: &mut UnitGraph, unit: BuildUnit) -> UnitId {
    let name = unit.name;
    graph
        .add_unit(unit)
        .unwrap_or_else(|e| panic!("failed to add `{name}`: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_units_expand_per_target() {
        let mut b = GraphBuilder::new();
        b.shared_lib("libfoo").java_lib("framework-foo");
        let graph = b.build();

        assert_eq!(graph.variants_of("libfoo").len(), 2);
        assert!(graph.find("libfoo", Variant::Arch(Arch::Arm)).is_some());
        assert!(graph.find_common("framework-foo").is_some());
    }

    #[test]
    fn test_bundle_gets_default_key_unit() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |_| {});
        let graph = b.build();

        let key = graph.find_common("pkg.core.key").unwrap();
        assert!(matches!(graph.unit(key).kind, UnitKind::Key(_)));
    }

    #[test]
    fn test_modify_applies_to_every_variant() {
        let mut b = GraphBuilder::new();
        b.shared_lib("libfoo").modify("libfoo", |u| u.enabled = false);
        let graph = b.build();

        assert!(graph
            .variants_of("libfoo")
            .into_iter()
            .all(|id| !graph.unit(id).enabled));
    }
}
