//! Graph file parsing.
//!
//! A graph file is the in-memory stand-in for the host build engine's module
//! graph. It declares bundles, bundle overrides and build units:
//!
//! ```toml
//! [[bundle]]
//! name = "pkg.core"
//! key = "pkg.core.key"
//! native_shared_libs = ["libfoo"]
//!
//! [[unit]]
//! name = "libfoo"
//! kind = "native_library"
//! shared_libs = ["libbar"]
//! apex_available = ["pkg.core"]
//!
//! [[unit]]
//! name = "pkg.core.key"
//! kind = "key"
//! ```
//!
//! Native units are expanded into one variant per selected device target;
//! every other unit is architecture independent.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::api_level::ApiLevel;
use crate::core::bundle::{level_string, Bundle, BundleOverride};
use crate::core::graph::{UnitGraph, UnitId};
use crate::core::tag::TagKind;
use crate::core::target::{Arch, Multilib, Target, Variant};
use crate::core::unit::{
    App, BootclasspathFragment, Bpf, BuildUnit, Certificate, CompatConfig, DataPath, JavaLibrary,
    Linkage, NativeBinary, NativeLibrary, Partition, Prebuilt, Rro, ShBinary, SigningKey,
    SystemServerClasspathFragment, UnitKind,
};
use crate::util::{Config, Name};

/// Declared kind of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    NativeLibrary,
    NativeBinary,
    ShBinary,
    JavaLibrary,
    App,
    Rro,
    Prebuilt,
    CompatConfig,
    Filesystem,
    Bpf,
    BootclasspathFragment,
    SystemserverclasspathFragment,
    Key,
    Certificate,
}

impl DeclKind {
    /// Whether the unit is built once per device target.
    fn is_native(self) -> bool {
        matches!(self, DeclKind::NativeLibrary | DeclKind::NativeBinary)
    }

    fn default_multilib(self) -> Multilib {
        match self {
            DeclKind::NativeBinary => Multilib::First,
            _ => Multilib::Both,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootImageDecl {
    pub arch: Arch,
    pub path: PathBuf,
}

fn default_true() -> bool {
    true
}

/// One `[[unit]]` table.
///
/// Kind-specific attributes sit next to the common ones; attributes that do
/// not apply to the declared kind are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitDecl {
    pub name: Name,
    pub kind: DeclKind,
    #[serde(default)]
    pub compile_multilib: Option<Multilib>,
    #[serde(default)]
    pub partition: Partition,
    #[serde(default)]
    pub apex_available: Vec<String>,
    #[serde(default, deserialize_with = "level_string")]
    pub min_sdk_version: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub host: bool,
    #[serde(default)]
    pub recovery: bool,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub always_platform_available: bool,
    #[serde(default)]
    pub unique_variations: bool,
    /// Replace the source unit named without the `prebuilt_` prefix.
    #[serde(default)]
    pub prefer: bool,

    // Companion modules installed alongside.
    #[serde(default)]
    pub required: Vec<Name>,
    #[serde(default)]
    pub target_required: Vec<Name>,
    #[serde(default)]
    pub host_required: Vec<Name>,

    // Dependencies.
    #[serde(default)]
    pub shared_libs: Vec<Name>,
    #[serde(default)]
    pub static_libs: Vec<Name>,
    #[serde(default)]
    pub runtime_libs: Vec<Name>,
    #[serde(default)]
    pub header_libs: Vec<Name>,
    #[serde(default)]
    pub java_libs: Vec<Name>,
    #[serde(default)]
    pub jni_libs: Vec<Name>,
    #[serde(default)]
    pub required_xml: Vec<Name>,
    #[serde(default)]
    pub contents: Vec<Name>,
    #[serde(default)]
    pub tools: Vec<Name>,
    #[serde(default)]
    pub test_for: Vec<Name>,

    // native_library
    #[serde(default)]
    pub linkage: Linkage,
    #[serde(default)]
    pub has_stubs: bool,
    #[serde(default)]
    pub is_stubs: bool,
    #[serde(default)]
    pub vndk: bool,
    #[serde(default)]
    pub native_bridge: Option<String>,
    #[serde(default)]
    pub relative_install_path: Option<String>,
    #[serde(default)]
    pub stem: Option<String>,

    // native_binary, sh_binary
    #[serde(default)]
    pub symlinks: Vec<String>,
    #[serde(default)]
    pub data: Vec<DataPath>,
    #[serde(default)]
    pub static_executable: bool,
    #[serde(default)]
    pub test: bool,

    // prebuilt, sh_binary, compat_config, bpf
    #[serde(default)]
    pub base_dir: Option<String>,
    #[serde(default)]
    pub sub_dir: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub outputs: Vec<PathBuf>,

    // java_library
    #[serde(default)]
    pub dex_jar: Option<PathBuf>,
    #[serde(default)]
    pub profile: Option<PathBuf>,

    // app, rro
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub apk_name: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub privapp_allowlist: Option<PathBuf>,
    #[serde(default)]
    pub theme: Option<String>,

    // classpath fragments
    #[serde(default)]
    pub boot_image: Vec<BootImageDecl>,
    #[serde(default)]
    pub classpaths_proto: Option<PathBuf>,

    // key, certificate
    #[serde(default)]
    pub public: Option<PathBuf>,
    #[serde(default)]
    pub private: Option<PathBuf>,
    #[serde(default)]
    pub pem: Option<PathBuf>,
}

impl UnitDecl {
    fn unit_kind(&self) -> UnitKind {
        match self.kind {
            DeclKind::NativeLibrary => UnitKind::NativeLibrary(NativeLibrary {
                linkage: self.linkage,
                relative_install_path: self.relative_install_path.clone(),
                has_stubs: self.has_stubs,
                is_stubs: self.is_stubs,
                is_vndk: self.vndk,
                native_bridge: self.native_bridge.clone(),
                stem: self.stem.clone(),
            }),
            DeclKind::NativeBinary => UnitKind::NativeBinary(NativeBinary {
                relative_install_path: self.relative_install_path.clone(),
                symlinks: self.symlinks.clone(),
                data: self.data.clone(),
                static_executable: self.static_executable,
                test: self.test,
                native_bridge: self.native_bridge.clone(),
            }),
            DeclKind::ShBinary => UnitKind::ShBinary(ShBinary {
                sub_dir: self.sub_dir.clone(),
                symlinks: self.symlinks.clone(),
            }),
            DeclKind::JavaLibrary => UnitKind::JavaLibrary(JavaLibrary {
                stem: self.stem.clone(),
                dex_jar: self.dex_jar.clone(),
                profile: self.profile.clone(),
            }),
            DeclKind::App => UnitKind::App(App {
                privileged: self.privileged,
                apk_name: self.apk_name.clone(),
                package_name: self.package_name.clone(),
                privapp_allowlist: self.privapp_allowlist.clone(),
            }),
            DeclKind::Rro => UnitKind::Rro(Rro {
                theme: self.theme.clone(),
            }),
            DeclKind::Prebuilt => UnitKind::Prebuilt(Prebuilt {
                base_dir: self.base_dir.clone(),
                sub_dir: self.sub_dir.clone(),
                filename: self.filename.clone(),
            }),
            DeclKind::CompatConfig => UnitKind::CompatConfig(CompatConfig {
                sub_dir: self.sub_dir.clone(),
            }),
            DeclKind::Filesystem => UnitKind::Filesystem,
            DeclKind::Bpf => UnitKind::Bpf(Bpf {
                sub_dir: self.sub_dir.clone(),
                outputs: self.outputs.clone(),
            }),
            DeclKind::BootclasspathFragment => {
                UnitKind::BootclasspathFragment(BootclasspathFragment {
                    boot_image: self
                        .boot_image
                        .iter()
                        .map(|b| (b.arch, b.path.clone()))
                        .collect(),
                    classpaths_proto: self.classpaths_proto.clone(),
                })
            }
            DeclKind::SystemserverclasspathFragment => {
                UnitKind::SystemServerClasspathFragment(SystemServerClasspathFragment {
                    classpaths_proto: self.classpaths_proto.clone(),
                })
            }
            DeclKind::Key => UnitKind::Key(SigningKey {
                public: self.public.clone(),
                private: self.private.clone(),
            }),
            DeclKind::Certificate => UnitKind::Certificate(Certificate {
                pem: self.pem.clone(),
                key: self.private.clone(),
            }),
        }
    }

    fn build_unit(&self, variant: Variant) -> Result<BuildUnit> {
        let mut unit = BuildUnit::new(self.name, self.unit_kind(), variant)
            .with_partition(self.partition)
            .with_apex_available(self.apex_available.iter().cloned());
        if let Some(level) = &self.min_sdk_version {
            let level = ApiLevel::parse(level)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid min_sdk_version of unit `{}`", self.name))?;
            unit = unit.with_min_sdk(level);
        }
        if let Some(output) = &self.output {
            unit = unit.with_output(output.clone());
        }
        unit.enabled = self.enabled;
        unit.host = self.host;
        unit.recovery = self.recovery;
        unit.required = self.required.clone();
        unit.target_required = self.target_required.clone();
        unit.host_required = self.host_required.clone();
        unit.test_for = self.test_for.clone();
        unit.caps.always_platform_available = self.always_platform_available;
        unit.caps.unique_variations = self.unique_variations;
        unit.caps.prefer = self.prefer;
        Ok(unit)
    }

    /// Dependency lists with the tag each one declares, in wiring order.
    fn dep_lists(&self) -> [(&[Name], TagKind); 10] {
        [
            (self.shared_libs.as_slice(), TagKind::Shared),
            (self.static_libs.as_slice(), TagKind::Static),
            (self.runtime_libs.as_slice(), TagKind::Runtime),
            (self.header_libs.as_slice(), TagKind::Header),
            (self.java_libs.as_slice(), TagKind::Java),
            (self.jni_libs.as_slice(), TagKind::Jni),
            (self.required_xml.as_slice(), TagKind::PermissionsXml),
            (self.contents.as_slice(), TagKind::FragmentContent),
            (self.tools.as_slice(), TagKind::HostTool),
            (self.test_for.as_slice(), TagKind::TestFor),
        ]
    }
}

/// A parsed graph file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphFile {
    #[serde(default, rename = "bundle")]
    pub bundles: Vec<Bundle>,
    #[serde(default, rename = "override")]
    pub overrides: Vec<BundleOverride>,
    #[serde(default, rename = "unit")]
    pub units: Vec<UnitDecl>,
}

impl GraphFile {
    /// Load a graph file from a path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read graph file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("failed to parse graph file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: GraphFile = toml::from_str(content)?;

        if file.bundles.iter().any(|b| b.name.is_empty()) {
            bail!("bundle declared without a name");
        }
        if file.units.iter().any(|u| u.name.is_empty()) {
            bail!("unit declared without a name");
        }
        Ok(file)
    }

    /// Bundles with every override folded onto its base.
    pub fn resolved_bundles(&self) -> Result<Vec<Bundle>> {
        let mut bundles = self.bundles.clone();
        for over in &self.overrides {
            let base = self
                .bundles
                .iter()
                .find(|b| b.name == over.base)
                .with_context(|| {
                    format!("override `{}` names unknown base `{}`", over.name, over.base)
                })?;
            bundles.push(over.fold(base));
        }
        Ok(bundles)
    }

    /// Build the unit graph for the configured device targets.
    pub fn into_graph(self, config: &Config) -> Result<UnitGraph> {
        let targets = config.targets();
        if targets.is_empty() {
            bail!("no device targets configured");
        }
        let mut graph = UnitGraph::new();

        for bundle in self.resolved_bundles()? {
            let name = bundle.name;
            graph
                .add_unit(BuildUnit::new(name, UnitKind::Bundle(Box::new(bundle)), Variant::Common))
                .with_context(|| format!("failed to declare bundle `{name}`"))?;
        }

        let mut declared: Vec<(&UnitDecl, Vec<UnitId>)> = Vec::with_capacity(self.units.len());
        for decl in &self.units {
            let mut ids = Vec::new();
            for variant in variants_for(decl, &targets) {
                let unit = decl.build_unit(variant)?;
                let id = graph
                    .add_unit(unit)
                    .with_context(|| format!("failed to declare unit `{}`", decl.name))?;
                ids.push(id);
            }
            declared.push((decl, ids));
        }

        let primary = Variant::Arch(targets[0].arch);
        let mut edges = 0;
        for (decl, ids) in &declared {
            for &from in ids {
                let variant = graph.unit(from).variant;
                for (names, tag) in decl.dep_lists() {
                    for &dep in names {
                        let to = resolve_dep(&graph, dep, variant, primary).with_context(|| {
                            format!("unit `{}` depends on unknown unit `{dep}`", decl.name)
                        })?;
                        if graph.add_dep(from, to, tag) {
                            edges += 1;
                        }
                    }
                }
            }
        }

        info!(units = graph.len(), edges, "loaded graph");
        Ok(graph)
    }
}

/// Variants a declared unit is built in.
fn variants_for(decl: &UnitDecl, targets: &[Target]) -> Vec<Variant> {
    if !decl.kind.is_native() {
        return vec![Variant::Common];
    }
    let multilib = decl
        .compile_multilib
        .unwrap_or_else(|| decl.kind.default_multilib());
    let selected = multilib.select(targets);
    debug!(unit = %decl.name, ?multilib, targets = selected.len(), "expanding native unit");
    selected.into_iter().map(|t| Variant::Arch(t.arch)).collect()
}

/// The variant of `name` a unit built as `variant` links against.
///
/// Same architecture first, then the architecture independent unit, then the
/// primary target (managed code reaching native code).
fn resolve_dep(graph: &UnitGraph, name: Name, variant: Variant, primary: Variant) -> Option<UnitId> {
    graph
        .find(&name, variant)
        .or_else(|| graph.find_common(&name))
        .or_else(|| graph.find(&name, primary))
        .or_else(|| graph.variants_of(&name).into_iter().next())
}

/// Load and expand a graph file.
pub fn load_graph(path: &Path, config: &Config) -> Result<UnitGraph> {
    GraphFile::load(path)?
        .into_graph(config)
        .with_context(|| format!("failed to build graph from {}", path.display()))
}
