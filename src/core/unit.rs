//! Build units.
//!
//! A `BuildUnit` is one node of the dependency graph: a single variant of a
//! library, binary, data file, application or bundle. The kind-specific data
//! lives in the closed `UnitKind` enum so that path rules and predicates can
//! match on it exhaustively.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::api_level::ApiLevel;
use crate::core::bundle::Bundle;
use crate::core::target::{Arch, Variant};
use crate::util::Name;

/// Availability entry meaning "installed on the platform image".
pub const AVAILABLE_PLATFORM: &str = "//apex_available:platform";

/// Availability entry meaning "any bundle may include this unit".
pub const AVAILABLE_ANYAPEX: &str = "//apex_available:anyapex";

/// Runtime libraries the platform itself bootstraps with. They are always
/// available to the platform, never advertised as provided by a bundle, and
/// installed under a `bionic` sub-directory.
pub const BOOTSTRAP_LIBRARIES: &[&str] = &["libc", "libm", "libdl", "libdl_android", "linker"];

pub fn is_bootstrap_library(name: &str) -> bool {
    BOOTSTRAP_LIBRARIES.contains(&name)
}

/// Install partition of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    #[default]
    System,
    SystemExt,
    Vendor,
    Product,
    Odm,
}

impl Partition {
    /// Vendor-side partitions.
    pub fn is_vendor(self) -> bool {
        matches!(self, Partition::Vendor | Partition::Odm)
    }
}

/// Native library linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    #[default]
    Shared,
    Static,
}

#[derive(Debug, Clone, Default)]
pub struct NativeLibrary {
    pub linkage: Linkage,
    pub relative_install_path: Option<String>,
    /// Exposes an ABI-stub variant to consumers outside its bundle.
    pub has_stubs: bool,
    /// This instance is the stub variant itself.
    pub is_stubs: bool,
    /// Member of the self-identified library set.
    pub is_vndk: bool,
    /// Native-bridge sub-path, for translated variants.
    pub native_bridge: Option<String>,
    /// Installed file name, without directory.
    pub stem: Option<String>,
}

/// A test data file carried next to an executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPath {
    pub src: PathBuf,
    pub rel: String,
}

#[derive(Debug, Clone, Default)]
pub struct NativeBinary {
    pub relative_install_path: Option<String>,
    pub symlinks: Vec<String>,
    pub data: Vec<DataPath>,
    pub static_executable: bool,
    pub test: bool,
    pub native_bridge: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ShBinary {
    pub sub_dir: Option<String>,
    pub symlinks: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JavaLibrary {
    pub stem: Option<String>,
    /// Dex-compiled jar; units without one cannot be bundled.
    pub dex_jar: Option<PathBuf>,
    pub profile: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct App {
    pub privileged: bool,
    pub apk_name: Option<String>,
    pub package_name: Option<String>,
    pub privapp_allowlist: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Rro {
    pub theme: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Prebuilt {
    pub base_dir: Option<String>,
    pub sub_dir: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompatConfig {
    pub sub_dir: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Bpf {
    pub sub_dir: Option<String>,
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct BootclasspathFragment {
    pub boot_image: Vec<(Arch, PathBuf)>,
    pub classpaths_proto: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct SystemServerClasspathFragment {
    pub classpaths_proto: Option<PathBuf>,
}

/// A signing key. Missing halves mean the key is unavailable in this build.
#[derive(Debug, Clone, Default)]
pub struct SigningKey {
    pub public: Option<PathBuf>,
    pub private: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Certificate {
    pub pem: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

/// The kind of a build unit, with its kind-specific attributes.
#[derive(Debug, Clone)]
pub enum UnitKind {
    NativeLibrary(NativeLibrary),
    NativeBinary(NativeBinary),
    ShBinary(ShBinary),
    JavaLibrary(JavaLibrary),
    App(App),
    Rro(Rro),
    Prebuilt(Prebuilt),
    CompatConfig(CompatConfig),
    Filesystem,
    Bpf(Bpf),
    BootclasspathFragment(BootclasspathFragment),
    SystemServerClasspathFragment(SystemServerClasspathFragment),
    Key(SigningKey),
    Certificate(Certificate),
    Bundle(Box<Bundle>),
}

impl UnitKind {
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::NativeLibrary(_) => "native_library",
            UnitKind::NativeBinary(_) => "native_binary",
            UnitKind::ShBinary(_) => "sh_binary",
            UnitKind::JavaLibrary(_) => "java_library",
            UnitKind::App(_) => "app",
            UnitKind::Rro(_) => "rro",
            UnitKind::Prebuilt(_) => "prebuilt",
            UnitKind::CompatConfig(_) => "compat_config",
            UnitKind::Filesystem => "filesystem",
            UnitKind::Bpf(_) => "bpf",
            UnitKind::BootclasspathFragment(_) => "bootclasspath_fragment",
            UnitKind::SystemServerClasspathFragment(_) => "systemserverclasspath_fragment",
            UnitKind::Key(_) => "key",
            UnitKind::Certificate(_) => "certificate",
            UnitKind::Bundle(_) => "bundle",
        }
    }

    /// Default file name of the produced artifact.
    fn default_stem(&self, name: &str) -> String {
        match self {
            UnitKind::NativeLibrary(lib) => lib.stem.clone().unwrap_or_else(|| match lib.linkage {
                Linkage::Shared => format!("{name}.so"),
                Linkage::Static => format!("{name}.a"),
            }),
            UnitKind::JavaLibrary(_) => format!("{name}.jar"),
            UnitKind::App(app) => {
                format!("{}.apk", app.apk_name.as_deref().unwrap_or(name))
            }
            UnitKind::Rro(_) => format!("{name}.apk"),
            UnitKind::Prebuilt(p) => p.filename.clone().unwrap_or_else(|| name.to_string()),
            UnitKind::Filesystem => format!("{name}.img"),
            UnitKind::CompatConfig(_) => format!("{name}.xml"),
            UnitKind::Bundle(_) => format!("{name}.apex"),
            _ => name.to_string(),
        }
    }
}

/// Capability flags the host engine exposes for a unit.
#[derive(Debug, Clone, Copy)]
pub struct UnitCaps {
    pub can_have_variants: bool,
    pub installable: bool,
    pub always_platform_available: bool,
    /// Never share a variant across bundles.
    pub unique_variations: bool,
    /// A `prebuilt_` unit that replaces its source counterpart.
    pub prefer: bool,
}

impl Default for UnitCaps {
    fn default() -> Self {
        UnitCaps {
            can_have_variants: true,
            installable: true,
            always_platform_available: false,
            unique_variations: false,
            prefer: false,
        }
    }
}

/// Variant bookkeeping recorded by the variant partitioner.
#[derive(Debug, Clone, Default)]
pub struct VariantState {
    /// Created variation keys; the empty key is the platform variant.
    pub variations: Vec<String>,
    pub unique: bool,
    pub platform_available: bool,
}

/// One node in the unit graph.
#[derive(Debug, Clone)]
pub struct BuildUnit {
    pub name: Name,
    pub kind: UnitKind,
    pub variant: Variant,
    pub partition: Partition,
    pub caps: UnitCaps,
    pub apex_available: Vec<String>,
    pub min_sdk_version: Option<ApiLevel>,
    pub enabled: bool,
    pub host: bool,
    pub recovery: bool,
    pub output: Option<PathBuf>,
    pub required: Vec<Name>,
    pub target_required: Vec<Name>,
    pub host_required: Vec<Name>,
    pub test_for: Vec<Name>,
    pub state: VariantState,
}

impl BuildUnit {
    pub fn new(name: impl Into<Name>, kind: UnitKind, variant: Variant) -> Self {
        let caps = match &kind {
            UnitKind::Key(_) | UnitKind::Certificate(_) | UnitKind::Bundle(_) => UnitCaps {
                can_have_variants: false,
                ..UnitCaps::default()
            },
            _ => UnitCaps::default(),
        };
        BuildUnit {
            name: name.into(),
            kind,
            variant,
            partition: Partition::System,
            caps,
            apex_available: Vec::new(),
            min_sdk_version: None,
            enabled: true,
            host: false,
            recovery: false,
            output: None,
            required: Vec::new(),
            target_required: Vec::new(),
            host_required: Vec::new(),
            test_for: Vec::new(),
            state: VariantState::default(),
        }
    }

    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_apex_available<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apex_available = entries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_sdk(mut self, level: ApiLevel) -> Self {
        self.min_sdk_version = Some(level);
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn as_bundle(&self) -> Option<&Bundle> {
        match &self.kind {
            UnitKind::Bundle(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_native_library(&self) -> Option<&NativeLibrary> {
        match &self.kind {
            UnitKind::NativeLibrary(lib) => Some(lib),
            _ => None,
        }
    }

    /// A shared native library, the only kind that can be satisfied by stubs.
    pub fn is_shared_library(&self) -> bool {
        matches!(&self.kind, UnitKind::NativeLibrary(lib) if lib.linkage == Linkage::Shared)
    }

    pub fn has_stubs(&self) -> bool {
        matches!(&self.kind, UnitKind::NativeLibrary(lib) if lib.has_stubs)
    }

    pub fn is_vndk(&self) -> bool {
        matches!(&self.kind, UnitKind::NativeLibrary(lib) if lib.is_vndk)
    }

    pub fn is_static_library(&self) -> bool {
        matches!(&self.kind, UnitKind::NativeLibrary(lib) if lib.linkage == Linkage::Static)
    }

    /// Declared availability includes the platform image.
    pub fn declares_platform_available(&self) -> bool {
        self.apex_available.is_empty()
            || self.apex_available.iter().any(|a| a == AVAILABLE_PLATFORM)
    }

    /// Whether `bundle` (or its variation name) is listed in the availability set.
    ///
    /// Entries ending in `.*` match any bundle name with that prefix.
    pub fn available_for(&self, bundle: &str, variation: &str) -> bool {
        self.apex_available.iter().any(|entry| {
            if entry == AVAILABLE_ANYAPEX || entry == bundle || entry == variation {
                return true;
            }
            match entry.strip_suffix('*') {
                Some(prefix) if prefix.ends_with('.') => {
                    bundle.starts_with(prefix) || variation.starts_with(prefix)
                }
                _ => false,
            }
        })
    }

    /// The built artifact, or a conventional location under `out/`.
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => Path::new("out")
                .join(self.variant.as_str())
                .join(self.name.as_str())
                .join(self.kind.default_stem(&self.name)),
        }
    }

    /// File name of the built artifact.
    pub fn stem(&self) -> String {
        self.output_path()
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.to_string())
    }
}
