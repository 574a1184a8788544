//! Bundle declarations.
//!
//! A bundle is itself a build unit. Its declaration lists the members it wants
//! placed in its payload, optionally split by multilib class, plus the
//! properties that drive variant partitioning and validation.

use serde::{Deserialize, Serialize};

use crate::core::api_level::ApiLevel;
use crate::core::unit::Partition;
use crate::util::Name;

/// Native member lists, either top-level or under one multilib class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeDeps {
    pub native_shared_libs: Vec<Name>,
    pub jni_libs: Vec<Name>,
    pub binaries: Vec<Name>,
    pub tests: Vec<Name>,
}

impl NativeDeps {
    pub fn is_empty(&self) -> bool {
        self.native_shared_libs.is_empty()
            && self.jni_libs.is_empty()
            && self.binaries.is_empty()
            && self.tests.is_empty()
    }
}

/// Native member lists per multilib class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultilibDeps {
    pub first: NativeDeps,
    pub both: NativeDeps,
    pub lib32: NativeDeps,
    pub lib64: NativeDeps,
    pub prefer32: NativeDeps,
}

/// Payload container format.
pub const PAYLOAD_TYPES: &[&str] = &["image", "zip", "both"];

/// Filesystem types accepted for image payloads.
pub const PAYLOAD_FS_TYPES: &[&str] = &["ext4", "f2fs", "erofs"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bundle {
    pub name: Name,
    /// Overrides the variation name shared with other bundles.
    pub apex_name: Option<String>,
    /// Set when this bundle was folded from an override of `base`.
    #[serde(skip_deserializing)]
    pub overridden_base: Option<Name>,
    #[serde(deserialize_with = "level_string")]
    pub min_sdk_version: Option<String>,
    pub updatable: bool,
    pub future_updatable: bool,
    pub platform_apis: bool,
    pub partition: Partition,
    pub test: bool,
    /// Payload is every library flagged `vndk`, not an explicit list.
    pub vndk: bool,
    pub use_vndk_as_stable: bool,
    pub ignore_system_library_special_case: bool,
    pub payload_type: String,
    pub payload_fs_type: String,
    pub strict_payload_check: bool,
    /// Coverage-instrumented variant.
    pub coverage: bool,
    pub installable: bool,
    pub key: Option<Name>,
    pub certificate: Option<Name>,
    pub package_name: Option<String>,

    #[serde(flatten)]
    pub native: NativeDeps,
    pub multilib: MultilibDeps,
    pub sh_binaries: Vec<Name>,
    pub prebuilts: Vec<Name>,
    pub filesystems: Vec<Name>,
    pub compat_configs: Vec<Name>,
    pub apps: Vec<Name>,
    pub rros: Vec<Name>,
    pub bpfs: Vec<Name>,
    pub bootclasspath_fragments: Vec<Name>,
    pub systemserverclasspath_fragments: Vec<Name>,
    pub java_libs: Vec<Name>,
}

impl Default for Bundle {
    fn default() -> Self {
        Bundle {
            name: Name::default(),
            apex_name: None,
            overridden_base: None,
            min_sdk_version: None,
            updatable: false,
            future_updatable: false,
            platform_apis: false,
            partition: Partition::System,
            test: false,
            vndk: false,
            use_vndk_as_stable: false,
            ignore_system_library_special_case: false,
            payload_type: "image".to_string(),
            payload_fs_type: "ext4".to_string(),
            strict_payload_check: true,
            coverage: false,
            installable: true,
            key: None,
            certificate: None,
            package_name: None,
            native: NativeDeps::default(),
            multilib: MultilibDeps::default(),
            sh_binaries: Vec::new(),
            prebuilts: Vec::new(),
            filesystems: Vec::new(),
            compat_configs: Vec::new(),
            apps: Vec::new(),
            rros: Vec::new(),
            bpfs: Vec::new(),
            bootclasspath_fragments: Vec::new(),
            systemserverclasspath_fragments: Vec::new(),
            java_libs: Vec::new(),
        }
    }
}

impl Bundle {
    pub fn new(name: impl Into<Name>) -> Self {
        Bundle {
            name: name.into(),
            ..Bundle::default()
        }
    }

    /// Identity under which members build bundle-specific variants.
    ///
    /// An override shares its base's identity so both reuse one set of variants.
    pub fn variation_name(&self) -> Name {
        match (&self.apex_name, self.overridden_base) {
            (Some(apex_name), _) => Name::new(apex_name),
            (None, Some(base)) => base,
            (None, None) => self.name,
        }
    }

    /// Parsed minimum version; `None` when unset or malformed.
    pub fn min_sdk(&self) -> Option<ApiLevel> {
        self.min_sdk_version
            .as_deref()
            .and_then(|s| ApiLevel::parse(s).ok())
    }

    /// Minimum version used for variant creation and validation.
    ///
    /// Unset means the in-development release. The global override only ever
    /// raises a declared minimum.
    pub fn effective_min_sdk(&self, global_override: Option<ApiLevel>) -> ApiLevel {
        match (self.min_sdk(), global_override) {
            (Some(min), Some(over)) if over > min => over,
            (Some(min), _) => min,
            (None, _) => ApiLevel::FUTURE,
        }
    }

    pub fn is_vendor(&self) -> bool {
        self.partition.is_vendor()
    }

    /// Vendor or product bundles.
    pub fn is_vendor_or_product(&self) -> bool {
        self.partition.is_vendor() || self.partition == Partition::Product
    }

    /// The payload is an image rather than a plain archive.
    pub fn has_image_payload(&self) -> bool {
        self.payload_type == "image" || self.payload_type == "both"
    }

    /// Names listed by this declaration in any member list.
    pub fn all_member_names(&self) -> impl Iterator<Item = Name> + '_ {
        let native = |d: &NativeDeps| {
            d.native_shared_libs
                .iter()
                .chain(&d.jni_libs)
                .chain(&d.binaries)
                .chain(&d.tests)
                .copied()
                .collect::<Vec<_>>()
        };
        let m = &self.multilib;
        let mut names = native(&self.native);
        for class in [&m.first, &m.both, &m.lib32, &m.lib64, &m.prefer32] {
            names.extend(native(class));
        }
        for list in [
            &self.sh_binaries,
            &self.prebuilts,
            &self.filesystems,
            &self.compat_configs,
            &self.apps,
            &self.rros,
            &self.bpfs,
            &self.bootclasspath_fragments,
            &self.systemserverclasspath_fragments,
            &self.java_libs,
        ] {
            names.extend(list.iter().copied());
        }
        names.into_iter()
    }
}

/// Accept `min_sdk_version = 29` as well as `min_sdk_version = "29"`.
pub(crate) fn level_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    }))
}

/// Replaces a subset of a base bundle's properties under a new name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleOverride {
    pub name: Name,
    pub base: Name,
    pub apps: Option<Vec<Name>>,
    pub rros: Option<Vec<Name>>,
    pub bpfs: Option<Vec<Name>>,
    pub prebuilts: Option<Vec<Name>>,
    pub bootclasspath_fragments: Option<Vec<Name>>,
    pub systemserverclasspath_fragments: Option<Vec<Name>>,
    pub key: Option<Name>,
    pub certificate: Option<Name>,
    pub package_name: Option<String>,
}

impl BundleOverride {
    /// Produce the overriding bundle from its base declaration.
    pub fn fold(&self, base: &Bundle) -> Bundle {
        let mut bundle = base.clone();
        bundle.name = self.name;
        bundle.overridden_base = Some(base.overridden_base.unwrap_or(base.name));

        fn replace(slot: &mut Vec<Name>, with: &Option<Vec<Name>>) {
            if let Some(list) = with {
                *slot = list.clone();
            }
        }
        replace(&mut bundle.apps, &self.apps);
        replace(&mut bundle.rros, &self.rros);
        replace(&mut bundle.bpfs, &self.bpfs);
        replace(&mut bundle.prebuilts, &self.prebuilts);
        replace(&mut bundle.bootclasspath_fragments, &self.bootclasspath_fragments);
        replace(
            &mut bundle.systemserverclasspath_fragments,
            &self.systemserverclasspath_fragments,
        );

        if self.key.is_some() {
            bundle.key = self.key;
        }
        if self.certificate.is_some() {
            bundle.certificate = self.certificate;
        }
        if self.package_name.is_some() {
            bundle.package_name = self.package_name.clone();
        }
        bundle
    }
}
