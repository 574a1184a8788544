//! Bundle plans.
//!
//! A `BundlePlan` is everything the external packaging step needs to stage,
//! sign and link one bundle: the ordered payload, the native library lists
//! consumed by linker configuration, signing material and the membership
//! record.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::builder::payload::PayloadFile;
use crate::core::api_level::ApiLevel;
use crate::core::BundleError;
use crate::resolver::membership::ApexContents;
use crate::util::hash::Fingerprint;
use crate::util::Name;

/// Signing material resolved for a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KeyMaterial {
    Resolved {
        name: Name,
        #[serde(skip_serializing_if = "Option::is_none")]
        public: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        private: Option<PathBuf>,
    },
    /// Tolerated absence; packaging fails later through a deferred error.
    Missing { name: Name },
}

impl KeyMaterial {
    pub fn name(&self) -> Name {
        match self {
            KeyMaterial::Resolved { name, .. } | KeyMaterial::Missing { name } => *name,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, KeyMaterial::Missing { .. })
    }
}

/// The complete packaging plan of one bundle.
#[derive(Debug, Clone, Serialize)]
pub struct BundlePlan {
    pub bundle: Name,
    pub variation_name: Name,
    pub min_sdk: ApiLevel,
    pub updatable: bool,
    pub payload_type: String,
    /// Filesystem of image payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    pub files: Vec<PayloadFile>,
    pub provide_native_libs: Vec<String>,
    pub require_native_libs: Vec<String>,
    /// Platform modules that must be installed alongside the bundle.
    pub required_modules: Vec<Name>,
    pub jni_libs: Vec<String>,
    pub link_to_system_lib: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyMaterial>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<KeyMaterial>,
    #[serde(serialize_with = "serialize_contents")]
    pub contents: Arc<ApexContents>,
    /// Errors raised only when the bundle is actually packaged.
    #[serde(
        serialize_with = "serialize_errors",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub deferred_errors: Vec<BundleError>,
}

impl BundlePlan {
    pub fn new(bundle: Name, variation_name: Name, contents: Arc<ApexContents>) -> Self {
        BundlePlan {
            bundle,
            variation_name,
            min_sdk: ApiLevel::FUTURE,
            updatable: false,
            payload_type: "image".to_string(),
            fs_type: None,
            package_name: None,
            files: Vec::new(),
            provide_native_libs: Vec::new(),
            require_native_libs: Vec::new(),
            required_modules: Vec::new(),
            jni_libs: Vec::new(),
            link_to_system_lib: false,
            key: None,
            certificate: None,
            contents,
            deferred_errors: Vec::new(),
        }
    }

    /// Destination paths of every payload file, in payload order.
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(PayloadFile::path).collect()
    }

    pub fn file(&self, path: &str) -> Option<&PayloadFile> {
        self.files.iter().find(|f| f.path() == path)
    }

    /// Stable digest of the staged payload and linker lists.
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.update_str(&self.bundle).update_str(&self.payload_type);
        fp.update_opt(self.fs_type.as_deref());
        for file in &self.files {
            fp.update_str(&file.path())
                .update_str(&file.built_file.to_string_lossy())
                .update_bool(file.transitive)
                .update_bool(file.jni);
            fp.update_strs(file.symlinks.iter().map(String::as_str));
        }
        fp.update_strs(self.provide_native_libs.iter().map(String::as_str));
        fp.update_strs(self.require_native_libs.iter().map(String::as_str));
        fp.update_strs(self.required_modules.iter().map(Name::as_str));
        fp.update_bool(self.link_to_system_lib);
        fp.finish()
    }
}

fn serialize_contents<S: Serializer>(contents: &Arc<ApexContents>, s: S) -> Result<S::Ok, S::Error> {
    contents.as_ref().serialize(s)
}

fn serialize_errors<S: Serializer>(errors: &[BundleError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errors.iter().map(ToString::to_string))
}
