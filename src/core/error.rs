//! Bundle planning errors and diagnostics.
//!
//! Every failure belongs to one bundle. Errors never stop other bundles from
//! being planned; they are collected per bundle into `BundleErrors`.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::api_level::ApiLevel;
use crate::core::tag::DependencyTag;
use crate::core::target::Variant;
use crate::core::walk::DependencyPath;
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::Name;

/// Broad classification of a bundle error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing declared property.
    Configuration,
    /// The graph contradicts itself (conflicting payload files, illegal links).
    GraphConsistency,
    /// A unit violates an opt-in or version policy.
    Policy,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::GraphConsistency => write!(f, "graph consistency"),
            ErrorKind::Policy => write!(f, "policy"),
        }
    }
}

#[derive(Debug, Clone, Error, MietteDiagnostic)]
pub enum BundleError {
    #[error("bundle `{bundle}` does not declare a signing `key`")]
    #[diagnostic(code(stowage::config::missing_key))]
    MissingKey { bundle: Name },

    #[error("signing key `{key}` of bundle `{bundle}` is not available in this build")]
    #[diagnostic(code(stowage::config::key_unavailable))]
    KeyUnavailable { bundle: Name, key: Name },

    #[error("`{bundle}` lists `{dep}` in `{property}`, but there is no {variant} unit with that name")]
    #[diagnostic(code(stowage::config::unresolved_dependency))]
    UnresolvedDependency {
        bundle: Name,
        property: &'static str,
        dep: Name,
        variant: Variant,
    },

    #[error("`{dep}` in `{property}` of `{bundle}` is a {found}, expected {expected}")]
    #[diagnostic(code(stowage::config::wrong_kind))]
    WrongDependencyKind {
        bundle: Name,
        property: &'static str,
        dep: Name,
        expected: &'static str,
        found: &'static str,
    },

    #[error("`{bundle}`: invalid {property} \"{value}\", expected {expected}")]
    #[diagnostic(code(stowage::config::invalid_property))]
    InvalidProperty {
        bundle: Name,
        property: &'static str,
        value: String,
        expected: String,
    },

    #[error("`{bundle}`: unable to use build id \"{build_id}\" as filename suffix")]
    #[diagnostic(
        code(stowage::config::build_id),
        help("valid characters are [a-z A-Z 0-9 _ . -]")
    )]
    InvalidBuildId { bundle: Name, build_id: String },

    #[error("`{bundle}`: tests can only be listed by test bundles")]
    #[diagnostic(code(stowage::config::tests_in_non_test_bundle))]
    TestsInNonTestBundle { bundle: Name },

    #[error("`{bundle}`: updatable bundle {reason}")]
    #[diagnostic(code(stowage::config::updatable))]
    Updatable { bundle: Name, reason: String },

    #[error("`{bundle}`: `{module}` is not configured to be compiled into dex")]
    #[diagnostic(code(stowage::config::missing_dex))]
    MissingDex { bundle: Name, module: Name },

    #[error("unit `{name}` ({variant}) is declared more than once")]
    #[diagnostic(code(stowage::config::duplicate_unit))]
    DuplicateUnit { name: Name, variant: Variant },

    #[error("`{bundle}`: conflicting payload files for {dest}: {first} and {second}")]
    #[diagnostic(
        code(stowage::payload::conflict),
        help("two different artifacts would be installed at the same path")
    )]
    PayloadConflict {
        bundle: Name,
        dest: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("`{bundle}`: \"{library}\" required by \"{consumer}\" is a native library providing stub. It shouldn't be included in this bundle via static linking")]
    #[diagnostic(code(stowage::payload::static_link_to_stub))]
    StaticLinkToStub {
        bundle: Name,
        library: Name,
        consumer: Name,
        path: DependencyPath,
    },

    #[error("`{bundle}`: unexpected tag {tag} for indirect dependency \"{module}\"")]
    #[diagnostic(code(stowage::payload::unexpected_tag))]
    UnexpectedIndirectTag {
        bundle: Name,
        tag: DependencyTag,
        module: Name,
    },

    #[error("`{bundle}`: \"{unit}\" requires \"{dep}\" that doesn't list the bundle under 'apex_available'")]
    #[diagnostic(code(stowage::policy::not_available))]
    NotAvailable {
        bundle: Name,
        unit: Name,
        dep: Name,
        path: DependencyPath,
    },

    #[error("`{bundle}`: module \"{unit}\" should support min_sdk_version({required}), but its min_sdk_version is {unit_min}")]
    #[diagnostic(code(stowage::policy::min_sdk))]
    MinSdk {
        bundle: Name,
        unit: Name,
        unit_min: ApiLevel,
        required: ApiLevel,
        path: DependencyPath,
    },

    #[error("`{bundle}`: executable `{module}` is static")]
    #[diagnostic(
        code(stowage::policy::static_executable),
        help("static executables cannot share the bundle's runtime")
    )]
    StaticExecutable { bundle: Name, module: Name },

    #[error("`{bundle}`: use_vndk_as_stable is only supported on vendor bundles")]
    #[diagnostic(code(stowage::policy::use_vndk_as_stable))]
    VndkAsStableOnSystem { bundle: Name },
}

impl BundleError {
    pub fn kind(&self) -> ErrorKind {
        use BundleError::*;
        match self {
            MissingKey { .. }
            | KeyUnavailable { .. }
            | UnresolvedDependency { .. }
            | WrongDependencyKind { .. }
            | InvalidProperty { .. }
            | InvalidBuildId { .. }
            | TestsInNonTestBundle { .. }
            | Updatable { .. }
            | MissingDex { .. }
            | DuplicateUnit { .. } => ErrorKind::Configuration,
            PayloadConflict { .. } | StaticLinkToStub { .. } | UnexpectedIndirectTag { .. } => {
                ErrorKind::GraphConsistency
            }
            NotAvailable { .. }
            | MinSdk { .. }
            | StaticExecutable { .. }
            | VndkAsStableOnSystem { .. } => ErrorKind::Policy,
        }
    }

    /// The dependency path attached to the error, if any.
    pub fn path(&self) -> Option<&DependencyPath> {
        match self {
            BundleError::StaticLinkToStub { path, .. }
            | BundleError::NotAvailable { path, .. }
            | BundleError::MinSdk { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag =
            Diagnostic::error(self.to_string()).with_context(format!("{} error", self.kind()));

        if let Some(path) = self.path() {
            diag = diag
                .with_context("dependency path:")
                .with_context_lines(&path.to_string());
        }

        match self {
            BundleError::MissingKey { bundle } => diag.with_suggestion(format!(
                "add `key = \"{bundle}.key\"` and declare a key unit with that name"
            )),
            BundleError::KeyUnavailable { .. } => diag.with_suggestion(
                "build without `allow_missing_dependencies` to see the real failure",
            ),
            BundleError::UnresolvedDependency { .. } => {
                diag.with_suggestion(suggestions::UNKNOWN_UNIT)
            }
            BundleError::InvalidProperty { property, .. } => {
                diag.with_suggestion(format!("fix the `{property}` property"))
            }
            BundleError::PayloadConflict { .. } => diag
                .with_suggestion("rename one of the units or give it a different install directory")
                .with_suggestion("set `strict_payload_check = false` if the difference is expected"),
            BundleError::StaticLinkToStub { library, .. } => diag.with_suggestion(format!(
                "link \"{library}\" dynamically so the stub satisfies the dependency"
            )),
            BundleError::NotAvailable {
                bundle, dep, ..
            } => diag
                .with_suggestion(format!(
                    "add \"{bundle}\" to 'apex_available' property of \"{dep}\""
                ))
                .with_suggestion(suggestions::PREBUILT_PREFIX),
            BundleError::MinSdk { unit, required, .. } => diag.with_suggestion(format!(
                "lower the `min_sdk_version` of \"{unit}\" to {required}, or raise the minimum of the unit that depends on it"
            )),
            BundleError::Updatable { .. } => {
                diag.with_suggestion("set `updatable = false` if the bundle is not updated independently")
            }
            _ => diag,
        }
    }
}

/// Every error found while planning one bundle.
#[derive(Debug, Clone, Default)]
pub struct BundleErrors {
    pub bundle: Name,
    pub errors: Vec<BundleError>,
}

impl BundleErrors {
    pub fn new(bundle: Name) -> Self {
        BundleErrors {
            bundle,
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, error: BundleError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BundleError> {
        self.errors.iter()
    }

    /// `Ok(value)` if no errors were collected.
    pub fn into_result<T>(self, value: T) -> Result<T, BundleErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl Extend<BundleError> for BundleErrors {
    fn extend<I: IntoIterator<Item = BundleError>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

impl fmt::Display for BundleErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bundle `{}` failed with {} error{}",
            self.bundle,
            self.errors.len(),
            if self.errors.len() == 1 { "" } else { "s" }
        )?;
        for error in &self.errors {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BundleErrors {}
