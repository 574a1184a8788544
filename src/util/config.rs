//! Configuration file support for Stowage.
//!
//! Stowage supports two configuration file locations:
//! - Global: `~/.stowage/config.toml` - User-wide defaults
//! - Project: `.stowage/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::api_level::ApiLevel;
use crate::core::target::{Arch, Target};

/// Build identifier used when none is configured.
pub const DEFAULT_BUILD_ID: &str = "dev";

/// Stowage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build-wide settings
    pub build: BuildConfig,

    /// Device targets, primary first
    pub targets: TargetsConfig,

    /// Extra allow-list entries, keyed by bundle name
    pub availability: BTreeMap<String, Vec<String>>,
}

/// Build-wide settings that influence planning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Build identifier appended to application install directories
    pub build_id: Option<String>,

    /// Building bundles without the platform image
    pub unbundled_build: bool,

    /// Whether the platform image is part of this build (defaults to true)
    pub platform_image: Option<bool>,

    /// Replace missing signing material with deferred errors
    pub allow_missing_dependencies: bool,

    /// Coverage-instrumented native code
    pub native_coverage: bool,

    /// Link bundled libraries to the system copy even for updatable image payloads
    pub force_symlink_optimization: bool,

    /// Raise every declared bundle minimum to at least this level
    pub min_sdk_override: Option<String>,

    /// Planning host-side bundles
    pub host: bool,
}

/// Device targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub arches: Vec<Arch>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        TargetsConfig {
            arches: vec![Arch::Arm64, Arch::Arm],
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.build_id.is_some() {
            self.build.build_id = other.build.build_id;
        }
        if other.build.unbundled_build {
            self.build.unbundled_build = true;
        }
        if other.build.platform_image.is_some() {
            self.build.platform_image = other.build.platform_image;
        }
        if other.build.allow_missing_dependencies {
            self.build.allow_missing_dependencies = true;
        }
        if other.build.native_coverage {
            self.build.native_coverage = true;
        }
        if other.build.force_symlink_optimization {
            self.build.force_symlink_optimization = true;
        }
        if other.build.min_sdk_override.is_some() {
            self.build.min_sdk_override = other.build.min_sdk_override;
        }
        if other.build.host {
            self.build.host = true;
        }

        if other.targets.arches != TargetsConfig::default().arches {
            self.targets = other.targets;
        }

        for (bundle, units) in other.availability {
            let entry = self.availability.entry(bundle).or_default();
            for unit in units {
                if !entry.contains(&unit) {
                    entry.push(unit);
                }
            }
        }
    }

    pub fn build_id(&self) -> &str {
        self.build.build_id.as_deref().unwrap_or(DEFAULT_BUILD_ID)
    }

    pub fn platform_image(&self) -> bool {
        self.build.platform_image.unwrap_or(true)
    }

    /// The configured minimum-version override, if it parses.
    pub fn min_sdk_override(&self) -> Option<ApiLevel> {
        self.build
            .min_sdk_override
            .as_deref()
            .and_then(|s| ApiLevel::parse(s).ok())
    }

    /// Device targets in declaration order.
    pub fn targets(&self) -> Vec<Target> {
        self.targets.arches.iter().copied().map(Target::new).collect()
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.stowage/config.toml)
/// 2. Global config (~/.stowage/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}

/// Get the global stowage config directory (~/.stowage).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".stowage"))
}

/// Get the global config path (~/.stowage/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.stowage/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".stowage").join("config.toml")
}

/// Load the merged configuration for a project rooted at `project_root`.
pub fn load_project_config(project_root: &Path) -> Config {
    let project = project_config_path(project_root);
    match global_config_path() {
        Some(global) => load_config(&global, &project),
        None => load_config(Path::new(""), &project),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.build_id(), DEFAULT_BUILD_ID);
        assert!(config.platform_image());
        assert!(!config.build.allow_missing_dependencies);
        assert_eq!(config.targets.arches, vec![Arch::Arm64, Arch::Arm]);
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[build]
build_id = "UQ1A.240105.004"
unbundled_build = true
min_sdk_override = "31"

[targets]
arches = ["x86_64"]

[availability]
"pkg.core" = ["libgrandfathered"]
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.build_id(), "UQ1A.240105.004");
        assert!(config.build.unbundled_build);
        assert_eq!(config.min_sdk_override(), Some(ApiLevel::new(31)));
        assert_eq!(config.targets.arches, vec![Arch::X86_64]);
        assert_eq!(
            config.availability.get("pkg.core"),
            Some(&vec!["libgrandfathered".to_string()])
        );
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.build.build_id = Some("base".to_string());
        base.build.native_coverage = true;
        base.availability
            .insert("pkg.core".to_string(), vec!["liba".to_string()]);

        let mut project = Config::default();
        project.build.build_id = Some("project".to_string());
        project.build.platform_image = Some(false);
        project
            .availability
            .insert("pkg.core".to_string(), vec!["liba".to_string(), "libb".to_string()]);

        base.merge(project);

        assert_eq!(base.build_id(), "project");
        assert!(base.build.native_coverage);
        assert!(!base.platform_image());
        assert_eq!(base.availability["pkg.core"], vec!["liba", "libb"]);
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_path = tmp.path().join("project.toml");

        std::fs::write(
            &global_path,
            "[build]\nbuild_id = \"global\"\nallow_missing_dependencies = true\n",
        )
        .unwrap();
        std::fs::write(&project_path, "[build]\nbuild_id = \"project\"\n").unwrap();

        let config = load_config(&global_path, &project_path);
        assert_eq!(config.build_id(), "project");
        assert!(config.build.allow_missing_dependencies);
    }

    #[test]
    fn test_invalid_override_is_ignored() {
        let mut config = Config::default();
        config.build.min_sdk_override = Some("not-a-level".to_string());
        assert_eq!(config.min_sdk_override(), None);
    }
}
