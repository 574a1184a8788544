//! Payload file entries.
//!
//! A `PayloadFile` is one artifact staged into a bundle image. Entries are
//! collected in walk order and then deduplicated and sorted by destination so
//! that the final list does not depend on graph visitation order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::unit::{BuildUnit, DataPath};
use crate::core::BundleError;
use crate::util::Name;

/// How the packaging step treats a payload file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileClass {
    NativeSharedLib,
    Executable,
    ShBinary,
    JavaSharedLib,
    App,
    Etc,
    NativeTest,
}

/// One file staged into the bundle payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadFile {
    /// Built artifact on disk.
    pub built_file: PathBuf,
    /// Directory inside the payload, relative to its root.
    pub install_dir: String,
    /// File name inside `install_dir`.
    pub stem: String,
    pub class: FileClass,
    pub module_name: Name,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub symlinks: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_paths: Vec<DataPath>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<Name>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub target_required: Vec<Name>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host_required: Vec<Name>,
    /// Reached through another member rather than listed by the bundle.
    pub transitive: bool,
    pub jni: bool,
}

impl PayloadFile {
    pub fn new(
        built_file: impl Into<PathBuf>,
        module_name: Name,
        install_dir: impl Into<String>,
        class: FileClass,
    ) -> Self {
        let built_file = built_file.into();
        let stem = base_name(&built_file);
        PayloadFile {
            built_file,
            install_dir: install_dir.into(),
            stem,
            class,
            module_name,
            symlinks: Vec::new(),
            data_paths: Vec::new(),
            required: Vec::new(),
            target_required: Vec::new(),
            host_required: Vec::new(),
            transitive: false,
            jni: false,
        }
    }

    /// Entry for the primary artifact of `unit`, carrying its install requirements.
    pub fn for_unit(unit: &BuildUnit, install_dir: impl Into<String>, class: FileClass) -> Self {
        let mut file = PayloadFile::new(unit.output_path(), unit.name, install_dir, class);
        file.required = unit.required.clone();
        file.target_required = unit.target_required.clone();
        file.host_required = unit.host_required.clone();
        file
    }

    pub fn with_stem(mut self, stem: impl Into<String>) -> Self {
        self.stem = stem.into();
        self
    }

    pub fn with_symlinks(mut self, symlinks: &[String]) -> Self {
        self.symlinks = symlinks.to_vec();
        self
    }

    /// Destination path inside the payload.
    pub fn path(&self) -> String {
        join(&self.install_dir, &self.stem)
    }

    /// Destinations of the declared symlinks, next to the file itself.
    pub fn symlink_paths(&self) -> Vec<String> {
        self.symlinks
            .iter()
            .map(|link| join(&self.install_dir, link))
            .collect()
    }

    /// Identity used to collapse duplicate entries.
    pub fn dedup_key(&self) -> (String, String) {
        (self.install_dir.clone(), base_name(&self.built_file))
    }
}

/// Join payload path segments, skipping empty ones.
pub fn join(dir: &str, name: &str) -> String {
    let parts: Vec<&str> = dir
        .split('/')
        .chain(name.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    parts.join("/")
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Collapse duplicate entries and sort by destination path.
///
/// Entries sharing a dedup key must come from the same artifact when `strict`
/// is set. Merged entries are direct if either one is, and JNI if either one is.
/// Two different artifacts never share a destination; when `strict` is unset
/// the first one wins.
pub fn dedup_and_sort(
    bundle: Name,
    files: Vec<PayloadFile>,
    strict: bool,
) -> Result<Vec<PayloadFile>, Vec<BundleError>> {
    let mut errors = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut dests: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<PayloadFile> = Vec::with_capacity(files.len());

    for file in files {
        let dest = file.path();
        let existing = index
            .get(&file.dedup_key())
            .or_else(|| dests.get(&dest))
            .copied();
        match existing {
            Some(i) => {
                let existing = &mut merged[i];
                if existing.built_file != file.built_file {
                    if strict {
                        errors.push(BundleError::PayloadConflict {
                            bundle,
                            dest: existing.path(),
                            first: existing.built_file.clone(),
                            second: file.built_file,
                        });
                    }
                    continue;
                }
                existing.transitive &= file.transitive;
                existing.jni |= file.jni;
            }
            None => {
                index.insert(file.dedup_key(), merged.len());
                dests.insert(dest, merged.len());
                merged.push(file);
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    merged.sort_by(|a, b| {
        a.path()
            .cmp(&b.path())
            .then_with(|| a.built_file.cmp(&b.built_file))
    });
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(built: &str, dir: &str) -> PayloadFile {
        PayloadFile::new(built, Name::new("m"), dir, FileClass::NativeSharedLib)
    }

    #[test]
    fn test_path_joins_segments() {
        assert_eq!(file("out/libfoo.so", "lib64").path(), "lib64/libfoo.so");
        assert_eq!(file("out/foo.conf", "").path(), "foo.conf");
        assert_eq!(join("etc/", "/x.xml"), "etc/x.xml");
    }

    #[test]
    fn test_direct_and_jni_win_on_merge() {
        let mut a = file("out/libfoo.so", "lib64");
        a.transitive = true;
        let mut b = file("out/libfoo.so", "lib64");
        b.jni = true;

        let files = dedup_and_sort(Name::new("pkg"), vec![a, b], true).unwrap();
        assert_eq!(files.len(), 1);
        assert!(!files[0].transitive);
        assert!(files[0].jni);
    }

    #[test]
    fn test_conflicting_artifacts_rejected_when_strict() {
        let a = file("out/a/libfoo.so", "lib64");
        let b = file("out/b/libfoo.so", "lib64");

        let errors = dedup_and_sort(Name::new("pkg"), vec![a.clone(), b.clone()], true).unwrap_err();
        assert!(matches!(
            &errors[0],
            BundleError::PayloadConflict { dest, .. } if dest == "lib64/libfoo.so"
        ));

        let files = dedup_and_sort(Name::new("pkg"), vec![a, b], false).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].built_file, PathBuf::from("out/a/libfoo.so"));
    }

    #[test]
    fn test_renamed_artifacts_cannot_share_destination() {
        let a = file("out/a/a.jar", "javalib").with_stem("framework.jar");
        let b = file("out/b/b.jar", "javalib").with_stem("framework.jar");

        let errors = dedup_and_sort(Name::new("pkg"), vec![a.clone(), b.clone()], true).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            BundleError::PayloadConflict { dest, first, second, .. }
                if dest == "javalib/framework.jar"
                    && first == Path::new("out/a/a.jar")
                    && second == Path::new("out/b/b.jar")
        ));

        let files = dedup_and_sort(Name::new("pkg"), vec![a, b], false).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].built_file, PathBuf::from("out/a/a.jar"));
    }

    #[test]
    fn test_sorted_by_destination() {
        let files = vec![
            file("out/libz.so", "lib64"),
            file("out/bin1", "bin"),
            file("out/liba.so", "lib64"),
        ];
        let sorted = dedup_and_sort(Name::new("pkg"), files, true).unwrap();
        let paths: Vec<_> = sorted.iter().map(PayloadFile::path).collect();
        assert_eq!(paths, vec!["bin/bin1", "lib64/liba.so", "lib64/libz.so"]);
    }

    #[test]
    fn test_symlink_paths() {
        let f = file("out/toybox", "bin").with_symlinks(&["ls".to_string(), "cat".to_string()]);
        assert_eq!(f.symlink_paths(), vec!["bin/ls", "bin/cat"]);
    }
}
