//! Install-path rules, one per unit kind.
//!
//! Each rule is a pure function of the unit and its kind-specific attributes.
//! `files_for` dispatches on the closed `UnitKind` enum, so adding a kind
//! without a rule does not compile.

use std::sync::LazyLock;

use regex::Regex;

use crate::builder::payload::{FileClass, PayloadFile};
use crate::core::unit::{
    is_bootstrap_library, App, Bpf, BootclasspathFragment, BuildUnit, CompatConfig, JavaLibrary,
    Linkage, NativeBinary, NativeLibrary, Prebuilt, Rro, ShBinary, SystemServerClasspathFragment,
    UnitKind,
};
use crate::core::BundleError;
use crate::util::Name;

static BUILD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.\-]+$").expect("build id pattern is valid"));

/// Bundle-wide inputs to the path rules.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub bundle: Name,
    pub build_id: &'a str,
    /// Re-home bootstrap runtime files under `bionic`.
    pub handle_special_libs: bool,
}

/// Check that the build id can be used as a directory suffix.
pub fn validate_build_id(bundle: Name, build_id: &str) -> Result<(), BundleError> {
    if BUILD_ID.is_match(build_id) {
        Ok(())
    } else {
        Err(BundleError::InvalidBuildId {
            bundle,
            build_id: build_id.to_string(),
        })
    }
}

/// Payload files produced by `unit`, in a fixed per-kind order.
pub fn files_for(ctx: &RuleContext<'_>, unit: &BuildUnit) -> Result<Vec<PayloadFile>, BundleError> {
    let files = match &unit.kind {
        UnitKind::NativeLibrary(lib) => match lib.linkage {
            Linkage::Shared => vec![native_library(ctx, unit, lib)],
            Linkage::Static => Vec::new(),
        },
        UnitKind::NativeBinary(bin) => vec![executable(ctx, unit, bin)],
        UnitKind::ShBinary(sh) => vec![sh_binary(unit, sh)],
        UnitKind::JavaLibrary(java) => java_library(ctx, unit, java)?,
        UnitKind::App(app) => self::app(ctx, unit, app)?,
        UnitKind::Rro(rro) => vec![self::rro(unit, rro)],
        UnitKind::Prebuilt(p) => vec![prebuilt(unit, p)],
        UnitKind::CompatConfig(c) => vec![compat_config(unit, c)],
        UnitKind::Filesystem => vec![PayloadFile::for_unit(unit, "etc/fs", FileClass::Etc)],
        UnitKind::Bpf(bpf) => self::bpf(unit, bpf),
        UnitKind::BootclasspathFragment(f) => bootclasspath_fragment(unit, f),
        UnitKind::SystemServerClasspathFragment(f) => systemserverclasspath_fragment(unit, f),
        UnitKind::Key(_) | UnitKind::Certificate(_) | UnitKind::Bundle(_) => Vec::new(),
    };
    Ok(files)
}

fn native_library(ctx: &RuleContext<'_>, unit: &BuildUnit, lib: &NativeLibrary) -> PayloadFile {
    let mut dir = unit
        .variant
        .arch()
        .map_or("lib", |arch| arch.lib_dir())
        .to_string();
    if let Some(bridge) = &lib.native_bridge {
        dir = format!("{dir}/{bridge}");
    }
    if ctx.handle_special_libs && is_bootstrap_library(unit.name.without_prebuilt_prefix()) {
        dir.push_str("/bionic");
    }
    if let Some(rel) = &lib.relative_install_path {
        dir = format!("{dir}/{rel}");
    }
    PayloadFile::for_unit(unit, dir, FileClass::NativeSharedLib)
}

fn executable(ctx: &RuleContext<'_>, unit: &BuildUnit, bin: &NativeBinary) -> PayloadFile {
    let mut dir = String::from("bin");
    if let Some(bridge) = &bin.native_bridge {
        dir = format!("{dir}/{bridge}");
    }
    if ctx.handle_special_libs && is_bootstrap_library(unit.name.without_prebuilt_prefix()) {
        dir.push_str("/bionic");
    }
    if let Some(rel) = &bin.relative_install_path {
        dir = format!("{dir}/{rel}");
    }
    let class = if bin.test {
        FileClass::NativeTest
    } else {
        FileClass::Executable
    };
    let mut file = PayloadFile::for_unit(unit, dir, class).with_symlinks(&bin.symlinks);
    file.data_paths = bin.data.clone();
    file
}

fn sh_binary(unit: &BuildUnit, sh: &ShBinary) -> PayloadFile {
    let dir = match &sh.sub_dir {
        Some(sub) => format!("bin/{sub}"),
        None => "bin".to_string(),
    };
    PayloadFile::for_unit(unit, dir, FileClass::ShBinary).with_symlinks(&sh.symlinks)
}

fn java_library(
    ctx: &RuleContext<'_>,
    unit: &BuildUnit,
    java: &JavaLibrary,
) -> Result<Vec<PayloadFile>, BundleError> {
    let Some(dex) = &java.dex_jar else {
        return Err(BundleError::MissingDex {
            bundle: ctx.bundle,
            module: unit.name,
        });
    };
    let stem = java
        .stem
        .clone()
        .unwrap_or_else(|| unit.name.without_prebuilt_prefix().to_string());

    let mut jar = PayloadFile::new(dex, unit.name, "javalib", FileClass::JavaSharedLib)
        .with_stem(format!("{stem}.jar"));
    jar.required = unit.required.clone();
    let mut files = vec![jar];
    if let Some(profile) = &java.profile {
        files.push(
            PayloadFile::new(profile, unit.name, "javalib", FileClass::Etc)
                .with_stem(format!("{stem}.jar.prof")),
        );
    }
    Ok(files)
}

fn app(ctx: &RuleContext<'_>, unit: &BuildUnit, app: &App) -> Result<Vec<PayloadFile>, BundleError> {
    validate_build_id(ctx.bundle, ctx.build_id)?;
    let apk_name = app.apk_name.as_deref().unwrap_or(unit.name.as_str());
    let base = if app.privileged { "priv-app" } else { "app" };
    let dir = format!("{base}/{apk_name}@{}", ctx.build_id);

    let mut files = vec![PayloadFile::for_unit(unit, dir, FileClass::App)];
    if let Some(allowlist) = &app.privapp_allowlist {
        let package = app.package_name.as_deref().unwrap_or(unit.name.as_str());
        files.push(
            PayloadFile::new(allowlist, unit.name, "etc/permissions", FileClass::Etc)
                .with_stem(format!("privapp_allowlist_{package}.xml")),
        );
    }
    Ok(files)
}

fn rro(unit: &BuildUnit, rro: &Rro) -> PayloadFile {
    let dir = match &rro.theme {
        Some(theme) => format!("overlay/{theme}"),
        None => "overlay".to_string(),
    };
    PayloadFile::for_unit(unit, dir, FileClass::App)
}

fn prebuilt(unit: &BuildUnit, p: &Prebuilt) -> PayloadFile {
    let base = p.base_dir.as_deref().unwrap_or("etc");
    let dir = match &p.sub_dir {
        Some(sub) => format!("{base}/{sub}"),
        None => base.to_string(),
    };
    let file = PayloadFile::for_unit(unit, dir, FileClass::Etc);
    match &p.filename {
        Some(name) => file.with_stem(name.clone()),
        None => file,
    }
}

fn compat_config(unit: &BuildUnit, c: &CompatConfig) -> PayloadFile {
    let sub = c.sub_dir.as_deref().unwrap_or("compatconfig");
    PayloadFile::for_unit(unit, format!("etc/{sub}"), FileClass::Etc)
}

fn bpf(unit: &BuildUnit, bpf: &Bpf) -> Vec<PayloadFile> {
    let dir = match &bpf.sub_dir {
        Some(sub) => format!("etc/bpf/{sub}"),
        None => "etc/bpf".to_string(),
    };
    if bpf.outputs.is_empty() {
        return vec![PayloadFile::for_unit(unit, dir, FileClass::Etc)];
    }
    bpf.outputs
        .iter()
        .map(|out| PayloadFile::new(out, unit.name, dir.clone(), FileClass::Etc))
        .collect()
}

fn bootclasspath_fragment(unit: &BuildUnit, f: &BootclasspathFragment) -> Vec<PayloadFile> {
    let mut files: Vec<PayloadFile> = f
        .boot_image
        .iter()
        .map(|(arch, path)| {
            PayloadFile::new(path, unit.name, format!("javalib/{arch}"), FileClass::Etc)
        })
        .collect();
    if let Some(proto) = &f.classpaths_proto {
        files.push(
            PayloadFile::new(proto, unit.name, "etc/classpaths", FileClass::Etc)
                .with_stem("bootclasspath.pb"),
        );
    }
    files
}

fn systemserverclasspath_fragment(
    unit: &BuildUnit,
    f: &SystemServerClasspathFragment,
) -> Vec<PayloadFile> {
    f.classpaths_proto
        .iter()
        .map(|proto| {
            PayloadFile::new(proto, unit.name, "etc/classpaths", FileClass::Etc)
                .with_stem("systemserverclasspath.pb")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::target::{Arch, Variant};

    fn ctx() -> RuleContext<'static> {
        RuleContext {
            bundle: Name::new("pkg.core"),
            build_id: "dev",
            handle_special_libs: true,
        }
    }

    fn unit(name: &str, kind: UnitKind, variant: Variant) -> BuildUnit {
        BuildUnit::new(name, kind, variant)
    }

    fn paths(files: &[PayloadFile]) -> Vec<String> {
        files.iter().map(PayloadFile::path).collect()
    }

    #[test]
    fn test_native_library_dirs() {
        let lib = NativeLibrary {
            relative_install_path: Some("hw".to_string()),
            ..NativeLibrary::default()
        };
        let wide = unit("libfoo", UnitKind::NativeLibrary(lib.clone()), Variant::Arch(Arch::Arm64));
        let narrow = unit("libfoo", UnitKind::NativeLibrary(lib), Variant::Arch(Arch::Arm));

        assert_eq!(paths(&files_for(&ctx(), &wide).unwrap()), vec!["lib64/hw/libfoo.so"]);
        assert_eq!(paths(&files_for(&ctx(), &narrow).unwrap()), vec!["lib/hw/libfoo.so"]);
    }

    #[test]
    fn test_bootstrap_library_rehomed_unless_opted_out() {
        let libc = unit(
            "libc",
            UnitKind::NativeLibrary(NativeLibrary::default()),
            Variant::Arch(Arch::Arm64),
        );
        assert_eq!(paths(&files_for(&ctx(), &libc).unwrap()), vec!["lib64/bionic/libc.so"]);

        let plain = RuleContext {
            handle_special_libs: false,
            ..ctx()
        };
        assert_eq!(paths(&files_for(&plain, &libc).unwrap()), vec!["lib64/libc.so"]);
    }

    #[test]
    fn test_native_bridge_segment() {
        let lib = NativeLibrary {
            native_bridge: Some("arm64".to_string()),
            ..NativeLibrary::default()
        };
        let u = unit("libfoo", UnitKind::NativeLibrary(lib), Variant::Arch(Arch::X86_64));
        assert_eq!(paths(&files_for(&ctx(), &u).unwrap()), vec!["lib64/arm64/libfoo.so"]);
    }

    #[test]
    fn test_static_library_has_no_payload() {
        let lib = NativeLibrary {
            linkage: Linkage::Static,
            ..NativeLibrary::default()
        };
        let u = unit("libstatic", UnitKind::NativeLibrary(lib), Variant::Arch(Arch::Arm64));
        assert!(files_for(&ctx(), &u).unwrap().is_empty());
    }

    #[test]
    fn test_executable_symlinks_and_test_class() {
        let bin = NativeBinary {
            symlinks: vec!["ls".to_string()],
            ..NativeBinary::default()
        };
        let u = unit("toybox", UnitKind::NativeBinary(bin), Variant::Arch(Arch::Arm64));
        let files = files_for(&ctx(), &u).unwrap();
        assert_eq!(paths(&files), vec!["bin/toybox"]);
        assert_eq!(files[0].symlink_paths(), vec!["bin/ls"]);
        assert_eq!(files[0].class, FileClass::Executable);

        let test = NativeBinary {
            test: true,
            ..NativeBinary::default()
        };
        let u = unit("foo_test", UnitKind::NativeBinary(test), Variant::Arch(Arch::Arm64));
        assert_eq!(files_for(&ctx(), &u).unwrap()[0].class, FileClass::NativeTest);
    }

    #[test]
    fn test_java_library_with_profile() {
        let java = JavaLibrary {
            stem: None,
            dex_jar: Some(PathBuf::from("out/dex/framework-foo.jar")),
            profile: Some(PathBuf::from("out/prof/primary.prof")),
        };
        let u = unit("framework-foo", UnitKind::JavaLibrary(java), Variant::Common);
        assert_eq!(
            paths(&files_for(&ctx(), &u).unwrap()),
            vec!["javalib/framework-foo.jar", "javalib/framework-foo.jar.prof"]
        );
    }

    #[test]
    fn test_java_library_without_dex_fails() {
        let u = unit("framework-foo", UnitKind::JavaLibrary(JavaLibrary::default()), Variant::Common);
        assert!(matches!(
            files_for(&ctx(), &u),
            Err(BundleError::MissingDex { .. })
        ));
    }

    #[test]
    fn test_app_dir_carries_build_id() {
        let app = App {
            privileged: true,
            package_name: Some("com.example.app".to_string()),
            privapp_allowlist: Some(PathBuf::from("allowlist.xml")),
            ..App::default()
        };
        let u = unit("ExampleApp", UnitKind::App(app), Variant::Common);
        assert_eq!(
            paths(&files_for(&ctx(), &u).unwrap()),
            vec![
                "priv-app/ExampleApp@dev/ExampleApp.apk",
                "etc/permissions/privapp_allowlist_com.example.app.xml"
            ]
        );

        let bad = RuleContext {
            build_id: "has space",
            ..ctx()
        };
        assert!(matches!(
            files_for(&bad, &u),
            Err(BundleError::InvalidBuildId { .. })
        ));
    }

    #[test]
    fn test_data_file_dirs() {
        let p = Prebuilt {
            sub_dir: Some("init".to_string()),
            ..Prebuilt::default()
        };
        let u = unit("foo.rc", UnitKind::Prebuilt(p), Variant::Common);
        assert_eq!(paths(&files_for(&ctx(), &u).unwrap()), vec!["etc/init/foo.rc"]);

        let fs = unit("fsimg", UnitKind::Filesystem, Variant::Common);
        assert_eq!(paths(&files_for(&ctx(), &fs).unwrap()), vec!["etc/fs/fsimg.img"]);

        let compat = unit("compat", UnitKind::CompatConfig(CompatConfig::default()), Variant::Common);
        assert_eq!(
            paths(&files_for(&ctx(), &compat).unwrap()),
            vec!["etc/compatconfig/compat.xml"]
        );
    }

    #[test]
    fn test_classpath_fragments() {
        let f = BootclasspathFragment {
            boot_image: vec![(Arch::Arm64, PathBuf::from("out/boot.art"))],
            classpaths_proto: Some(PathBuf::from("out/classpaths.pb")),
        };
        let u = unit("bcp", UnitKind::BootclasspathFragment(f), Variant::Common);
        assert_eq!(
            paths(&files_for(&ctx(), &u).unwrap()),
            vec!["javalib/arm64/boot.art", "etc/classpaths/bootclasspath.pb"]
        );
    }
}
