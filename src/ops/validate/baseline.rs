//! Grandfathered availability.
//!
//! Units listed here may be included in a bundle without naming it in their
//! own availability set. The built-in table is constructed once and never
//! mutated; project configuration can only add to a copy of it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::core::unit::AVAILABLE_ANYAPEX;
use crate::util::interning::PREBUILT_PREFIX;

static BUILTIN: LazyLock<Baseline> = LazyLock::new(|| {
    let mut baseline = Baseline::default();
    baseline.extend(
        "com.android.appsearch",
        ["icing-java-proto-lite", "libprotobuf-java-lite"],
    );
    baseline.extend(
        "com.android.cellbroadcast",
        ["CellBroadcastApp", "CellBroadcastServiceModule"],
    );
    baseline.extend(
        "com.android.extservices",
        [
            "error_prone_annotations",
            "ExtServices-core",
            "ExtServices",
            "libtextclassifier-java",
            "libz_current",
            "textclassifier-statsd",
        ],
    );
    baseline.extend(
        "com.android.mediaprovider",
        [
            "MediaProvider",
            "MediaProviderGoogle",
            "fmtlib_ndk",
            "libbase_ndk",
            "libfuse",
            "libfuse_jni",
        ],
    );
    baseline.extend(
        "com.android.neuralnetworks",
        [
            "android.hidl.allocator@1.0",
            "android.hidl.memory.token@1.0",
            "android.hidl.memory@1.0",
            "libarect",
            "libbuildversion",
            "libmath",
            "libprocpartition",
        ],
    );
    baseline.extend(
        "com.android.runtime",
        [
            "bionic_libc_platform_headers",
            "libc_bionic",
            "libc_bootstrap",
            "libc_common",
            "libc_dns",
            "libc_fortify",
            "libc_init_dynamic",
            "libc_init_static",
            "libc_syscalls",
            "libdebuggerd",
            "libdebuggerd_handler_core",
            "libdl_static",
            "libjemalloc5",
            "liblinker_main",
            "liblinker_malloc",
            "liblz4",
            "liblzma",
            "libprocinfo",
            "libpropertyinfoparser",
            "libscudo",
            "libsystemproperties",
            "libunwindstack",
            "libz",
            "libziparchive",
        ],
    );
    baseline.extend("com.android.os.statsd", ["libstatssocket"]);
    baseline.extend(
        "com.android.wifi",
        [
            "PlatformProperties",
            "bouncycastle-unbundled",
            "error_prone_annotations",
            "ksoap2",
            "libnanohttpd",
            "libwifi-jni",
            "netlink-client",
            "services.net",
            "wifi-lite-protos",
            "wifi-nano-protos",
        ],
    );
    baseline.extend(
        AVAILABLE_ANYAPEX,
        [
            "androidx",
            "com.google.android.material_material",
            "libclang_rt",
            "libprofile-clang-extras",
            "libprofile-extras",
            "libunwind",
        ],
    );
    baseline
});

/// Collapse unit names that the table lists under one canonical entry.
pub fn normalize_unit_name(name: &str) -> &str {
    let name = name.strip_prefix(PREBUILT_PREFIX).unwrap_or(name);
    if name.starts_with("libclang_rt.") {
        "libclang_rt"
    } else if name.starts_with("androidx.") {
        "androidx"
    } else {
        name
    }
}

/// Bundle name to grandfathered unit names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl Baseline {
    /// The built-in table.
    pub fn builtin() -> &'static Baseline {
        &BUILTIN
    }

    /// The built-in table plus project entries.
    pub fn with_extra(extra: &BTreeMap<String, Vec<String>>) -> Baseline {
        let mut baseline = Baseline::builtin().clone();
        for (bundle, units) in extra {
            baseline.extend(bundle, units.iter().map(String::as_str));
        }
        baseline
    }

    fn extend<'a>(&mut self, bundle: &str, units: impl IntoIterator<Item = &'a str>) {
        self.entries
            .entry(bundle.to_string())
            .or_default()
            .extend(units.into_iter().map(|u| normalize_unit_name(u).to_string()));
    }

    /// Whether `unit` is grandfathered into `bundle`, directly or through the
    /// any-bundle bucket.
    pub fn allows(&self, bundle: &str, unit: &str) -> bool {
        let unit = normalize_unit_name(unit);
        [bundle, AVAILABLE_ANYAPEX].iter().any(|key| {
            self.entries
                .get(*key)
                .is_some_and(|units| units.contains(unit))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
