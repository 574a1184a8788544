//! Graph file fixtures for common test scenarios.

/// `pkg.core` bundles `libfoo` and `bin1`; `libfoo` links the stub provider
/// `libbar`, which lives outside the bundle.
pub const CORE_GRAPH: &str = r#"
[[bundle]]
name = "pkg.core"
key = "pkg.core.key"
min_sdk_version = 29
native_shared_libs = ["libfoo"]
binaries = ["bin1"]

[[unit]]
name = "libfoo"
kind = "native_library"
shared_libs = ["libbar"]
apex_available = ["pkg.core"]

[[unit]]
name = "libbar"
kind = "native_library"
has_stubs = true

[[unit]]
name = "bin1"
kind = "native_binary"
apex_available = ["pkg.core"]

[[unit]]
name = "pkg.core.key"
kind = "key"
public = "keys/pkg.core.avbpubkey"
private = "keys/pkg.core.pem"
"#;

/// Two bundles sharing `libshared`; `libnew` raises its minimum above the
/// bundle's and `libhidden` never opts in.
pub const BROKEN_GRAPH: &str = r#"
[[bundle]]
name = "pkg.a"
key = "pkg.a.key"
min_sdk_version = 29
native_shared_libs = ["libshared", "libnew"]

[[bundle]]
name = "pkg.b"
key = "pkg.b.key"
min_sdk_version = 29
native_shared_libs = ["libshared"]

[[unit]]
name = "libshared"
kind = "native_library"
apex_available = ["pkg.a", "pkg.b"]
static_libs = ["libhidden"]

[[unit]]
name = "libhidden"
kind = "native_library"
linkage = "static"

[[unit]]
name = "libnew"
kind = "native_library"
min_sdk_version = 31
apex_available = ["pkg.a"]

[[unit]]
name = "pkg.a.key"
kind = "key"

[[unit]]
name = "pkg.b.key"
kind = "key"
"#;
