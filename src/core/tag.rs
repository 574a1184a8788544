//! Dependency tags.
//!
//! Every edge in the unit graph carries a tag. Tags on edges leaving a bundle
//! say how the child enters the payload (or that it does not, for signing
//! material and test relationships). Tags on edges between ordinary units say
//! how the consumer uses the provider, which decides whether the provider is
//! pulled into the payload transitively.

use std::fmt;

use serde::Serialize;

/// The identity of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    // Edges leaving a bundle.
    SharedLib,
    JniLib,
    Executable,
    ShBinary,
    JavaLib,
    App,
    Rro,
    Bpf,
    Filesystem,
    Prebuilt,
    CompatConfig,
    Test,
    BootclasspathFragment,
    SystemServerClasspathFragment,
    Key,
    Certificate,

    /// Unit declares it tests a bundle.
    TestFor,

    // Edges between units.
    Shared,
    Static,
    Runtime,
    Header,
    Jni,
    Java,
    PermissionsXml,
    FragmentContent,
    HostTool,
}

/// A typed edge label with its per-edge flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyTag {
    pub kind: TagKind,
}

impl DependencyTag {
    pub const fn new(kind: TagKind) -> Self {
        DependencyTag { kind }
    }

    /// The child's artifact is physically placed in the payload.
    pub fn payload(self) -> bool {
        use TagKind::*;
        matches!(
            self.kind,
            SharedLib
                | JniLib
                | Executable
                | ShBinary
                | JavaLib
                | App
                | Rro
                | Bpf
                | Filesystem
                | Prebuilt
                | CompatConfig
                | Test
                | BootclasspathFragment
                | SystemServerClasspathFragment
        )
    }

    /// A prebuilt substitute cannot satisfy this edge.
    pub fn source_only(self) -> bool {
        matches!(
            self.kind,
            TagKind::BootclasspathFragment
                | TagKind::SystemServerClasspathFragment
                | TagKind::CompatConfig
        )
    }

    /// The child needs a variant matching the parent's bundle even when it
    /// would not otherwise be considered part of the same package.
    pub fn always_require_variant(self) -> bool {
        matches!(self.kind, TagKind::TestFor | TagKind::FragmentContent)
    }

    /// The walk stops at this edge; its child never contributes to contents.
    pub fn excluded_from_contents(self) -> bool {
        self.kind == TagKind::HostTool
    }

    /// Tags that only ever appear on edges leaving a bundle.
    pub fn is_bundle_tag(self) -> bool {
        self.payload()
            || matches!(
                self.kind,
                TagKind::Key | TagKind::Certificate | TagKind::TestFor
            )
    }

    /// A link-time dependency on a native shared library.
    pub fn is_shared_link(self) -> bool {
        matches!(
            self.kind,
            TagKind::Shared | TagKind::Runtime | TagKind::SharedLib | TagKind::JniLib
        )
    }

    pub fn name(self) -> &'static str {
        use TagKind::*;
        match self.kind {
            SharedLib => "sharedLib",
            JniLib => "jniLib",
            Executable => "executable",
            ShBinary => "shBinary",
            JavaLib => "javaLib",
            App => "androidApp",
            Rro => "rro",
            Bpf => "bpf",
            Filesystem => "filesystem",
            Prebuilt => "prebuilt",
            CompatConfig => "compatConfig",
            Test => "test",
            BootclasspathFragment => "bootclasspathFragment",
            SystemServerClasspathFragment => "systemserverclasspathFragment",
            Key => "key",
            Certificate => "certificate",
            TestFor => "testFor",
            Shared => "shared",
            Static => "static",
            Runtime => "runtime",
            Header => "header",
            Jni => "jni",
            Java => "java",
            PermissionsXml => "permissionsXml",
            FragmentContent => "fragmentContent",
            HostTool => "hostTool",
        }
    }
}

impl From<TagKind> for DependencyTag {
    fn from(kind: TagKind) -> Self {
        DependencyTag::new(kind)
    }
}

impl fmt::Display for DependencyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_flags() {
        assert!(DependencyTag::new(TagKind::SharedLib).payload());
        assert!(DependencyTag::new(TagKind::Prebuilt).payload());
        assert!(!DependencyTag::new(TagKind::Key).payload());
        assert!(!DependencyTag::new(TagKind::Certificate).payload());
        assert!(!DependencyTag::new(TagKind::TestFor).payload());
        assert!(!DependencyTag::new(TagKind::Shared).payload());
    }

    #[test]
    fn test_source_only_and_always_require() {
        assert!(DependencyTag::new(TagKind::BootclasspathFragment).source_only());
        assert!(!DependencyTag::new(TagKind::JavaLib).source_only());
        assert!(DependencyTag::new(TagKind::TestFor).always_require_variant());
        assert!(DependencyTag::new(TagKind::FragmentContent).always_require_variant());
        assert!(!DependencyTag::new(TagKind::Shared).always_require_variant());
    }

    #[test]
    fn test_display_uses_short_name() {
        assert_eq!(DependencyTag::new(TagKind::App).to_string(), "androidApp");
        assert_eq!(DependencyTag::new(TagKind::Shared).to_string(), "shared");
    }
}
