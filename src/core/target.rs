//! Device targets, architecture variants and multilib classes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Processor architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Arm,
    Arm64,
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
        }
    }

    pub fn is_64bit(self) -> bool {
        matches!(self, Arch::Arm64 | Arch::X86_64)
    }

    /// Library directory for this architecture's bit-width.
    pub fn lib_dir(self) -> &'static str {
        if self.is_64bit() {
            "lib64"
        } else {
            "lib"
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device target the build produces code for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub arch: Arch,
}

impl Target {
    pub fn new(arch: Arch) -> Self {
        Target { arch }
    }
}

/// The variant axis a unit instance is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Variant {
    /// Architecture-independent units (managed code, data files, bundles).
    Common,
    Arch(Arch),
}

impl Variant {
    pub fn arch(self) -> Option<Arch> {
        match self {
            Variant::Common => None,
            Variant::Arch(arch) => Some(arch),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Common => "common",
            Variant::Arch(arch) => arch.as_str(),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Arch> for Variant {
    fn from(arch: Arch) -> Self {
        Variant::Arch(arch)
    }
}

/// Which architecture variants of a native unit are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multilib {
    /// Primary target only.
    First,
    /// Every target.
    #[default]
    Both,
    #[serde(rename = "32")]
    Lib32,
    #[serde(rename = "64")]
    Lib64,
    /// The 32-bit target, or the primary one when there is none.
    Prefer32,
}

impl Multilib {
    /// Select the targets this class builds for, preserving target order.
    pub fn select(self, targets: &[Target]) -> Vec<Target> {
        match self {
            Multilib::Both => targets.to_vec(),
            Multilib::First => targets.first().copied().into_iter().collect(),
            Multilib::Lib32 => targets.iter().copied().filter(|t| !t.arch.is_64bit()).collect(),
            Multilib::Lib64 => targets.iter().copied().filter(|t| t.arch.is_64bit()).collect(),
            Multilib::Prefer32 => {
                let lib32: Vec<_> = targets
                    .iter()
                    .copied()
                    .filter(|t| !t.arch.is_64bit())
                    .collect();
                if lib32.is_empty() {
                    targets.first().copied().into_iter().collect()
                } else {
                    lib32
                }
            }
        }
    }
}
