//! Platform API levels.
//!
//! Minimum-version declarations are either a number, a release codename, or
//! `current`, which means "the not-yet-finalized next release".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A platform API level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiLevel(u32);

/// Finalized codenames and their numeric levels.
const CODENAMES: &[(&str, u32)] = &[
    ("Q", 29),
    ("R", 30),
    ("S", 31),
    ("Sv2", 32),
    ("Tiramisu", 33),
    ("UpsideDownCake", 34),
    ("VanillaIceCream", 35),
];

impl ApiLevel {
    /// The level of the in-development release.
    pub const FUTURE: ApiLevel = ApiLevel(10_000);

    pub const fn new(level: u32) -> Self {
        ApiLevel(level)
    }

    pub fn level(self) -> u32 {
        self.0
    }

    pub fn is_future(self) -> bool {
        self == Self::FUTURE
    }

    /// Parse a declared minimum version.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("current") {
            return Ok(Self::FUTURE);
        }
        if let Ok(n) = s.parse::<u32>() {
            if n == 0 {
                return Err(format!("\"{s}\" is not a valid API level"));
            }
            return Ok(ApiLevel(n));
        }
        CODENAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|&(_, level)| ApiLevel(level))
            .ok_or_else(|| format!("\"{s}\" is not a valid API level"))
    }
}

impl FromStr for ApiLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApiLevel::parse(s)
    }
}

impl fmt::Display for ApiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_future() {
            write!(f, "current")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Serialize for ApiLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ApiLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => ApiLevel::parse(&n.to_string()),
            Raw::Text(s) => ApiLevel::parse(&s),
        }
        .map_err(serde::de::Error::custom)
    }
}
