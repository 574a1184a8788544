//! Interned unit names.
//!
//! Every build unit, bundle and variation key is referred to by name many times
//! during a build: as map keys in membership records, in allow-list lookups and in
//! diagnostics. `Name` keeps one copy of each string in a global interner so that
//! cloning is free and equality is a pointer comparison.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{LazyLock, RwLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix the host engine adds to prebuilt substitutes of source units.
pub const PREBUILT_PREFIX: &str = "prebuilt_";

static INTERNER: LazyLock<RwLock<HashSet<&'static str>>> =
    LazyLock::new(|| RwLock::new(HashSet::new()));

/// An interned name with O(1) equality and zero-cost copies.
#[derive(Clone, Copy)]
pub struct Name {
    inner: &'static str,
}

impl Name {
    /// Intern `s`, returning the shared handle.
    pub fn new(s: impl AsRef<str>) -> Self {
        let s = s.as_ref();

        {
            let interner = INTERNER.read().unwrap_or_else(|e| e.into_inner());
            if let Some(&interned) = interner.get(s) {
                return Name { inner: interned };
            }
        }

        let mut interner = INTERNER.write().unwrap_or_else(|e| e.into_inner());
        if let Some(&interned) = interner.get(s) {
            return Name { inner: interned };
        }

        let leaked: &'static str = Box::leak(s.to_string().into_boxed_str());
        interner.insert(leaked);
        Name { inner: leaked }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.inner
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The name with an optional `prebuilt_` prefix removed.
    pub fn without_prebuilt_prefix(&self) -> &'static str {
        self.inner
            .strip_prefix(PREBUILT_PREFIX)
            .unwrap_or(self.inner)
    }
}

impl Default for Name {
    fn default() -> Self {
        Name::new("")
    }
}

impl Deref for Name {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        self.inner
    }
}

impl AsRef<str> for Name {
    #[inline]
    fn as_ref(&self) -> &str {
        self.inner
    }
}

impl Borrow<str> for Name {
    #[inline]
    fn borrow(&self) -> &str {
        self.inner
    }
}

impl PartialEq for Name {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Eq for Name {}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.inner == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.inner == *other
    }
}

impl PartialOrd for Name {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(other.inner)
    }
}

// Hash by content so that `HashMap<Name, _>` can be queried with a `&str`.
impl Hash for Name {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.inner, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner, f)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name::new(s)
    }
}

impl From<&String> for Name {
    fn from(s: &String) -> Self {
        Name::new(s)
    }
}

impl Serialize for Name {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.inner.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Name::new(s))
    }
}
