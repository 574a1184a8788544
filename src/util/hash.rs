//! Fingerprinting of bundle plans.

use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a string.
pub fn sha256_str(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// A hasher for building fingerprints from multiple components.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component to the fingerprint.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    /// Add multiple strings, followed by a length marker so that
    /// `["a", "b"]` and `["a"], ["b"]` hash differently.
    pub fn update_strs<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> &mut Self {
        let mut count = 0usize;
        for s in items {
            self.update_str(s);
            count += 1;
        }
        self.hasher.update(count.to_le_bytes());
        self
    }

    /// Add an optional string component.
    pub fn update_opt(&mut self, opt: Option<&str>) -> &mut Self {
        match opt {
            Some(s) => {
                self.hasher.update(b"\x01");
                self.update_str(s);
            }
            None => {
                self.hasher.update(b"\x00");
            }
        }
        self
    }

    pub fn update_bool(&mut self, b: bool) -> &mut Self {
        self.hasher.update([b as u8]);
        self
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short fingerprint (first 16 chars).
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_str() {
        assert_eq!(
            sha256_str("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let fp = |parts: &[&str]| {
            let mut fp = Fingerprint::new();
            fp.update_strs(parts.iter().copied());
            fp.finish()
        };

        assert_eq!(fp(&["lib64/libfoo.so", "bin/bin1"]), fp(&["lib64/libfoo.so", "bin/bin1"]));
        assert_ne!(fp(&["lib64/libfoo.so", "bin/bin1"]), fp(&["bin/bin1", "lib64/libfoo.so"]));
    }

    #[test]
    fn test_update_opt_distinguishes_absent() {
        let mut a = Fingerprint::new();
        a.update_opt(None);
        let mut b = Fingerprint::new();
        b.update_opt(Some(""));
        assert_ne!(a.finish_short(), b.finish_short());
    }
}
