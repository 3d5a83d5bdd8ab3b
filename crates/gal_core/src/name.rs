//! Hashed slot names.
//!
//! Bindings are matched by name on every draw call, so names are compared
//! through a precomputed xxh3 hash. [`HashedName`] keeps the string around
//! for diagnostics and name-based heuristics; [`TempHashedName`] is the
//! hash alone and is what the hot path passes around.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

/// Hashes a slot name the same way [`HashedName`] and [`TempHashedName`] do.
#[inline]
#[must_use]
pub fn hash_name(name: &str) -> u64 {
    xxh3_64(name.as_bytes())
}

/// A name plus its precomputed hash. Equality and hashing use the hash only.
#[derive(Clone)]
pub struct HashedName {
    hash: u64,
    name: Arc<str>,
}

impl HashedName {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            hash: hash_name(name),
            name: Arc::from(name),
        }
    }

    #[inline]
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Case-insensitive substring test, used for name-based fallback heuristics.
    #[must_use]
    pub fn contains_ignore_case(&self, needle: &str) -> bool {
        let needle = needle.as_bytes();
        needle.is_empty()
            || self
                .name
                .as_bytes()
                .windows(needle.len())
                .any(|window| window.eq_ignore_ascii_case(needle))
    }
}

impl PartialEq for HashedName {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for HashedName {}

impl Hash for HashedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Debug for HashedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.name)
    }
}

impl fmt::Display for HashedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for HashedName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Hash-only view of a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempHashedName(u64);

impl TempHashedName {
    #[inline]
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(hash_name(name))
    }

    #[inline]
    #[must_use]
    pub fn hash(self) -> u64 {
        self.0
    }
}

impl From<&str> for TempHashedName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&HashedName> for TempHashedName {
    fn from(name: &HashedName) -> Self {
        Self(name.hash())
    }
}

impl PartialEq<HashedName> for TempHashedName {
    fn eq(&self, other: &HashedName) -> bool {
        self.0 == other.hash()
    }
}
