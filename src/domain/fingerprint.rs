//! Call fingerprints used as cache and dedupe keys.
//!
//! A fingerprint identifies "this operation, for this identity, with these
//! parameters". Two calls with the same fingerprint are duplicates for caching
//! purposes and share one cached outcome, both locally and in the durable store.
//!
//! Unlike an in-process hash, the fingerprint text must be identical on every
//! instance of the fleet, so it is built from a canonical escaped string rather
//! than from a seeded hasher.

use std::collections::BTreeMap;
use std::fmt;

/// Maximum accepted key length, in bytes.
pub const MAX_KEY_LEN: usize = 512;

/// Canonical key identifying a class of duplicate calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from call components.
    ///
    /// # Arguments
    /// * `operation` - Name of the guarded operation (e.g. `"create_task"`)
    /// * `identity` - The principal the call is made on behalf of
    /// * `params` - Parameters relevant to the outcome (sorted by the map)
    ///
    /// Components are escaped so that no combination of values can collide
    /// with a different split of the same characters.
    pub fn new(operation: &str, identity: &str, params: &BTreeMap<String, String>) -> Self {
        let mut key = String::with_capacity(operation.len() + identity.len() + 16);
        push_escaped(&mut key, operation);
        key.push('/');
        push_escaped(&mut key, identity);

        for (name, value) in params {
            key.push('/');
            push_escaped(&mut key, name);
            key.push('=');
            push_escaped(&mut key, value);
        }

        Fingerprint(key)
    }

    /// Fingerprint for an operation that takes no parameters.
    pub fn simple(operation: &str, identity: &str) -> Self {
        Self::new(operation, identity, &BTreeMap::new())
    }

    /// Wrap a caller-provided key as-is.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Fingerprint(key.into())
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn push_escaped(out: &mut String, component: &str) {
    for ch in component.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '=' => out.push_str("%3D"),
            other => out.push(other),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
