//! Multi-valued, case-insensitive header storage.
//!
//! Requests rarely carry more than a dozen headers, so entries live inline in a
//! `SmallVec` and lookups are a linear, case-insensitive scan. Repeated names are
//! kept as separate entries in arrival order, which is what header resolvers
//! need to distinguish "first value" from "all values".

use smallvec::SmallVec;
use std::fmt;

/// Number of headers stored before spilling to the heap.
pub const INLINE_HEADERS: usize = 12;

#[derive(Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    value: String,
}

impl Entry {
    #[inline]
    fn name_eq(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered header multimap.
///
/// ```
/// use restlight_core::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.append("X-Foo", "1");
/// headers.append("x-foo", "2");
///
/// assert_eq!(headers.get("X-FOO"), Some("1"));
/// assert_eq!(headers.get_all("x-foo"), vec!["1", "2"]);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    inner: SmallVec<[Entry; INLINE_HEADERS]>,
}

impl HeaderMap {
    /// Create a new empty header map.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: SmallVec::new(),
        }
    }

    /// Number of entries, counting repeated names separately.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// First value for `name`.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|h| h.name_eq(name))
            .map(|h| h.value.as_str())
    }

    /// Every value for `name`, in arrival order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.inner
            .iter()
            .filter(|h| h.name_eq(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|h| h.name_eq(name))
    }

    /// Replace every value of `name` with a single value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.inner.retain(|h| !h.name_eq(&name));
        self.inner.push(Entry {
            name,
            value: value.into(),
        });
    }

    /// Add a value, keeping existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push(Entry {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Remove every value of `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.inner.len();
        self.inner.retain(|h| !h.name_eq(name));
        before - self.inner.len()
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .iter()
            .map(|h| (h.name.as_str(), h.value.as_str()))
    }

    /// Distinct header names, first spelling wins.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for h in &self.inner {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&h.name)) {
                names.push(&h.name);
            }
        }
        names
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.get("Content-Type")
    }

    #[inline]
    pub fn accept(&self) -> Option<&str> {
        self.get("Accept")
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.inner.iter().map(|h| format!("{}: {}", h.name, h.value)))
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = HeaderMap::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_all_values() {
        let mut headers = HeaderMap::new();
        headers.append("Accept", "text/plain");
        headers.append("accept", "application/json");
        headers.insert("ACCEPT", "*/*");
        assert_eq!(headers.get_all("accept"), vec!["*/*"]);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_names_are_distinct() {
        let mut headers: HeaderMap = [("A", "1"), ("b", "2"), ("a", "3")].into_iter().collect();
        assert_eq!(headers.names(), vec!["A", "b"]);
        assert_eq!(headers.remove("A"), 2);
        assert!(!headers.is_empty());
    }
}
