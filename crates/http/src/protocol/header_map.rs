//! A multimap of header fields keyed by case-insensitive names.
//!
//! Field names compare and hash without regard to ASCII case, values are kept
//! exactly as received, and duplicate names are allowed. Entries keep their
//! insertion order so that re-encoding a header block is stable, while lookups
//! go through a hash index built with [`case_insensitive_hash`].

use std::collections::HashMap;
use std::fmt;

/// Compares two field names without regard to ASCII case.
#[inline]
pub fn case_insensitive_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Hashes a field name so that names differing only by ASCII case collide.
///
/// Each lowercased byte is folded into the running value with the classic
/// `h ^= c + 0x9e3779b9 + (h << 6) + (h >> 2)` combine step.
pub fn case_insensitive_hash(name: &str) -> u64 {
    name.bytes().fold(0_u64, |h, b| {
        let c = u64::from(b.to_ascii_lowercase());
        h ^ c.wrapping_add(0x9e37_79b9).wrapping_add(h << 6).wrapping_add(h >> 2)
    })
}

#[derive(Clone, Default)]
pub struct CaseInsensitiveMultimap {
    entries: Vec<(String, String)>,
    // hash of the folded name -> positions in `entries`; buckets are verified
    // with `case_insensitive_equal` since distinct names may share a hash
    index: HashMap<u64, Vec<usize>>,
}

impl CaseInsensitiveMultimap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity), index: HashMap::with_capacity(capacity) }
    }

    /// Adds a field, keeping any existing fields with the same name.
    pub fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        let position = self.entries.len();
        self.index.entry(case_insensitive_hash(&name)).or_default().push(position);
        self.entries.push((name, value.into()));
    }

    /// Replaces every field named `name` with a single field.
    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        self.remove(&name);
        self.insert(name, value);
    }

    /// Returns the value of the first field named `name`.
    pub fn find(&self, name: &str) -> Option<&str> {
        self.positions(name).next().map(|i| self.entries[i].1.as_str())
    }

    /// Returns the values of every field named `name`, in insertion order.
    pub fn equal_range<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.positions(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions(name).next().is_some()
    }

    /// Checks whether any field named `name` carries `token` in its
    /// comma-separated value list, ignoring case.
    ///
    /// ```
    /// # use brook_http::protocol::CaseInsensitiveMultimap;
    /// let mut header = CaseInsensitiveMultimap::new();
    /// header.insert("Connection", "Upgrade, Keep-Alive");
    /// assert!(header.contains_token("connection", "keep-alive"));
    /// assert!(!header.contains_token("connection", "close"));
    /// ```
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.equal_range(name).any(|value| value.split(',').any(|item| case_insensitive_equal(item.trim(), token)))
    }

    /// Removes every field named `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| !case_insensitive_equal(existing, name));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    fn positions<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.index
            .get(&case_insensitive_hash(name))
            .into_iter()
            .flatten()
            .copied()
            .filter(move |&i| case_insensitive_equal(&self.entries[i].0, name))
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (position, (name, _)) in self.entries.iter().enumerate() {
            self.index.entry(case_insensitive_hash(name)).or_default().push(position);
        }
    }

    fn count(&self, name: &str, value: &str) -> usize {
        self.positions(name).filter(|&i| self.entries[i].1 == value).count()
    }
}

/// Two maps are equal when they hold the same multiset of fields; names are
/// compared case-insensitively, values exactly, and order does not matter.
impl PartialEq for CaseInsensitiveMultimap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(name, value)| self.count(name, value) == other.count(name, value))
    }
}

impl Eq for CaseInsensitiveMultimap {}

impl fmt::Debug for CaseInsensitiveMultimap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for CaseInsensitiveMultimap {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<N: Into<String>, V: Into<String>> Extend<(N, V)> for CaseInsensitiveMultimap {
    fn extend<T: IntoIterator<Item = (N, V)>>(&mut self, iter: T) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

impl<'a> IntoIterator for &'a CaseInsensitiveMultimap {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
