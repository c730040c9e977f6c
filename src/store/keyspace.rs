//! The keyspace (component C3): an owned string→(string, optional expiry)
//! mapping with lazy-expiry reads. Keys and values are deep-copied on
//! insert; `get` never returns a dangling or expired view.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub value: Vec<u8>,
    pub expiry_deadline_ms: Option<i64>,
}

impl KeyEntry {
    fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expiry_deadline_ms, Some(deadline) if now_ms >= deadline)
    }
}

#[derive(Debug, Default)]
pub struct Keyspace {
    entries: HashMap<Vec<u8>, KeyEntry>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts `key` with no expiry, replacing any prior entry.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.entries.insert(
            key.to_vec(),
            KeyEntry {
                value: value.to_vec(),
                expiry_deadline_ms: None,
            },
        );
    }

    /// Upserts `key` with an absolute expiry deadline in epoch milliseconds.
    pub fn put_with_expiry(&mut self, key: &[u8], value: &[u8], deadline_ms: i64) {
        self.entries.insert(
            key.to_vec(),
            KeyEntry {
                value: value.to_vec(),
                expiry_deadline_ms: Some(deadline_ms),
            },
        );
    }

    /// Returns the stored value unless the key is absent or its deadline
    /// has passed as of `now_ms`. Expired entries are not physically
    /// removed (lazy expiry) -- `count` may still include them.
    pub fn get(&self, key: &[u8], now_ms: i64) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now_ms) => Some(entry.value.as_slice()),
            _ => None,
        }
    }

    /// Number of stored entries, including any not-yet-reaped expired ones.
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}
