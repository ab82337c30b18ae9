//! Stable `id_internal` assignment across loads.

use std::collections::HashMap;

/// Maps external keys (JPL record id, SPK-ID, MPC designation) to internal ids.
///
/// Ids already present in the database are seeded first so that re-loading a
/// file updates rows instead of duplicating them.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    by_neo: HashMap<String, i64>,
    by_spk: HashMap<i64, i64>,
    by_designation: HashMap<String, i64>,
    next_id: i64,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdentityResolver {
    /// Create an empty resolver whose first fresh id is `next_id` (at least 1).
    pub fn new(next_id: i64) -> Self {
        Self {
            by_neo: HashMap::new(),
            by_spk: HashMap::new(),
            by_designation: HashMap::new(),
            next_id: next_id.max(1),
        }
    }

    /// Register an existing catalog row.
    pub fn seed(&mut self, id_internal: i64, neo_id: Option<&str>, spkid: Option<i64>) {
        if let Some(neo_id) = neo_id.map(normalize_key).filter(|k| !k.is_empty()) {
            self.by_neo.insert(neo_id, id_internal);
        }
        if let Some(spkid) = spkid {
            self.by_spk.insert(spkid, id_internal);
        }
        if id_internal >= self.next_id {
            self.next_id = id_internal + 1;
        }
    }

    /// The id the next unseen object will receive.
    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    /// Number of distinct keys known.
    pub fn known_keys(&self) -> usize {
        self.by_neo.len() + self.by_spk.len() + self.by_designation.len()
    }

    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Resolve a JPL row to its internal id.
    ///
    /// The record id wins over the SPK-ID; an SPK-ID match teaches the
    /// resolver the record id. Rows with neither key resolve to `None`.
    pub fn resolve(&mut self, neo_id: Option<&str>, spkid: Option<i64>) -> Option<i64> {
        let neo_key = neo_id.map(normalize_key).filter(|k| !k.is_empty());

        match (neo_key, spkid) {
            (Some(key), spkid) => {
                if let Some(&id) = self.by_neo.get(&key) {
                    return Some(id);
                }
                if let Some(&id) = spkid.and_then(|s| self.by_spk.get(&s)) {
                    self.by_neo.insert(key, id);
                    return Some(id);
                }
                let id = self.allocate();
                self.by_neo.insert(key, id);
                if let Some(spkid) = spkid {
                    self.by_spk.insert(spkid, id);
                }
                Some(id)
            }
            (None, Some(spkid)) => {
                if let Some(&id) = self.by_spk.get(&spkid) {
                    return Some(id);
                }
                let id = self.allocate();
                self.by_spk.insert(spkid, id);
                Some(id)
            }
            (None, None) => None,
        }
    }

    /// Resolve an MPC designation key, allocating a fresh id when unseen.
    pub fn resolve_designation(&mut self, key: &str) -> i64 {
        let key = normalize_key(key);
        if let Some(&id) = self.by_designation.get(&key) {
            return id;
        }
        let id = self.allocate();
        self.by_designation.insert(key, id);
        id
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_record_id() {
        let mut resolver = IdentityResolver::new(10);
        resolver.seed(3, Some("A0000433"), Some(2000433));

        assert_eq!(resolver.resolve(Some("a0000433"), Some(999)), Some(3));
        assert_eq!(resolver.resolve(Some("bNEW"), Some(2000433)), Some(3));
        // learned from the SPK-ID match
        assert_eq!(resolver.resolve(Some("bnew"), None), Some(3));
    }

    #[test]
    fn test_resolve_allocates_sequentially() {
        let mut resolver = IdentityResolver::new(0);
        assert_eq!(resolver.next_id(), 1);
        assert_eq!(resolver.resolve(Some("a1"), Some(11)), Some(1));
        assert_eq!(resolver.resolve(None, Some(22)), Some(2));
        assert_eq!(resolver.resolve(None, Some(11)), Some(1));
        assert_eq!(resolver.resolve(None, None), None);
        assert_eq!(resolver.resolve(Some("  "), None), None);
        assert_eq!(resolver.next_id(), 3);
    }

    #[test]
    fn test_seed_advances_next_id() {
        let mut resolver = IdentityResolver::new(1);
        resolver.seed(41, None, Some(5));
        assert_eq!(resolver.next_id(), 42);
        assert_eq!(resolver.known_keys(), 1);
    }

    #[test]
    fn test_resolve_designation() {
        let mut resolver = IdentityResolver::new(5);
        let first = resolver.resolve_designation("2024 AB1");
        assert_eq!(first, 5);
        assert_eq!(resolver.resolve_designation(" 2024 ab1 "), 5);
        assert_eq!(resolver.resolve_designation("00433"), 6);
    }
}
