/*!
 * String Dictionary
 *
 * Mapping between i32 ids and strings with O(1) id lookup and amortized
 * O(1) string lookup. A transient tier holds literals added during a
 * query without mutating the persistent dictionary; transient ids are
 * negative, starting at -2, and never persisted.
 */

use crate::core::types::{DictId, NULL_INT};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

/// First transient id; subsequent transients descend from here.
/// -1 stays reserved so it can never collide with a join slot sentinel.
const TRANSIENT_ID_START: i32 = -2;

/// Dictionary operation result
pub type DictionaryResult<T> = Result<T, DictionaryError>;

/// Dictionary errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DictionaryError {
    #[error("Dictionary {0} exhausted its id space")]
    CapacityExceeded(DictId),

    #[error("Translation between dictionaries {src} and {dst} failed: {missing} strings missing")]
    TranslationFailed {
        src: DictId,
        dst: DictId,
        missing: usize,
    },
}

/// Thread-safe string dictionary. Outlives any query using it.
pub struct StringDictionary {
    dict_id: DictId,
    /// Persistent tier: id = index into `strings`
    strings: RwLock<Vec<String>>,
    ids: DashMap<String, i32, RandomState>,
    /// Transient tier: id = -(index + 2)
    transient_strings: RwLock<Vec<String>>,
    transient_ids: DashMap<String, i32, RandomState>,
}

impl StringDictionary {
    #[must_use]
    pub fn new(dict_id: DictId) -> Self {
        Self {
            dict_id,
            strings: RwLock::new(Vec::new()),
            ids: DashMap::with_hasher(RandomState::new()),
            transient_strings: RwLock::new(Vec::new()),
            transient_ids: DashMap::with_hasher(RandomState::new()),
        }
    }

    #[inline]
    #[must_use]
    pub const fn dict_id(&self) -> DictId {
        self.dict_id
    }

    /// Number of persistent entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persistent id for the string, inserting if absent
    pub fn get_or_add(&self, value: &str) -> DictionaryResult<i32> {
        if let Some(id) = self.ids.get(value) {
            return Ok(*id);
        }
        let mut strings = self.strings.write();
        // Re-check under the write lock: another writer may have won
        if let Some(id) = self.ids.get(value) {
            return Ok(*id);
        }
        if strings.len() >= i32::MAX as usize {
            return Err(DictionaryError::CapacityExceeded(self.dict_id));
        }
        let id = strings.len() as i32;
        strings.push(value.to_owned());
        self.ids.insert(value.to_owned(), id);
        Ok(id)
    }

    /// Bulk insert, returning ids in input order
    pub fn get_or_add_bulk(&self, values: &[&str]) -> DictionaryResult<Vec<i32>> {
        values.iter().map(|v| self.get_or_add(v)).collect()
    }

    /// Existing id (persistent or transient) for the string, if any
    #[must_use]
    pub fn get_id(&self, value: &str) -> Option<i32> {
        self.ids
            .get(value)
            .map(|id| *id)
            .or_else(|| self.transient_ids.get(value).map(|id| *id))
    }

    /// Transient id for a query literal, never touching the persistent
    /// tier. Reuses the persistent id when the string already exists.
    pub fn get_or_add_transient(&self, value: &str) -> DictionaryResult<i32> {
        if let Some(id) = self.get_id(value) {
            return Ok(id);
        }
        let mut transients = self.transient_strings.write();
        if let Some(id) = self.transient_ids.get(value) {
            return Ok(*id);
        }
        if transients.len() >= (i32::MAX - 1) as usize {
            return Err(DictionaryError::CapacityExceeded(self.dict_id));
        }
        let id = TRANSIENT_ID_START - transients.len() as i32;
        transients.push(value.to_owned());
        self.transient_ids.insert(value.to_owned(), id);
        debug!(dict_id = self.dict_id, id, "added transient string");
        Ok(id)
    }

    /// String for an id, resolving both tiers. None for the null sentinel
    /// or out-of-range ids.
    #[must_use]
    pub fn get_string(&self, id: i32) -> Option<String> {
        if id == NULL_INT {
            return None;
        }
        if id >= 0 {
            self.strings.read().get(id as usize).cloned()
        } else if id <= TRANSIENT_ID_START {
            let idx = (TRANSIENT_ID_START - id) as usize;
            self.transient_strings.read().get(idx).cloned()
        } else {
            None
        }
    }

    /// Drop the transient tier (end of query)
    pub fn clear_transient(&self) {
        self.transient_strings.write().clear();
        self.transient_ids.clear();
    }

    /// Build an id translation map from this dictionary into `dst`:
    /// `map[src_id] = dst_id`, with the null sentinel for strings absent
    /// from `dst`. Covers the persistent tier only.
    #[must_use]
    pub fn build_translation_map(&self, dst: &StringDictionary) -> Vec<i32> {
        let strings = self.strings.read();
        strings
            .iter()
            .map(|s| dst.get_id(s).unwrap_or(NULL_INT))
            .collect()
    }

    /// Like [`build_translation_map`](Self::build_translation_map) but an
    /// error when any string is missing from `dst`.
    pub fn build_strict_translation_map(
        &self,
        dst: &StringDictionary,
    ) -> DictionaryResult<Vec<i32>> {
        let map = self.build_translation_map(dst);
        let missing = map.iter().filter(|&&id| id == NULL_INT).count();
        if missing > 0 {
            return Err(DictionaryError::TranslationFailed {
                src: self.dict_id,
                dst: dst.dict_id,
                missing,
            });
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_add_is_idempotent() {
        let dict = StringDictionary::new(1);
        let a = dict.get_or_add("hi").unwrap();
        let b = dict.get_or_add("bye").unwrap();
        assert_eq!(dict.get_or_add("hi").unwrap(), a);
        assert_ne!(a, b);
        assert_eq!(dict.get_string(a).as_deref(), Some("hi"));
    }

    #[test]
    fn test_transient_ids_are_negative_and_cleared() {
        let dict = StringDictionary::new(1);
        dict.get_or_add("persistent").unwrap();

        let t = dict.get_or_add_transient("ephemeral").unwrap();
        assert!(t <= TRANSIENT_ID_START);
        assert_eq!(dict.get_string(t).as_deref(), Some("ephemeral"));
        // Persistent strings are reused rather than duplicated
        assert_eq!(dict.get_or_add_transient("persistent").unwrap(), 0);

        dict.clear_transient();
        assert_eq!(dict.get_string(t), None);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_translation_map() {
        let src = StringDictionary::new(1);
        let dst = StringDictionary::new(2);
        src.get_or_add("a").unwrap();
        src.get_or_add("b").unwrap();
        dst.get_or_add("b").unwrap();

        let map = src.build_translation_map(&dst);
        assert_eq!(map, vec![NULL_INT, 0]);
        assert!(src.build_strict_translation_map(&dst).is_err());

        dst.get_or_add("a").unwrap();
        assert_eq!(src.build_strict_translation_map(&dst).unwrap(), vec![1, 0]);
    }
}
