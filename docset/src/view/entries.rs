use crate::record::{Key, RecordId};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Ordered key table of a view. Direct key lookup goes through `index`;
/// everything else iterates `items` in order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Entries {
    items: Vec<(Key, RecordId)>,
    index: HashMap<Key, usize>,
}

impl Entries {
    pub fn single(key: Key, id: RecordId) -> Self {
        let mut entries = Entries::default();
        entries.insert(key, id);
        entries
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<RecordId> {
        self.index.get(key).map(|&pos| self.items[pos].1)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or overwrite. An existing key keeps its position.
    pub fn insert(&mut self, key: Key, id: RecordId) {
        match self.index.get(&key) {
            Some(&pos) => self.items[pos].1 = id,
            None => {
                self.index.insert(key.clone(), self.items.len());
                self.items.push((key, id));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Key, RecordId)> + '_ {
        self.items.iter()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.items.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn first(&self) -> Option<RecordId> {
        self.items.first().map(|(_, id)| *id)
    }

    pub fn last(&self) -> Option<RecordId> {
        self.items.last().map(|(_, id)| *id)
    }

    /// Remove every key in `keys`. Returns the number removed.
    pub fn remove_all(&mut self, keys: &HashSet<Key>) -> usize {
        let before = self.items.len();
        self.items.retain(|(key, _)| !keys.contains(key));
        let removed = before - self.items.len();
        if removed > 0 {
            self.rebuild_index();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
    }

    /// One past the largest `Key::Index`, or 0.
    pub fn next_index(&self) -> i64 {
        self.items
            .iter()
            .filter_map(|(key, _)| key.as_index())
            .max()
            .map_or(0, |max| max.saturating_add(1))
    }

    /// Stable sort of the entries.
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&(Key, RecordId), &(Key, RecordId)) -> Ordering,
    {
        self.items.sort_by(|a, b| compare(a, b));
        self.rebuild_index();
    }

    /// True when the keys are exactly `0..len` in order, i.e. the set is a list.
    pub fn is_sequential(&self) -> bool {
        self.items
            .iter()
            .enumerate()
            .all(|(pos, (key, _))| key.as_index() == Some(pos as i64))
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .items
            .iter()
            .enumerate()
            .map(|(pos, (key, _))| (key.clone(), pos))
            .collect();
    }
}

impl FromIterator<(Key, RecordId)> for Entries {
    fn from_iter<I: IntoIterator<Item = (Key, RecordId)>>(iter: I) -> Self {
        let mut entries = Entries::default();
        for (key, id) in iter {
            entries.insert(key, id);
        }
        entries
    }
}
