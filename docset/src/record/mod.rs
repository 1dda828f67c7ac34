//! Record storage. Every value a view can reach lives in an [`Arena`] and is
//! addressed by a [`RecordId`]; views only hold `(Key, RecordId)` pairs, so two
//! views alias the same record exactly when they hold the same id.

mod key;

pub use key::Key;

use serde_json::{Map, Value};

/// Stable handle to a record node inside an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RecordId(usize);

/// A single document value.
#[derive(Debug, Clone)]
pub(crate) enum Record {
    /// bool, number, string or null
    Scalar(Value),
    /// Ordered members; lookup is by name, order only matters for serialization.
    Mapping(Vec<(String, RecordId)>),
    Sequence(Vec<RecordId>),
}

impl Record {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Record::Scalar(v) => Some(v),
            _ => None,
        }
    }

    fn children(&self) -> Vec<RecordId> {
        match self {
            Record::Scalar(_) => Vec::new(),
            Record::Mapping(members) => members.iter().map(|(_, child)| *child).collect(),
            Record::Sequence(items) => items.clone(),
        }
    }
}

/// A dotted field path such as `address.zip`. Segments navigate Mapping
/// levels only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(field: &str) -> Self {
        FieldPath {
            segments: field.split('.').map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Split off the last segment: `a.b.c` becomes (`a.b`, `c`).
    pub fn split_last(&self) -> (Option<FieldPath>, &str) {
        match self.segments.split_last() {
            Some((last, rest)) if !rest.is_empty() => (
                Some(FieldPath {
                    segments: rest.to_vec(),
                }),
                last.as_str(),
            ),
            Some((last, _)) => (None, last.as_str()),
            None => (None, ""),
        }
    }
}

/// Owner of all record nodes for one root record set and every view derived
/// from it.
///
/// Writes keep node handles stable: assigning over an existing member rebuilds
/// it in place, so every view holding that handle sees the new value. Nodes a
/// write unlinks are only reclaimed by [`Arena::collect`], which is given the
/// handles still held by live views.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    nodes: Vec<Record>,
    /// Slots released by `collect`, reused by later imports.
    free: Vec<usize>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn get(&self, id: RecordId) -> &Record {
        &self.nodes[id.0]
    }

    fn push(&mut self, record: Record) -> RecordId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = record;
                RecordId(slot)
            }
            None => {
                self.nodes.push(record);
                RecordId(self.nodes.len() - 1)
            }
        }
    }

    /// Copy a JSON value into the arena, returning the handle of its root node.
    pub fn import(&mut self, value: Value) -> RecordId {
        let record = self.build(value);
        self.push(record)
    }

    fn build(&mut self, value: Value) -> Record {
        match value {
            Value::Object(map) => Record::Mapping(
                map.into_iter()
                    .map(|(name, v)| (name, self.import(v)))
                    .collect(),
            ),
            Value::Array(items) => {
                Record::Sequence(items.into_iter().map(|v| self.import(v)).collect())
            }
            scalar => Record::Scalar(scalar),
        }
    }

    /// Materialize the record at `id` back into a JSON value.
    pub fn export(&self, id: RecordId) -> Value {
        match self.get(id) {
            Record::Scalar(v) => v.clone(),
            Record::Mapping(members) => {
                let mut map = Map::new();
                for (name, child) in members {
                    map.insert(name.clone(), self.export(*child));
                }
                Value::Object(map)
            }
            Record::Sequence(items) => {
                Value::Array(items.iter().map(|child| self.export(*child)).collect())
            }
        }
    }

    /// Make the node at `id` hold `value`. The handle stays valid, and so do
    /// the handles of members matched by name (mappings) or position
    /// (sequences), which are assigned recursively. Only members that did not
    /// exist before get new nodes.
    pub fn assign(&mut self, id: RecordId, value: Value) {
        let current = std::mem::replace(&mut self.nodes[id.0], Record::Scalar(Value::Null));
        let record = match (current, value) {
            (Record::Mapping(mut members), Value::Object(map)) => {
                let mut assigned = Vec::with_capacity(map.len());
                for (name, v) in map {
                    match members.iter().position(|(member, _)| *member == name) {
                        Some(pos) => {
                            let (_, child) = members.swap_remove(pos);
                            self.assign(child, v);
                            assigned.push((name, child));
                        }
                        None => assigned.push((name, self.import(v))),
                    }
                }
                Record::Mapping(assigned)
            }
            (Record::Sequence(items), Value::Array(values)) => {
                let mut existing = items.into_iter();
                let mut assigned = Vec::with_capacity(values.len());
                for v in values {
                    match existing.next() {
                        Some(child) => {
                            self.assign(child, v);
                            assigned.push(child);
                        }
                        None => assigned.push(self.import(v)),
                    }
                }
                Record::Sequence(assigned)
            }
            (_, value) => self.build(value),
        };
        self.nodes[id.0] = record;
    }

    /// Member `name` of a Mapping record. A member holding JSON `null` counts
    /// as absent.
    pub fn field(&self, id: RecordId, name: &str) -> Option<RecordId> {
        match self.get(id) {
            Record::Mapping(members) => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, child)| *child)
                .filter(|child| !self.is_null(*child)),
            _ => None,
        }
    }

    /// Follow every segment of `path` from `id`.
    pub fn walk(&self, id: RecordId, path: &FieldPath) -> Option<RecordId> {
        path.segments()
            .iter()
            .try_fold(id, |current, segment| self.field(current, segment))
    }

    pub fn is_null(&self, id: RecordId) -> bool {
        matches!(self.get(id), Record::Scalar(Value::Null))
    }

    /// Shallow-merge `data` into the Mapping at `id`. Existing members are
    /// assigned in place, new ones appended. Returns false (and changes
    /// nothing) when `id` is not a Mapping.
    pub fn merge(&mut self, id: RecordId, data: &Map<String, Value>) -> bool {
        let Record::Mapping(members) = self.get(id) else {
            return false;
        };
        let existing: Vec<Option<RecordId>> = data
            .keys()
            .map(|name| {
                members
                    .iter()
                    .find(|(member, _)| member == name)
                    .map(|(_, child)| *child)
            })
            .collect();
        let mut appended = Vec::new();
        for ((name, value), slot) in data.iter().zip(existing) {
            match slot {
                Some(child) => self.assign(child, value.clone()),
                None => appended.push((name.clone(), self.import(value.clone()))),
            }
        }
        if let Record::Mapping(members) = &mut self.nodes[id.0] {
            members.extend(appended);
        }
        true
    }

    /// Remove member `name` from the Mapping at `id`. Returns whether a member
    /// was removed.
    pub fn remove_field(&mut self, id: RecordId, name: &str) -> bool {
        match &mut self.nodes[id.0] {
            Record::Mapping(members) => {
                let before = members.len();
                members.retain(|(member, _)| member != name);
                members.len() != before
            }
            _ => false,
        }
    }

    /// Release every node not reachable from `roots` and return how many were
    /// released. Released slots are reused by later imports, so no handle
    /// outside `roots` (or their descendants) may be used afterwards.
    pub fn collect<I>(&mut self, roots: I) -> usize
    where
        I: IntoIterator<Item = RecordId>,
    {
        let mut reachable = vec![false; self.nodes.len()];
        let mut pending: Vec<RecordId> = roots.into_iter().collect();
        while let Some(id) = pending.pop() {
            if std::mem::replace(&mut reachable[id.0], true) {
                continue;
            }
            pending.extend(self.nodes[id.0].children());
        }

        let before = self.free.len();
        self.free.clear();
        for (slot, live) in reachable.into_iter().enumerate() {
            if !live {
                self.nodes[slot] = Record::Scalar(Value::Null);
                self.free.push(slot);
            }
        }
        self.free.len().saturating_sub(before)
    }
}
