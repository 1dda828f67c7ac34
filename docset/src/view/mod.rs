//! Aliasing views over a record set.
//!
//! A [`View`] is an ordered key table of record handles plus a link to the
//! view it was derived from. Queries derive new views that share record
//! handles with their parent; mutations write through those handles, so a
//! change made through any view is visible from the root and can be flushed.

mod compare;
mod entries;
mod projection;

pub use compare::{Collation, Op, SortOrder};
pub(crate) use entries::Entries;

use crate::error::{DocsetError, Result};
use crate::record::{Arena, FieldPath, Key};
use crate::store::BackingStore;
use compare::{sort_cmp, Predicate};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) enum ViewKind {
    Plain,
    /// Aliases one field of each parent record.
    Projection {
        field: String,
    },
    /// Root view persisted to a file.
    Store(BackingStore),
}

pub(crate) struct ViewState {
    pub(crate) entries: Entries,
    /// Only ever points upward, so the chain cannot form a cycle.
    pub(crate) parent: Option<View>,
    pub(crate) modified: bool,
    pub(crate) kind: ViewKind,
}

/// Every view sharing one arena, so flushing can tell which records are still
/// reachable.
type Family = Rc<RefCell<Vec<Weak<RefCell<ViewState>>>>>;

/// Handle to a view. Cloning the handle does not copy the view: both handles
/// observe and mutate the same key table.
#[derive(Clone)]
pub struct View {
    pub(crate) state: Rc<RefCell<ViewState>>,
    pub(crate) arena: Rc<RefCell<Arena>>,
    family: Family,
}

impl View {
    /// An empty root view with its own record arena.
    pub fn new() -> Self {
        View::from_parts(None, Entries::default(), ViewKind::Plain)
    }

    /// A root view holding `data`, which must be a mapping or a sequence.
    pub fn from_json(data: Value) -> Result<Self> {
        let view = View::new();
        view.set(data, false)?;
        Ok(view)
    }

    /// A view derived from `source` (sharing its arena, with `source` as
    /// parent), or a new root with its own arena when `source` is `None`.
    pub(crate) fn from_parts(source: Option<&View>, entries: Entries, kind: ViewKind) -> Self {
        let (arena, family) = match source {
            Some(source) => (source.arena.clone(), source.family.clone()),
            None => (Rc::new(RefCell::new(Arena::new())), Family::default()),
        };
        let state = Rc::new(RefCell::new(ViewState {
            entries,
            parent: source.cloned(),
            modified: false,
            kind,
        }));
        {
            let mut members = family.borrow_mut();
            members.retain(|member| member.strong_count() > 0);
            members.push(Rc::downgrade(&state));
        }
        View {
            state,
            arena,
            family,
        }
    }

    fn derive(&self, entries: Entries) -> View {
        View::from_parts(Some(self), entries, ViewKind::Plain)
    }

    /// This view followed by every ancestor up to the root.
    pub(crate) fn lineage(&self) -> Vec<View> {
        let mut chain = vec![self.clone()];
        let mut next = self.state.borrow().parent.clone();
        while let Some(view) = next {
            next = view.state.borrow().parent.clone();
            chain.push(view);
        }
        chain
    }

    pub fn parent(&self) -> Option<View> {
        self.state.borrow().parent.clone()
    }

    pub fn is_projection(&self) -> bool {
        matches!(self.state.borrow().kind, ViewKind::Projection { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self.state.borrow().kind, ViewKind::Store(_))
    }

    /// Whether two handles denote the same view.
    pub fn same_view(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Filter by `field op value`. Operators are `=`, `!=`, `<`, `<=`, `>`,
    /// `>=` and `like` (regex). The field may be dotted (`address.state`).
    ///
    /// `("*", "=", key)` is a direct key lookup. A `null` value with `=`
    /// matches records lacking the field and with `!=` records having it;
    /// any other comparison skips records lacking the field.
    pub fn and_where(&self, field: &str, op: &str, value: impl Into<Value>) -> Result<View> {
        self.ensure_loaded()?;
        let op: Op = op.parse()?;
        let value = value.into();

        if field == "*" && op == Op::Eq {
            let key = Key::from_value(&value).ok_or_else(|| {
                DocsetError::Validation(format!("{value} cannot be used as a key"))
            })?;
            let found = self.state.borrow().entries.get(&key);
            let entries = found
                .map(|id| Entries::single(key, id))
                .unwrap_or_default();
            return Ok(self.derive(entries));
        }

        let predicate = Predicate::new(op, value)?;
        let path = FieldPath::parse(field);
        let (prefix, last) = path.split_last();
        let search = match &prefix {
            Some(prefix) => self.select_path(prefix)?,
            None => self.clone(),
        };

        let matched: Entries = {
            let arena = self.arena.borrow();
            let own = self.state.borrow();
            let searched = search.state.borrow();
            searched
                .entries
                .iter()
                .filter(|(_, id)| {
                    predicate.matches(arena.field(*id, last).map(|found| arena.get(found)))
                })
                .filter_map(|(key, _)| own.entries.get(key).map(|id| (key.clone(), id)))
                .collect()
        };
        Ok(self.derive(matched))
    }

    /// Widen this view: run the query against the parent and layer this
    /// view's own entries on top. A root view is returned unchanged.
    pub fn or_where(&self, field: &str, op: &str, value: impl Into<Value>) -> Result<View> {
        let Some(parent) = self.parent() else {
            return Ok(self.clone());
        };
        let widened = parent.and_where(field, op, value)?;
        {
            let own = self.state.borrow();
            let mut target = widened.state.borrow_mut();
            for (key, id) in own.entries.iter() {
                target.entries.insert(key.clone(), *id);
            }
        }
        Ok(widened)
    }

    /// Project a (possibly dotted) field. Each level is one projection whose
    /// parent is the previous level; the leaf is returned.
    pub fn select(&self, field: &str) -> Result<View> {
        self.select_path(&FieldPath::parse(field))
    }

    fn select_path(&self, path: &FieldPath) -> Result<View> {
        self.ensure_loaded()?;
        Ok(path
            .segments()
            .iter()
            .fold(self.clone(), |view, segment| view.project(segment)))
    }

    /// Reorder this view only. `"*"` sorts by key, anything else by the value
    /// at that (dotted) field with lexical collation.
    pub fn sort(&self, field: &str, order: SortOrder) -> Result<View> {
        self.sort_with(field, order, Collation::default())
    }

    pub fn sort_with(&self, field: &str, order: SortOrder, collation: Collation) -> Result<View> {
        self.ensure_loaded()?;
        {
            let arena = self.arena.borrow();
            let mut state = self.state.borrow_mut();
            if field == "*" {
                state.entries.sort_by(|(a, _), (b, _)| match order {
                    SortOrder::Asc => a.cmp(b),
                    SortOrder::Desc => b.cmp(a),
                });
            } else {
                let path = FieldPath::parse(field);
                state.entries.sort_by(|(_, a), (_, b)| {
                    sort_cmp(
                        arena.walk(*a, &path).map(|id| arena.get(id)),
                        arena.walk(*b, &path).map(|id| arena.get(id)),
                        order,
                        collation,
                    )
                });
            }
        }
        self.touch()?;
        Ok(self.clone())
    }

    /// All but the first `n` entries.
    pub fn skip(&self, n: usize) -> Result<View> {
        self.ensure_loaded()?;
        let entries = self.state.borrow().entries.iter().skip(n).cloned().collect();
        Ok(self.derive(entries))
    }

    /// At most the first `n` entries.
    pub fn limit(&self, n: usize) -> Result<View> {
        self.ensure_loaded()?;
        let entries = self.state.borrow().entries.iter().take(n).cloned().collect();
        Ok(self.derive(entries))
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Insert a record under `key`, or under the next free index.
    ///
    /// The record is added to this view and to every ancestor under the same
    /// key, so an insert through a filtered view still reaches the root. Fails
    /// with `UnsupportedOperation` if the chain contains a projection.
    pub fn insert(&self, data: impl Into<Value>, key: Option<Key>) -> Result<Key> {
        let key = self.insert_quiet(data.into(), key)?;
        self.set_modified(true)?;
        Ok(key)
    }

    /// Insert several records with auto-assigned keys; autoflushes at most once.
    pub fn insert_many<I>(&self, records: I) -> Result<Vec<Key>>
    where
        I: IntoIterator<Item = Value>,
    {
        let keys = records
            .into_iter()
            .map(|record| self.insert_quiet(record, None))
            .collect::<Result<Vec<_>>>()?;
        if !keys.is_empty() {
            self.set_modified(true)?;
        }
        Ok(keys)
    }

    fn insert_quiet(&self, data: Value, key: Option<Key>) -> Result<Key> {
        self.ensure_loaded()?;
        let lineage = self.lineage();
        if lineage.iter().any(View::is_projection) {
            return Err(DocsetError::UnsupportedOperation(
                "Cannot insert into a select() projection".into(),
            ));
        }
        let key = key.unwrap_or_else(|| {
            Key::Index(
                lineage
                    .iter()
                    .map(|view| view.state.borrow().entries.next_index())
                    .max()
                    .unwrap_or(0),
            )
        });
        let id = self.arena.borrow_mut().import(data);
        for view in &lineage {
            view.state.borrow_mut().entries.insert(key.clone(), id);
        }
        Ok(key)
    }

    /// Shallow-merge `data` (a mapping) into every mapping record of this
    /// view. Returns the number of records merged.
    pub fn update(&self, data: impl Into<Value>) -> Result<usize> {
        let Value::Object(data) = data.into() else {
            return Err(DocsetError::Validation(
                "update() expects a mapping".into(),
            ));
        };
        self.ensure_loaded()?;
        let merged = {
            let state = self.state.borrow();
            let mut arena = self.arena.borrow_mut();
            state
                .entries
                .iter()
                .filter(|(_, id)| arena.merge(*id, &data))
                .count()
        };
        if merged > 0 {
            self.set_modified(true)?;
        }
        Ok(merged)
    }

    /// Edit the record at `key` in place. Every view aliasing that record sees
    /// the edit. Returns false when the key is absent.
    pub fn modify<F>(&self, key: impl Into<Key>, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Value),
    {
        self.ensure_loaded()?;
        let key = key.into();
        let Some(id) = self.state.borrow().entries.get(&key) else {
            return Ok(false);
        };
        let mut value = self.arena.borrow().export(id);
        edit(&mut value);
        self.arena.borrow_mut().assign(id, value);
        self.set_modified(true)?;
        Ok(true)
    }

    /// Remove `field` (may be dotted) from every record of this view. The
    /// records stay. Returns the number of records that lost the field.
    pub fn delete_field(&self, field: &str) -> Result<usize> {
        self.ensure_loaded()?;
        let path = FieldPath::parse(field);
        let (prefix, last) = path.split_last();
        let removed = {
            let state = self.state.borrow();
            let mut arena = self.arena.borrow_mut();
            let mut removed = 0;
            for (_, id) in state.entries.iter() {
                let target = match &prefix {
                    Some(prefix) => arena.walk(*id, prefix),
                    None => Some(*id),
                };
                if target.is_some_and(|target| arena.remove_field(target, last)) {
                    removed += 1;
                }
            }
            removed
        };
        self.set_modified(true)?;
        Ok(removed)
    }

    /// Remove this view's keys from every ancestor, then empty this view.
    /// On a projection, only the projected field is removed from each parent
    /// record.
    pub fn delete(&self) -> Result<()> {
        self.ensure_loaded()?;
        if let Some(field) = self.projected_field() {
            return self.delete_projected(&field);
        }
        let keys: HashSet<Key> = self.state.borrow().entries.keys().into_iter().collect();
        for ancestor in self.lineage().iter().skip(1) {
            let removed = ancestor.state.borrow_mut().entries.remove_all(&keys);
            log::debug!("Cascading delete removed {removed} entries from ancestor");
        }
        self.state.borrow_mut().entries.clear();
        self.set_modified(true)
    }

    /// Rebuild this view's key space from the value at `field` (may be dotted).
    /// Ancestors keep their keys.
    pub fn reindex(&self, field: &str, ignore_duplicates: bool) -> Result<View> {
        self.ensure_loaded()?;
        let path = FieldPath::parse(field);
        let rebuilt = {
            let arena = self.arena.borrow();
            let state = self.state.borrow();
            let mut rebuilt = Entries::default();
            for (old_key, id) in state.entries.iter() {
                let key = arena
                    .walk(*id, &path)
                    .and_then(|found| arena.get(found).as_scalar())
                    .and_then(Key::from_value)
                    .ok_or_else(|| {
                        DocsetError::Key(format!(
                            "Record {old_key} does not have a field '{field}'"
                        ))
                    })?;
                if rebuilt.contains(&key) && !ignore_duplicates {
                    return Err(DocsetError::Key(format!("Duplicate key {key}")));
                }
                rebuilt.insert(key, *id);
            }
            rebuilt
        };
        self.state.borrow_mut().entries = rebuilt;
        self.touch()?;
        Ok(self.clone())
    }

    /// Replace this view's storage with `data`: a mapping (member names become
    /// keys) or a sequence (indices become keys). Scalars are rejected.
    pub fn set(&self, data: Value, modified: bool) -> Result<()> {
        let entries: Entries = {
            let mut arena = self.arena.borrow_mut();
            match data {
                Value::Object(map) => map
                    .into_iter()
                    .map(|(name, value)| (Key::parse(&name), arena.import(value)))
                    .collect(),
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(pos, value)| (Key::Index(pos as i64), arena.import(value)))
                    .collect(),
                scalar => {
                    return Err(DocsetError::Validation(format!(
                        "set() expects a mapping, a sequence or a view, got {scalar}"
                    )))
                }
            }
        };
        self.replace_entries(entries, modified)
    }

    /// Replace this view's storage with the entries of `other`. Views over the
    /// same arena end up aliasing the same records; otherwise records are copied.
    pub fn set_from(&self, other: &View, modified: bool) -> Result<()> {
        other.ensure_loaded()?;
        let entries = if Rc::ptr_eq(&self.arena, &other.arena) {
            other.state.borrow().entries.clone()
        } else {
            let records = other.fetch()?;
            let mut arena = self.arena.borrow_mut();
            records
                .into_iter()
                .map(|(key, value)| (key, arena.import(value)))
                .collect()
        };
        self.replace_entries(entries, modified)
    }

    fn replace_entries(&self, entries: Entries, modified: bool) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            state.entries = entries;
            if let ViewKind::Store(store) = &mut state.kind {
                store.loaded = true;
            }
            if !modified {
                state.modified = false;
            }
        }
        if modified {
            self.set_modified(true)?;
        }
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Key/record pairs in iteration order.
    pub fn fetch(&self) -> Result<Vec<(Key, Value)>> {
        self.ensure_loaded()?;
        let arena = self.arena.borrow();
        let state = self.state.borrow();
        Ok(state
            .entries
            .iter()
            .map(|(key, id)| (key.clone(), arena.export(*id)))
            .collect())
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.ensure_loaded()?;
        let found = self.state.borrow().entries.get(&key.into());
        Ok(found.map(|id| self.arena.borrow().export(id)))
    }

    pub fn keys(&self) -> Result<Vec<Key>> {
        self.ensure_loaded()?;
        Ok(self.state.borrow().entries.keys())
    }

    pub fn count(&self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.state.borrow().entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    pub fn first(&self) -> Result<Option<Value>> {
        self.ensure_loaded()?;
        let found = self.state.borrow().entries.first();
        Ok(found.map(|id| self.arena.borrow().export(id)))
    }

    pub fn last(&self) -> Result<Option<Value>> {
        self.ensure_loaded()?;
        let found = self.state.borrow().entries.last();
        Ok(found.map(|id| self.arena.borrow().export(id)))
    }

    /// The record set in its on-disk shape: a JSON array when the keys are
    /// exactly `0..n` in order, otherwise an object keyed by record key.
    pub fn to_json(&self) -> Result<Value> {
        self.ensure_loaded()?;
        let arena = self.arena.borrow();
        let state = self.state.borrow();
        if state.entries.is_sequential() {
            return Ok(Value::Array(
                state.entries.iter().map(|(_, id)| arena.export(*id)).collect(),
            ));
        }
        let mut map = Map::new();
        for (key, id) in state.entries.iter() {
            map.insert(key.to_string(), arena.export(*id));
        }
        Ok(Value::Object(map))
    }

    // ── Modified flag and flushing ──────────────────────────────────

    pub fn is_modified(&self) -> bool {
        self.state.borrow().modified
    }

    /// Set the modified flag on this view and every ancestor. Setting it to
    /// true flushes the chain if any store on it has `autoflush` enabled.
    pub fn set_modified(&self, flag: bool) -> Result<()> {
        let mut autoflush = false;
        for view in self.lineage() {
            let mut state = view.state.borrow_mut();
            state.modified = flag;
            if let ViewKind::Store(store) = &state.kind {
                autoflush |= store.options.autoflush;
            }
        }
        if flag && autoflush {
            self.flush()?;
        }
        Ok(())
    }

    /// Mark only this view modified; flush if it is itself an autoflush store.
    fn touch(&self) -> Result<()> {
        let autoflush = {
            let mut state = self.state.borrow_mut();
            state.modified = true;
            matches!(&state.kind, ViewKind::Store(store) if store.options.autoflush)
        };
        if autoflush {
            self.flush()?;
        }
        Ok(())
    }

    /// Persist every store from this view up to the root and clear the
    /// modified flags along the way.
    pub fn flush(&self) -> Result<()> {
        for view in self.lineage() {
            view.persist()?;
            view.state.borrow_mut().modified = false;
        }
        self.reclaim();
        Ok(())
    }

    /// Release the record nodes that no live view of this family can reach.
    /// Skipped while any of those views is borrowed.
    fn reclaim(&self) {
        let mut roots = Vec::new();
        {
            let mut members = self.family.borrow_mut();
            members.retain(|member| member.strong_count() > 0);
            for member in members.iter().filter_map(Weak::upgrade) {
                let Ok(state) = member.try_borrow() else {
                    return;
                };
                roots.extend(state.entries.iter().map(|(_, id)| *id));
            }
        }
        let Ok(mut arena) = self.arena.try_borrow_mut() else {
            return;
        };
        let released = arena.collect(roots);
        if released > 0 {
            log::debug!("Released {released} record nodes, {} still live", arena.len());
        }
    }

    #[cfg(test)]
    pub(crate) fn arena_size(&self) -> usize {
        self.arena.borrow().len()
    }
}

impl Default for View {
    fn default() -> Self {
        View::new()
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let kind = match &state.kind {
            ViewKind::Plain => "plain".to_string(),
            ViewKind::Projection { field } => format!("projection({field})"),
            ViewKind::Store(store) => format!("store({})", store.path.display()),
        };
        f.debug_struct("View")
            .field("kind", &kind)
            .field("entries", &state.entries.len())
            .field("modified", &state.modified)
            .field("has_parent", &state.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn people() -> View {
        View::from_json(json!({
            "1": {"name": "Ann", "age": 10, "gender": "Female",
                  "address": {"state": "Texas", "zip": 75001, "street": "1 Elm"}},
            "2": {"name": "Bob", "age": 70, "gender": "Male",
                  "address": {"state": "New York", "zip": 10001, "street": "12345 Broadway"}},
            "3": {"name": "Cid", "age": 80, "gender": "Female",
                  "address": {"state": "California", "zip": 94008, "street": "4 Oak"}},
            "4": {"name": "Dee", "age": 15}
        }))
        .unwrap()
    }

    fn keys(view: &View) -> Vec<Key> {
        view.keys().unwrap()
    }

    #[test]
    fn test_where_and_update_write_through() {
        let root = View::from_json(json!({"1": {"age": 10}, "2": {"age": 70}})).unwrap();
        let old = root.and_where("age", ">", 65).unwrap();
        assert_eq!(old.fetch().unwrap(), vec![(Key::from(2), json!({"age": 70}))]);

        assert_eq!(old.update(json!({"age": 71})).unwrap(), 1);
        assert_eq!(root.get(2).unwrap(), Some(json!({"age": 71})));
        assert_eq!(root.get(1).unwrap(), Some(json!({"age": 10})));
        assert!(root.is_modified());
    }

    #[test]
    fn test_chained_where() {
        let root = people();
        let seniors = root.and_where("age", ">", 65).unwrap();
        let women = seniors.and_where("gender", "=", "Female").unwrap();
        assert_eq!(keys(&women), vec![Key::from(3)]);
        assert!(women.parent().unwrap().same_view(&seniors));
    }

    #[test]
    fn test_key_lookup() {
        let root = people();
        let hit = root.and_where("*", "=", 3).unwrap();
        assert_eq!(keys(&hit), vec![Key::from(3)]);
        let by_string = root.and_where("*", "=", "3").unwrap();
        assert_eq!(keys(&by_string), vec![Key::from(3)]);
        let miss = root.and_where("*", "=", 99).unwrap();
        assert!(miss.is_empty().unwrap());
    }

    #[test]
    fn test_dotted_where() {
        let root = people();
        let texans = root.and_where("address.state", "=", "Texas").unwrap();
        assert_eq!(keys(&texans), vec![Key::from(1)]);
        // the result aliases whole records, not the projected address
        assert_eq!(texans.first().unwrap().unwrap()["name"], json!("Ann"));
    }

    #[test]
    fn test_null_comparisons() {
        let root = people();
        let homeless = root.and_where("address", "=", Value::Null).unwrap();
        assert_eq!(keys(&homeless), vec![Key::from(4)]);
        let housed = root.and_where("address", "!=", Value::Null).unwrap();
        assert_eq!(keys(&housed), vec![Key::from(1), Key::from(2), Key::from(3)]);
    }

    #[test]
    fn test_missing_field_skipped_for_comparisons() {
        let root = people();
        let not_male = root.and_where("gender", "!=", "Male").unwrap();
        assert_eq!(keys(&not_male), vec![Key::from(1), Key::from(3)]);
    }

    #[test]
    fn test_like() {
        let root = people();
        let long_numbers = root
            .and_where("address.street", "like", r"/^\d{5,} /")
            .unwrap();
        assert_eq!(keys(&long_numbers), vec![Key::from(2)]);
    }

    #[test]
    fn test_where_rejects_bad_input() {
        let root = people();
        assert!(matches!(
            root.and_where("age", "~", 1),
            Err(DocsetError::Validation(_))
        ));
        assert!(matches!(
            root.and_where("age", "=", json!([1])),
            Err(DocsetError::Validation(_))
        ));
        assert!(matches!(
            root.and_where("*", "=", json!({"a": 1})),
            Err(DocsetError::Validation(_))
        ));
    }

    #[test]
    fn test_or_where_widens_through_parent() {
        let root = people();
        let set = root
            .and_where("address.state", "=", "New York")
            .unwrap()
            .or_where("address.state", "=", "Texas")
            .unwrap();
        assert_eq!(keys(&set), vec![Key::from(1), Key::from(2)]);
        assert!(set.parent().unwrap().same_view(&root));

        let wider = set.or_where("age", "=", 15).unwrap();
        assert_eq!(keys(&wider), vec![Key::from(4), Key::from(1), Key::from(2)]);
    }

    #[test]
    fn test_or_where_on_root_is_identity() {
        let root = people();
        let same = root.or_where("age", "=", 1).unwrap();
        assert!(same.same_view(&root));
    }

    #[test]
    fn test_sort_is_local() {
        let root = people();
        let all = root.skip(0).unwrap();
        let sibling = root.skip(0).unwrap();
        all.sort("name", SortOrder::Desc).unwrap();
        assert_eq!(
            keys(&all),
            vec![Key::from(4), Key::from(3), Key::from(2), Key::from(1)]
        );
        assert_eq!(
            keys(&sibling),
            vec![Key::from(1), Key::from(2), Key::from(3), Key::from(4)]
        );
        assert_eq!(
            keys(&root),
            vec![Key::from(1), Key::from(2), Key::from(3), Key::from(4)]
        );
    }

    #[test]
    fn test_sort_missing_fields_last() {
        let root = people();
        root.sort("address.zip", SortOrder::Asc).unwrap();
        // lexical: "10001" < "75001" < "94008", record 4 has no address
        assert_eq!(
            keys(&root),
            vec![Key::from(2), Key::from(1), Key::from(3), Key::from(4)]
        );
    }

    #[test]
    fn test_sort_collations() {
        let root = View::from_json(json!([{"n": 10}, {"n": 9}, {"n": 100}])).unwrap();
        root.sort("n", SortOrder::Asc).unwrap();
        assert_eq!(keys(&root), vec![Key::from(0), Key::from(2), Key::from(1)]);
        root.sort_with("n", SortOrder::Asc, Collation::Numeric).unwrap();
        assert_eq!(keys(&root), vec![Key::from(1), Key::from(0), Key::from(2)]);
    }

    #[test]
    fn test_sort_by_key() {
        let root = View::from_json(json!({"b": {}, "10": {}, "a": {}, "2": {}})).unwrap();
        root.sort("*", SortOrder::Asc).unwrap();
        assert_eq!(
            keys(&root),
            vec![Key::from(2), Key::from(10), Key::from("a"), Key::from("b")]
        );
        root.sort("*", SortOrder::Desc).unwrap();
        assert_eq!(keys(&root)[0], Key::from("b"));
    }

    #[test]
    fn test_skip_and_limit() {
        let root = people();
        assert_eq!(keys(&root.skip(3).unwrap()), vec![Key::from(4)]);
        assert_eq!(
            keys(&root.limit(2).unwrap()),
            vec![Key::from(1), Key::from(2)]
        );
        assert!(root.skip(10).unwrap().is_empty().unwrap());
        let page = root.skip(1).unwrap().limit(1).unwrap();
        assert_eq!(keys(&page), vec![Key::from(2)]);
        page.update(json!({"paged": true})).unwrap();
        assert_eq!(root.get(2).unwrap().unwrap()["paged"], json!(true));
    }

    #[test]
    fn test_insert_auto_key_and_explicit_key() {
        let root = people();
        let key = root.insert(json!({"name": "Eve"}), None).unwrap();
        assert_eq!(key, Key::from(5));
        root.insert(json!({"name": "Fay"}), Some(Key::from("fay"))).unwrap();
        assert_eq!(root.get("fay").unwrap(), Some(json!({"name": "Fay"})));
        assert_eq!(root.count().unwrap(), 6);
    }

    #[test]
    fn test_insert_into_empty_view_starts_at_zero() {
        let root = View::new();
        assert_eq!(root.insert(json!({"a": 1}), None).unwrap(), Key::from(0));
        assert_eq!(root.insert(json!({"a": 2}), None).unwrap(), Key::from(1));
    }

    #[test]
    fn test_insert_through_filtered_view_reaches_root() {
        let root = people();
        let minors = root.and_where("age", "<", 18).unwrap();
        let key = minors.insert(json!({"name": "Kid", "age": 5}), None).unwrap();
        assert_eq!(key, Key::from(5));
        assert_eq!(minors.count().unwrap(), 3);
        assert_eq!(root.get(5).unwrap().unwrap()["name"], json!("Kid"));
    }

    #[test]
    fn test_insert_many() {
        let root = View::new();
        let keys = root
            .insert_many(vec![json!({"a": 1}), json!({"a": 2})])
            .unwrap();
        assert_eq!(keys, vec![Key::from(0), Key::from(1)]);
        assert!(root.is_modified());
    }

    #[test]
    fn test_update_skips_scalars_and_rejects_non_mappings() {
        let root = View::from_json(json!([{"a": 1}, 5])).unwrap();
        assert_eq!(root.update(json!({"b": 2})).unwrap(), 1);
        assert_eq!(root.to_json().unwrap(), json!([{"a": 1, "b": 2}, 5]));
        assert!(matches!(
            root.update(json!(3)),
            Err(DocsetError::Validation(_))
        ));
    }

    #[test]
    fn test_update_without_matches_leaves_flag() {
        let root = View::from_json(json!([1, 2])).unwrap();
        assert_eq!(root.update(json!({"a": 1})).unwrap(), 0);
        assert!(!root.is_modified());
    }

    #[test]
    fn test_modify_is_visible_through_aliases() {
        let root = people();
        let zips = root.select("address.zip").unwrap();
        zips.modify(1, |zip| *zip = json!(75002)).unwrap();
        assert_eq!(root.get(1).unwrap().unwrap()["address"]["zip"], json!(75002));
        assert!(!root.modify(42, |_| {}).unwrap());
    }

    #[test]
    fn test_delete_field() {
        let root = people();
        assert_eq!(root.delete_field("gender").unwrap(), 3);
        let with_gender = root.and_where("gender", "!=", "").unwrap();
        assert!(with_gender.is_empty().unwrap());
        assert_eq!(root.count().unwrap(), 4);

        assert_eq!(root.delete_field("address.zip").unwrap(), 3);
        assert!(root.get(1).unwrap().unwrap()["address"].get("zip").is_none());
    }

    #[test]
    fn test_cascading_delete() {
        let root = people();
        let seniors = root.and_where("age", ">", 65).unwrap();
        let women = seniors.and_where("gender", "=", "Female").unwrap();
        women.delete().unwrap();
        assert!(women.is_empty().unwrap());
        assert_eq!(keys(&seniors), vec![Key::from(2)]);
        assert_eq!(keys(&root), vec![Key::from(1), Key::from(2), Key::from(4)]);
        assert!(root.is_modified());
    }

    #[test]
    fn test_reindex() {
        let root = people();
        let housed = root.and_where("address", "!=", Value::Null).unwrap();
        housed.reindex("address.zip", false).unwrap();
        assert_eq!(
            keys(&housed),
            vec![Key::from(75001), Key::from(10001), Key::from(94008)]
        );
        // ancestors keep their keys
        assert_eq!(keys(&root)[0], Key::from(1));

        let hit = housed.and_where("*", "=", 94008).unwrap();
        assert_eq!(hit.first().unwrap().unwrap()["name"], json!("Cid"));
    }

    #[test]
    fn test_reindex_missing_field() {
        let root = people();
        let result = root.reindex("address.zip", false);
        assert!(matches!(result, Err(DocsetError::Key(_))));
        // a failed reindex leaves the view untouched
        assert_eq!(keys(&root)[3], Key::from(4));
    }

    #[test]
    fn test_reindex_duplicates() {
        let root = people();
        assert!(matches!(
            root.reindex("gender", false),
            Err(DocsetError::Key(_))
        ));

        root.delete_field("address").unwrap();
        root.and_where("gender", "=", Value::Null)
            .unwrap()
            .delete()
            .unwrap();
        root.reindex("gender", true).unwrap();
        assert_eq!(keys(&root), vec![Key::from("Female"), Key::from("Male")]);
        // the later record wins
        assert_eq!(root.get("Female").unwrap().unwrap()["name"], json!("Cid"));
    }

    #[test]
    fn test_set_variants() {
        let root = View::new();
        root.set(json!({"a": {"x": 1}}), true).unwrap();
        assert_eq!(keys(&root), vec![Key::from("a")]);
        assert!(root.is_modified());

        root.set(json!([{"x": 1}, {"x": 2}]), false).unwrap();
        assert_eq!(keys(&root), vec![Key::from(0), Key::from(1)]);
        assert!(!root.is_modified());

        assert!(matches!(
            root.set(json!("scalar"), true),
            Err(DocsetError::Validation(_))
        ));
    }

    #[test]
    fn test_set_from_aliases_within_arena() {
        let root = people();
        let seniors = root.and_where("age", ">", 65).unwrap();
        let copy = root.skip(0).unwrap();
        copy.set_from(&seniors, false).unwrap();
        copy.update(json!({"flag": 1})).unwrap();
        assert_eq!(root.get(2).unwrap().unwrap()["flag"], json!(1));

        let detached = View::new();
        detached.set_from(&seniors, false).unwrap();
        detached.update(json!({"flag": 2})).unwrap();
        assert_eq!(root.get(2).unwrap().unwrap()["flag"], json!(1));
    }

    #[test]
    fn test_accessors_on_empty_view() {
        let root = View::new();
        assert_eq!(root.first().unwrap(), None);
        assert_eq!(root.last().unwrap(), None);
        assert!(root.is_empty().unwrap());
        assert_eq!(root.to_json().unwrap(), json!([]));
    }

    #[test]
    fn test_first_and_last() {
        let root = people();
        assert_eq!(root.first().unwrap().unwrap()["name"], json!("Ann"));
        assert_eq!(root.last().unwrap().unwrap()["name"], json!("Dee"));
    }

    #[test]
    fn test_modified_propagates_and_flush_clears() {
        let root = people();
        let child = root.limit(1).unwrap();
        child.set_modified(true).unwrap();
        assert!(root.is_modified());
        child.flush().unwrap();
        assert!(!root.is_modified());
        assert!(!child.is_modified());
    }

    #[test]
    fn test_root_modify_reaches_existing_projection() {
        let root = people();
        let zips = root.select("address.zip").unwrap();
        root.modify(1, |record| record["address"]["zip"] = json!(42))
            .unwrap();
        assert_eq!(zips.get(1).unwrap(), Some(json!(42)));
    }

    #[test]
    fn test_repeated_updates_keep_arena_bounded() {
        let root = people();
        let seniors = root.and_where("age", ">", 65).unwrap();
        seniors.update(json!({"visits": 0, "last": {"day": 0}})).unwrap();
        let size = root.arena_size();
        for day in 1..50 {
            seniors
                .update(json!({"visits": day, "last": {"day": day}}))
                .unwrap();
        }
        assert_eq!(root.arena_size(), size);
        assert_eq!(root.get(3).unwrap().unwrap()["last"], json!({"day": 49}));
    }

    #[test]
    fn test_flush_releases_unreachable_records() {
        let root = View::from_json(json!({
            "1": {"name": "a", "tags": ["x", "y"]},
            "2": {"name": "b"},
            "3": {"name": "c"}
        }))
        .unwrap();
        let size = root.arena_size();

        // record 2 stays reachable through `kept` after the delete
        let kept = root.and_where("name", "=", "b").unwrap().skip(0).unwrap();
        root.and_where("name", "!=", "c").unwrap().delete().unwrap();
        root.flush().unwrap();
        assert_eq!(root.arena_size(), size - 5);
        assert_eq!(kept.get(2).unwrap(), Some(json!({"name": "b"})));
        assert_eq!(root.to_json().unwrap(), json!({"3": {"name": "c"}}));

        drop(kept);
        root.flush().unwrap();
        assert_eq!(root.arena_size(), 2);

        // released slots are reused
        root.insert(json!({"name": "d"}), None).unwrap();
        assert_eq!(root.arena_size(), 4);
        assert_eq!(root.get(4).unwrap(), Some(json!({"name": "d"})));
    }
}
