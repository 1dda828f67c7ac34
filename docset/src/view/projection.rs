use super::{Entries, View, ViewKind};
use crate::error::Result;

impl View {
    /// One level of `select`: a view whose entries alias `field` inside each
    /// of this view's records, under the same keys. Records that are not
    /// mappings, or lack the field, are left out.
    pub(crate) fn project(&self, field: &str) -> View {
        let entries: Entries = {
            let arena = self.arena.borrow();
            let state = self.state.borrow();
            state
                .entries
                .iter()
                .filter_map(|(key, id)| arena.field(*id, field).map(|child| (key.clone(), child)))
                .collect()
        };
        View::from_parts(
            Some(self),
            entries,
            ViewKind::Projection {
                field: field.to_string(),
            },
        )
    }

    /// The field name a projection tracks, `None` for other views.
    pub fn projected_field(&self) -> Option<String> {
        match &self.state.borrow().kind {
            ViewKind::Projection { field } => Some(field.clone()),
            _ => None,
        }
    }

    /// `delete()` on a projection: drop `field` from each corresponding parent
    /// record instead of removing the records themselves.
    pub(crate) fn delete_projected(&self, field: &str) -> Result<()> {
        if let Some(parent) = self.parent() {
            let own = self.state.borrow();
            let parent_state = parent.state.borrow();
            let mut arena = self.arena.borrow_mut();
            for (key, _) in own.entries.iter() {
                if let Some(record) = parent_state.entries.get(key) {
                    arena.remove_field(record, field);
                }
            }
        }
        self.state.borrow_mut().entries.clear();
        self.set_modified(true)
    }
}
