//! View-level change aggregation
//!
//! Views report coarse changes: either the whole view is stale or a set of
//! row ids changed. Fully changed is sticky under merge.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::types::{RowId, ViewId};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViewChanges {
    view_id: ViewId,
    fully_changed: bool,
    changed_row_ids: BTreeSet<RowId>,
}

impl ViewChanges {
    fn new(view_id: ViewId) -> Self {
        Self {
            view_id,
            fully_changed: false,
            changed_row_ids: BTreeSet::new(),
        }
    }

    pub fn view_id(&self) -> &ViewId {
        &self.view_id
    }

    pub fn is_fully_changed(&self) -> bool {
        self.fully_changed
    }

    pub fn changed_row_ids(&self) -> &BTreeSet<RowId> {
        &self.changed_row_ids
    }

    pub fn has_changes(&self) -> bool {
        self.fully_changed || !self.changed_row_ids.is_empty()
    }

    fn merge(&mut self, from: &ViewChanges) {
        self.fully_changed |= from.fully_changed;
        self.changed_row_ids
            .extend(from.changed_row_ids.iter().copied());
    }
}

/// Per unit of work; views keep first-insertion order
#[derive(Clone, Debug, Default)]
pub struct ViewChangesCollector {
    order: Vec<ViewId>,
    by_view: HashMap<ViewId, ViewChanges>,
}

impl ViewChangesCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn view_changes(&mut self, view_id: &ViewId) -> &mut ViewChanges {
        if !self.by_view.contains_key(view_id) {
            self.order.push(view_id.clone());
        }
        self.by_view
            .entry(view_id.clone())
            .or_insert_with(|| ViewChanges::new(view_id.clone()))
    }

    pub fn collect_fully_changed(&mut self, view_id: &ViewId) {
        self.view_changes(view_id).fully_changed = true;
    }

    pub fn collect_changed_row_ids<I>(&mut self, view_id: &ViewId, row_ids: I)
    where
        I: IntoIterator<Item = RowId>,
    {
        let mut row_ids = row_ids.into_iter().peekable();
        if row_ids.peek().is_none() {
            return;
        }
        self.view_changes(view_id).changed_row_ids.extend(row_ids);
    }

    pub fn collect_from(&mut self, other: &ViewChangesCollector) {
        for changes in other.view_changes_in_order() {
            self.view_changes(&changes.view_id).merge(changes);
        }
    }

    pub fn get(&self, view_id: &ViewId) -> Option<&ViewChanges> {
        self.by_view.get(view_id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_view.values().all(|c| !c.has_changes())
    }

    pub fn view_changes_in_order(&self) -> impl Iterator<Item = &ViewChanges> {
        self.order.iter().filter_map(move |id| self.by_view.get(id))
    }

    pub fn into_changes(mut self) -> Vec<ViewChanges> {
        self.order
            .iter()
            .filter_map(|id| self.by_view.remove(id))
            .filter(ViewChanges::has_changes)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindowId;

    #[test]
    fn test_merge_keeps_fully_changed_and_unions_rows() {
        let view = ViewId::of(WindowId::new("540"), "v1");

        let mut a = ViewChangesCollector::new();
        a.collect_changed_row_ids(&view, [RowId(1), RowId(2)]);

        let mut b = ViewChangesCollector::new();
        b.collect_fully_changed(&view);
        b.collect_changed_row_ids(&view, [RowId(3)]);

        a.collect_from(&b);
        a.collect_from(&ViewChangesCollector::new());
        let changes = a.get(&view).unwrap();
        assert!(changes.is_fully_changed());
        assert_eq!(changes.changed_row_ids().len(), 3);

        b.collect_from(&a);
        assert!(b.get(&view).unwrap().is_fully_changed());
    }

    #[test]
    fn test_empty_row_ids_not_collected() {
        let view = ViewId::of(WindowId::new("540"), "v1");
        let mut collector = ViewChangesCollector::new();
        collector.collect_changed_row_ids(&view, std::iter::empty());
        assert!(collector.is_empty());
        assert!(collector.get(&view).is_none());
    }

    #[test]
    fn test_into_changes_in_view_order() {
        let v1 = ViewId::of(WindowId::new("540"), "v1");
        let v2 = ViewId::of(WindowId::new("540"), "v2");
        let mut collector = ViewChangesCollector::new();
        collector.collect_fully_changed(&v2);
        collector.collect_fully_changed(&v1);
        let ids: Vec<String> = collector
            .into_changes()
            .iter()
            .map(|c| c.view_id().view_id().to_string())
            .collect();
        assert_eq!(ids, vec!["v2", "v1"]);
    }
}
