//! Document change collector
//!
//! Accumulates, per document path, the fields that changed during one unit of
//! work. Paths keep first-insertion order so payloads built from the collector
//! are deterministic. Merging is associative and idempotent per
//! (path, field, kind).

use std::collections::{BTreeSet, HashMap};

use super::changes::{DocumentChanges, FieldChangeKind, Reason};
use super::document::Document;
use super::field::DocumentField;
use crate::types::{DetailId, DocumentPath};

#[derive(Debug, Default, Clone)]
pub struct DocumentChangesCollector {
    order: Vec<DocumentPath>,
    by_path: HashMap<DocumentPath, DocumentChanges>,
}

impl DocumentChangesCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn document_changes(&mut self, path: &DocumentPath) -> &mut DocumentChanges {
        if !self.by_path.contains_key(path) {
            self.order.push(path.clone());
        }
        self.by_path
            .entry(path.clone())
            .or_insert_with(|| DocumentChanges::new(path.clone()))
    }

    pub fn collect_value_changed(
        &mut self,
        path: &DocumentPath,
        field: &DocumentField,
        reason: Reason,
    ) {
        self.document_changes(path)
            .collect(field, FieldChangeKind::Value, reason);
    }

    pub fn collect_readonly_changed(
        &mut self,
        path: &DocumentPath,
        field: &DocumentField,
        reason: Reason,
    ) {
        self.document_changes(path)
            .collect(field, FieldChangeKind::Readonly, reason);
    }

    pub fn collect_mandatory_changed(
        &mut self,
        path: &DocumentPath,
        field: &DocumentField,
        reason: Reason,
    ) {
        self.document_changes(path)
            .collect(field, FieldChangeKind::Mandatory, reason);
    }

    pub fn collect_displayed_changed(
        &mut self,
        path: &DocumentPath,
        field: &DocumentField,
        reason: Reason,
    ) {
        self.document_changes(path)
            .collect(field, FieldChangeKind::Displayed, reason);
    }

    pub fn collect_lookup_values_staled(
        &mut self,
        path: &DocumentPath,
        field: &DocumentField,
        reason: Reason,
    ) {
        self.document_changes(path)
            .collect(field, FieldChangeKind::LookupValuesStaled, reason);
    }

    /// Record that the rows of an included detail changed (added or removed)
    pub fn collect_included_detail_staled(&mut self, path: &DocumentPath, detail_id: DetailId) {
        self.document_changes(path).collect_detail_staled(detail_id);
    }

    /// Report a document's full current state, e.g. right after it was created.
    /// Returns true if anything new was collected.
    pub fn collect_from_document(&mut self, document: &Document, reason: Reason) -> bool {
        self.document_changes(document.path())
            .collect_all(document.fields(), &reason)
    }

    /// Merge another collector into this one
    pub fn collect_from(&mut self, other: &DocumentChangesCollector) {
        for (path, from) in other.document_changes_by_path() {
            self.document_changes(path).merge(from);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.values().all(DocumentChanges::is_empty)
    }

    /// Changes per path, in first-insertion order
    pub fn document_changes_by_path(
        &self,
    ) -> impl Iterator<Item = (&DocumentPath, &DocumentChanges)> {
        self.order
            .iter()
            .filter_map(move |path| self.by_path.get(path).map(|changes| (path, changes)))
    }

    pub fn changes_for(&self, path: &DocumentPath) -> Option<&DocumentChanges> {
        self.by_path.get(path)
    }

    pub fn field_names(&self, path: &DocumentPath) -> BTreeSet<String> {
        self.by_path
            .get(path)
            .map(DocumentChanges::field_names)
            .unwrap_or_default()
    }

    /// Flush: hand the collected changes over, in first-insertion order
    pub fn into_changes(mut self) -> Vec<DocumentChanges> {
        self.order
            .iter()
            .filter_map(|path| self.by_path.remove(path))
            .filter(|changes| !changes.is_empty())
            .collect()
    }
}
