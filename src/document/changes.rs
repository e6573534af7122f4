//! Change records for one document path
//!
//! A change record states *that* something changed, not the delta. Recording the
//! same (field, kind) twice leaves one entry; the attached snapshot always
//! reflects the most recently collected field state.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::field::DocumentField;
use crate::types::{DetailId, DocumentPath, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FieldChangeKind {
    Value,
    Readonly,
    Mandatory,
    Displayed,
    LookupValuesStaled,
}

/// Why a change was collected. Diagnostics only; never affects behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reason(String);

impl Reason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    /// Reason for a change triggered by another field's value change
    pub fn caused_by(field_name: &str, kind: FieldChangeKind) -> Self {
        Self(format!("{:?} recomputed after {} changed", kind, field_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Reason {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collected changes for one field
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentFieldChange {
    field_name: String,
    kinds: BTreeSet<FieldChangeKind>,
    value: Value,
    readonly: bool,
    mandatory: bool,
    displayed: bool,
    lookup_values_stale: bool,
    #[serde(skip)]
    reasons: BTreeMap<FieldChangeKind, Reason>,
}

impl DocumentFieldChange {
    fn new(field: &DocumentField) -> Self {
        Self {
            field_name: field.field_name().to_string(),
            kinds: BTreeSet::new(),
            value: field.value().clone(),
            readonly: field.is_readonly(),
            mandatory: field.is_mandatory(),
            displayed: field.is_displayed(),
            lookup_values_stale: field.is_lookup_values_stale(),
            reasons: BTreeMap::new(),
        }
    }

    fn refresh(&mut self, field: &DocumentField) {
        self.value = field.value().clone();
        self.readonly = field.is_readonly();
        self.mandatory = field.is_mandatory();
        self.displayed = field.is_displayed();
        self.lookup_values_stale = field.is_lookup_values_stale();
    }

    /// Returns true if `kind` was not collected before
    fn add(&mut self, kind: FieldChangeKind, reason: Reason) -> bool {
        self.reasons.entry(kind).or_insert(reason);
        self.kinds.insert(kind)
    }

    fn merge(&mut self, from: &DocumentFieldChange) {
        self.kinds.extend(from.kinds.iter().copied());
        for (kind, reason) in &from.reasons {
            self.reasons.entry(*kind).or_insert_with(|| reason.clone());
        }
        self.value = from.value.clone();
        self.readonly = from.readonly;
        self.mandatory = from.mandatory;
        self.displayed = from.displayed;
        self.lookup_values_stale = from.lookup_values_stale;
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn kinds(&self) -> &BTreeSet<FieldChangeKind> {
        &self.kinds
    }

    pub fn has(&self, kind: FieldChangeKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_displayed(&self) -> bool {
        self.displayed
    }

    pub fn is_lookup_values_stale(&self) -> bool {
        self.lookup_values_stale
    }

    pub fn reason(&self, kind: FieldChangeKind) -> Option<&Reason> {
        self.reasons.get(&kind)
    }
}

/// All changes collected for one document path during a unit of work
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentChanges {
    document_path: DocumentPath,
    fields: BTreeMap<String, DocumentFieldChange>,
    stale_details: BTreeSet<DetailId>,
}

impl DocumentChanges {
    pub(crate) fn new(document_path: DocumentPath) -> Self {
        Self {
            document_path,
            fields: BTreeMap::new(),
            stale_details: BTreeSet::new(),
        }
    }

    pub fn document_path(&self) -> &DocumentPath {
        &self.document_path
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|f| f.kinds.is_empty()) && self.stale_details.is_empty()
    }

    pub fn field_names(&self) -> BTreeSet<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn field_change(&self, field_name: &str) -> Option<&DocumentFieldChange> {
        self.fields.get(field_name)
    }

    pub fn field_changes(&self) -> impl Iterator<Item = &DocumentFieldChange> {
        self.fields.values()
    }

    pub fn stale_details(&self) -> &BTreeSet<DetailId> {
        &self.stale_details
    }

    /// Number of distinct (field, kind) entries
    pub fn entry_count(&self) -> usize {
        self.fields.values().map(|f| f.kinds.len()).sum()
    }

    pub(crate) fn collect(
        &mut self,
        field: &DocumentField,
        kind: FieldChangeKind,
        reason: Reason,
    ) -> bool {
        let change = self
            .fields
            .entry(field.field_name().to_string())
            .or_insert_with(|| DocumentFieldChange::new(field));
        change.refresh(field);
        change.add(kind, reason)
    }

    /// Seed every kind for every field; returns true if anything new was collected
    pub(crate) fn collect_all<'a, I>(&mut self, fields: I, reason: &Reason) -> bool
    where
        I: IntoIterator<Item = &'a DocumentField>,
    {
        let mut collected = false;
        for field in fields {
            for kind in [
                FieldChangeKind::Value,
                FieldChangeKind::Readonly,
                FieldChangeKind::Mandatory,
                FieldChangeKind::Displayed,
            ] {
                collected |= self.collect(field, kind, reason.clone());
            }
        }
        collected
    }

    pub(crate) fn collect_detail_staled(&mut self, detail_id: DetailId) -> bool {
        self.stale_details.insert(detail_id)
    }

    pub(crate) fn merge(&mut self, from: &DocumentChanges) {
        for (name, change) in &from.fields {
            match self.fields.get_mut(name) {
                Some(existing) => existing.merge(change),
                None => {
                    self.fields.insert(name.clone(), change.clone());
                }
            }
        }
        self.stale_details
            .extend(from.stale_details.iter().cloned());
    }
}
