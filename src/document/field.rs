//! Per-instance field state

use std::sync::Arc;

use super::lookup::LookupValues;
use crate::descriptor::FieldDescriptor;
use crate::types::Value;

/// Current value and derived state of one field of one document.
///
/// Mutated only through its owning `Document`; the descriptor itself stays on
/// the shared schema.
#[derive(Clone, Debug)]
pub struct DocumentField {
    field_name: String,
    value: Value,
    previous_value: Value,
    readonly: bool,
    displayed: bool,
    mandatory: bool,
    lookup_values_stale: bool,
    lookup_values: Option<Arc<LookupValues>>,
}

impl DocumentField {
    pub(crate) fn new(descriptor: &FieldDescriptor) -> Self {
        let value = descriptor.default_value().cloned().unwrap_or_default();
        Self {
            field_name: descriptor.field_name().to_string(),
            previous_value: value.clone(),
            value,
            readonly: false,
            displayed: true,
            mandatory: false,
            lookup_values_stale: false,
            lookup_values: None,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The value before the last effective change
    pub fn previous_value(&self) -> &Value {
        &self.previous_value
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn is_displayed(&self) -> bool {
        self.displayed
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_lookup_values_stale(&self) -> bool {
        self.lookup_values_stale
    }

    /// Displayed mandatory field without a value
    pub fn is_missing_mandatory_value(&self) -> bool {
        self.displayed && self.mandatory && self.value.is_empty()
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.previous_value = std::mem::replace(&mut self.value, value);
    }

    pub(crate) fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    pub(crate) fn set_displayed(&mut self, displayed: bool) {
        self.displayed = displayed;
    }

    pub(crate) fn set_mandatory(&mut self, mandatory: bool) {
        self.mandatory = mandatory;
    }

    pub(crate) fn mark_lookup_values_stale(&mut self) {
        self.lookup_values_stale = true;
    }

    pub(crate) fn cached_lookup_values(&self) -> Option<&Arc<LookupValues>> {
        if self.lookup_values_stale {
            None
        } else {
            self.lookup_values.as_ref()
        }
    }

    pub(crate) fn set_lookup_values(&mut self, values: Arc<LookupValues>) {
        self.lookup_values = Some(values);
        self.lookup_values_stale = false;
    }
}
