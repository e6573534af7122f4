//! View rows
//!
//! A row carries display values in insertion order and may own included rows
//! (one level in practice, but nothing here limits the depth).

use serde::{Serialize, Serializer};

use crate::descriptor::FieldValues;
use crate::types::{RowId, Value, WindowId};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViewRow {
    window_id: WindowId,
    id: RowId,
    row_type: Option<String>,
    processed: bool,
    #[serde(serialize_with = "serialize_ordered")]
    values: Vec<(String, Value)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    included_rows: Vec<ViewRow>,
}

fn serialize_ordered<S: Serializer>(
    values: &[(String, Value)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(values.iter().map(|(k, v)| (k, v)))
}

impl ViewRow {
    pub fn builder(window_id: WindowId, id: RowId) -> ViewRowBuilder {
        ViewRowBuilder {
            row: ViewRow {
                window_id,
                id,
                row_type: None,
                processed: false,
                values: Vec::new(),
                included_rows: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn window_id(&self) -> &WindowId {
        &self.window_id
    }

    pub fn row_type(&self) -> Option<&str> {
        self.row_type.as_deref()
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn value(&self, field_name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == field_name)
            .map(|(_, v)| v)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn included_rows(&self) -> &[ViewRow] {
        &self.included_rows
    }

    pub fn has_included_rows(&self) -> bool {
        !self.included_rows.is_empty()
    }

    /// This row followed by all of its descendants, depth first
    pub fn stream_recursive(&self) -> Vec<&ViewRow> {
        let mut out = Vec::new();
        self.push_recursive(&mut out);
        out
    }

    fn push_recursive<'a>(&'a self, out: &mut Vec<&'a ViewRow>) {
        out.push(self);
        for row in &self.included_rows {
            row.push_recursive(out);
        }
    }

    /// True if this row or any descendant has `id`
    pub fn contains_recursive(&self, id: RowId) -> bool {
        self.id == id || self.included_rows.iter().any(|r| r.contains_recursive(id))
    }
}

impl FieldValues for ViewRow {
    fn field_value(&self, name: &str) -> Option<&Value> {
        self.value(name)
    }
}

pub struct ViewRowBuilder {
    row: ViewRow,
}

impl ViewRowBuilder {
    pub fn row_type(mut self, row_type: impl Into<String>) -> Self {
        self.row.row_type = Some(row_type.into());
        self
    }

    pub fn processed(mut self, processed: bool) -> Self {
        self.row.processed = processed;
        self
    }

    /// Set a value; setting the same name again replaces it in place
    pub fn value(mut self, field_name: impl Into<String>, value: impl Into<Value>) -> Self {
        let field_name = field_name.into();
        let value = value.into();
        match self.row.values.iter_mut().find(|(name, _)| *name == field_name) {
            Some((_, existing)) => *existing = value,
            None => self.row.values.push((field_name, value)),
        }
        self
    }

    pub fn included_row(mut self, row: ViewRow) -> Self {
        self.row.included_rows.push(row);
        self
    }

    pub fn build(self) -> ViewRow {
        self.row
    }
}
