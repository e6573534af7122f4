//! Lookup candidates for list/lookup fields
//!
//! Fetching is deferred: a change to a field listed in `lookup_depends_on` only
//! marks the dependent field stale. Candidates are fetched again the next time
//! someone reads them.

use serde::Serialize;

use crate::descriptor::FieldValues;
use crate::error::Result;
use crate::types::Value;

/// Candidate values for a lookup field
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LookupValues {
    values: Vec<Value>,
}

impl LookupValues {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values
            .iter()
            .any(|v| matches!(v, Value::Lookup { key: k, .. } if k == key))
    }
}

/// Retrieves lookup candidates for a field, given the document's current values
pub trait LookupDataSource {
    fn retrieve_lookup_values(
        &self,
        field_name: &str,
        document_values: &dyn FieldValues,
    ) -> Result<LookupValues>;
}
