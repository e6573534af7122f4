//! Per-row attributes
//!
//! Attributes are loaded on demand per row, cached, and dropped wholesale when
//! the owning view is invalidated.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::row::ViewRow;
use crate::error::{Result, StateError};
use crate::types::{RowId, Value};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RowAttributes {
    row_id: RowId,
    readonly: bool,
    values: Vec<(String, Value)>,
}

impl RowAttributes {
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }
}

/// Loads attribute values for one row
pub trait RowAttributesLoader: Send + Sync {
    fn load_attributes(&self, row: &ViewRow) -> Result<Vec<(String, Value)>>;
}

pub struct RowAttributesProvider {
    loader: Option<Arc<dyn RowAttributesLoader>>,
    readonly: bool,
    cache: Mutex<HashMap<RowId, Arc<RowAttributes>>>,
}

impl RowAttributesProvider {
    pub fn new(loader: Option<Arc<dyn RowAttributesLoader>>, readonly: bool) -> Self {
        Self {
            loader,
            readonly,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn has_attributes(&self) -> bool {
        self.loader.is_some()
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn get(&self, row: &ViewRow) -> Result<Arc<RowAttributes>> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| StateError::not_found(format!("attributes of row {}", row.id())))?;

        if let Some(cached) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&row.id())
        {
            return Ok(Arc::clone(cached));
        }

        let attributes = Arc::new(RowAttributes {
            row_id: row.id(),
            readonly: self.readonly,
            values: loader.load_attributes(row)?,
        });
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(row.id(), Arc::clone(&attributes));
        Ok(attributes)
    }

    pub fn invalidate_all(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
