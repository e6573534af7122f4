//! Registry of live views

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::changes::ViewChangesCollector;
use super::view::View;
use crate::error::{Result, StateError};
use crate::types::{TableRecordReference, ViewId};

#[derive(Default)]
pub struct ViewsRepository {
    views: RwLock<HashMap<ViewId, Arc<View>>>,
}

impl ViewsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, view: View) -> Result<Arc<View>> {
        let view = Arc::new(view);
        let mut views = self.views.write().unwrap_or_else(|e| e.into_inner());
        if views.contains_key(view.view_id()) {
            return Err(StateError::illegal_state(format!(
                "view {} is already registered",
                view.view_id()
            )));
        }
        views.insert(view.view_id().clone(), Arc::clone(&view));
        log::debug!("Registered view {}", view.view_id());
        Ok(view)
    }

    pub fn get(&self, view_id: &ViewId) -> Result<Arc<View>> {
        self.views
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(view_id)
            .cloned()
            .ok_or_else(|| StateError::not_found(format!("view {}", view_id)))
    }

    /// Close and forget a view
    pub fn close(&self, view_id: &ViewId) -> Result<()> {
        let view = self
            .views
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(view_id)
            .ok_or_else(|| StateError::not_found(format!("view {}", view_id)))?;
        view.close();
        Ok(())
    }

    /// Fan a record change notification out to every live view
    pub fn notify_records_changed(
        &self,
        records: &[TableRecordReference],
        collector: &mut ViewChangesCollector,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let views: Vec<Arc<View>> = self
            .views
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for view in views.iter().filter(|v| !v.is_closed()) {
            view.notify_records_changed(records, collector)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.views.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
