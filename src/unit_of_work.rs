//! Unit of work
//!
//! One logical operation (one edit commit, one page fetch) owns one
//! `UnitOfWork`. It carries the document and view change collectors through
//! the call chain and flushes them once at the end. Nothing is global: two
//! concurrent operations never see each other's pending changes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::document::{DocumentChanges, DocumentChangesCollector};
use crate::error::{Result, StateError};
use crate::view::{ViewChanges, ViewChangesCollector};

/// Everything one unit of work changed, ready for the transport layer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlushedChanges {
    pub unit_of_work: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In first-insertion order of document paths
    pub documents: Vec<DocumentChanges>,
    /// In first-insertion order of view ids
    pub views: Vec<ViewChanges>,
}

impl FlushedChanges {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.views.is_empty()
    }
}

pub struct UnitOfWork {
    id: Uuid,
    parent_id: Option<Uuid>,
    name: String,
    started_at: DateTime<Utc>,
    documents: DocumentChangesCollector,
    views: ViewChangesCollector,
    finished: bool,
}

impl UnitOfWork {
    pub fn begin(name: impl Into<String>) -> Self {
        let name = name.into();
        log::trace!("Begin unit of work {}", name);
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            name,
            started_at: Utc::now(),
            documents: DocumentChangesCollector::new(),
            views: ViewChangesCollector::new(),
            finished: false,
        }
    }

    /// A child unit whose changes are merged back with [`merge_child`](Self::merge_child)
    pub fn nested(&self, name: impl Into<String>) -> Self {
        let mut child = Self::begin(format!("{}/{}", self.name, name.into()));
        child.parent_id = Some(self.id);
        child
    }

    pub fn merge_child(&mut self, mut child: UnitOfWork) -> Result<()> {
        if child.parent_id != Some(self.id) {
            return Err(StateError::illegal_state(format!(
                "unit of work {} is not a child of {}",
                child.name, self.name
            )));
        }
        self.documents.collect_from(&child.documents);
        self.views.collect_from(&child.views);
        child.finished = true;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn document_changes(&mut self) -> &mut DocumentChangesCollector {
        &mut self.documents
    }

    pub fn view_changes(&mut self) -> &mut ViewChangesCollector {
        &mut self.views
    }

    /// Both collectors at once, for operations that touch documents and views
    pub fn collectors(&mut self) -> (&mut DocumentChangesCollector, &mut ViewChangesCollector) {
        (&mut self.documents, &mut self.views)
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.views.is_empty()
    }

    pub fn finish(mut self) -> FlushedChanges {
        self.finished = true;
        let documents = std::mem::take(&mut self.documents).into_changes();
        let views = std::mem::take(&mut self.views).into_changes();
        log::debug!(
            "Unit of work {} finished: {} documents, {} views changed",
            self.name,
            documents.len(),
            views.len()
        );
        FlushedChanges {
            unit_of_work: self.name.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            documents,
            views,
        }
    }

    /// Drop all pending changes
    pub fn discard(mut self) {
        self.finished = true;
        if !self.is_empty() {
            log::debug!("Discarding pending changes of unit of work {}", self.name);
        }
    }

    /// Run `op` in a fresh unit of work. On success the flushed changes are
    /// returned with the result; on failure they are discarded.
    pub fn run<T, F>(name: impl Into<String>, op: F) -> Result<(T, FlushedChanges)>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T>,
    {
        let mut uow = UnitOfWork::begin(name);
        match op(&mut uow) {
            Ok(value) => Ok((value, uow.finish())),
            Err(e) => {
                log::debug!("Unit of work {} failed: {}", uow.name, e);
                uow.discard();
                Err(e)
            }
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.finished && !self.is_empty() {
            log::warn!(
                "Unit of work {} dropped with unflushed changes",
                self.name
            );
        }
    }
}
