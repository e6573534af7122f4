//! Views
//!
//! A `View` is a filtered, ordered, pageable row collection over one table.
//! Its row buffer is chosen once at build time. Invalidation is coarse: a view
//! reports itself fully changed instead of computing row diffs.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::attributes::{RowAttributes, RowAttributesLoader, RowAttributesProvider};
use super::buffer::{BufferStrategy, RowsBuffer};
use super::changes::ViewChangesCollector;
use super::row::ViewRow;
use super::source::{DocumentFilter, OrderBy, RecordSource, SqlWhereClause};
use crate::config::EngineConfig;
use crate::error::{Result, StateError};
use crate::types::{DocumentIdsSelection, DocumentPath, RowId, TableRecordReference, ViewId, WindowId};

/// One page of a view, with enough context for a client to render it
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViewResult {
    pub view_id: ViewId,
    pub parent_view_id: Option<ViewId>,
    /// -1 if unknown
    pub size: i64,
    pub first_row: usize,
    pub page_length: usize,
    pub order_bys: Vec<OrderBy>,
    pub filters: Vec<DocumentFilter>,
    pub sticky_filters: Vec<DocumentFilter>,
    pub rows: Vec<ViewRow>,
}

pub struct View {
    view_id: ViewId,
    parent_view_id: Option<ViewId>,
    table_name: String,
    referencing_document_paths: Vec<DocumentPath>,
    filters: Vec<DocumentFilter>,
    sticky_filters: Vec<DocumentFilter>,
    buffer: RowsBuffer,
    attributes: RowAttributesProvider,
    default_page_length: usize,
    closed: AtomicBool,
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("view_id", &self.view_id)
            .field("parent_view_id", &self.parent_view_id)
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}

impl View {
    pub fn builder(window_id: WindowId, source: Arc<dyn RecordSource>) -> ViewBuilder {
        ViewBuilder {
            window_id,
            source,
            view_id: None,
            parent_view_id: None,
            referencing_document_paths: Vec::new(),
            sticky_filters: Vec::new(),
            filters: Vec::new(),
            pinned_ids: BTreeSet::new(),
            attributes_loader: None,
            config: EngineConfig::default(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StateError::illegal_state(format!(
                "view {} is closed",
                self.view_id
            )))
        } else {
            Ok(())
        }
    }

    pub fn view_id(&self) -> &ViewId {
        &self.view_id
    }

    pub fn parent_view_id(&self) -> Option<&ViewId> {
        self.parent_view_id.as_ref()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn referencing_document_paths(&self) -> &[DocumentPath] {
        &self.referencing_document_paths
    }

    pub fn strategy(&self) -> BufferStrategy {
        self.buffer.strategy()
    }

    pub fn filters(&self) -> &[DocumentFilter] {
        &self.filters
    }

    /// Sticky filters as given at build time, plus the pinned-ids filter
    /// derived from the buffer's current pinned ids
    pub fn sticky_filters(&self) -> Vec<DocumentFilter> {
        let mut sticky = self.sticky_filters.clone();
        if let Some(pinned) = self.buffer.pinned_ids() {
            sticky.push(DocumentFilter::pinned_ids(&pinned));
        }
        sticky
    }

    pub fn size(&self) -> Result<i64> {
        self.ensure_open()?;
        Ok(self.buffer.size())
    }

    /// A page of rows; a zero `page_length` means the configured default
    pub fn get_page(
        &self,
        first_row: usize,
        page_length: usize,
        order_bys: &[OrderBy],
    ) -> Result<ViewResult> {
        self.ensure_open()?;
        let page_length = if page_length == 0 {
            self.default_page_length
        } else {
            page_length
        };
        let rows = self.buffer.stream_page(first_row, page_length, order_bys)?;
        Ok(ViewResult {
            view_id: self.view_id.clone(),
            parent_view_id: self.parent_view_id.clone(),
            size: self.buffer.size(),
            first_row,
            page_length,
            order_bys: order_bys.to_vec(),
            filters: self.filters.clone(),
            sticky_filters: self.sticky_filters(),
            rows,
        })
    }

    pub fn get_by_id(&self, row_id: RowId) -> Result<ViewRow> {
        self.ensure_open()?;
        self.buffer.get_by_id(row_id)
    }

    pub fn stream_by_ids(&self, selection: &DocumentIdsSelection) -> Result<Vec<ViewRow>> {
        self.ensure_open()?;
        self.buffer.stream_by_ids_excluding_included_rows(selection)
    }

    pub fn stream_all_recursive(&self) -> Result<Vec<ViewRow>> {
        self.ensure_open()?;
        self.buffer.stream_all_recursive()
    }

    pub fn sql_where_clause(&self, selection: &DocumentIdsSelection) -> Result<SqlWhereClause> {
        self.ensure_open()?;
        Ok(self.buffer.sql_where_clause(selection))
    }

    pub fn has_attributes(&self) -> bool {
        self.attributes.has_attributes()
    }

    pub fn row_attributes(&self, row_id: RowId) -> Result<Arc<RowAttributes>> {
        self.ensure_open()?;
        let row = self.buffer.get_by_id(row_id)?;
        self.attributes.get(&row)
    }

    /// Drop every cache and report the whole view as changed
    pub fn invalidate_all(&self, collector: &mut ViewChangesCollector) -> Result<()> {
        self.ensure_open()?;
        self.attributes.invalidate_all();
        self.buffer.invalidate_all();
        collector.collect_fully_changed(&self.view_id);
        log::debug!("View {} fully invalidated", self.view_id);
        Ok(())
    }

    /// Drop every cache but report only the given rows as changed
    pub fn invalidate_rows(
        &self,
        row_ids: &BTreeSet<RowId>,
        collector: &mut ViewChangesCollector,
    ) -> Result<()> {
        self.ensure_open()?;
        if row_ids.is_empty() {
            return Ok(());
        }
        self.attributes.invalidate_all();
        self.buffer.invalidate_all();
        collector.collect_changed_row_ids(&self.view_id, row_ids.iter().copied());
        Ok(())
    }

    /// Invalidate only if one of the referenced records of this view's table
    /// is currently part of the view
    pub fn notify_records_changed(
        &self,
        records: &[TableRecordReference],
        collector: &mut ViewChangesCollector,
    ) -> Result<()> {
        self.ensure_open()?;
        let ids: BTreeSet<RowId> = records
            .iter()
            .filter(|r| r.table_name == self.table_name)
            .map(|r| RowId(r.record_id))
            .collect();
        if ids.is_empty() || !self.buffer.contains_any_of(&ids) {
            return Ok(());
        }
        self.invalidate_all(collector)
    }

    /// Returns true if the pinned ids changed (and the view was invalidated)
    pub fn add_ids_and_invalidate(
        &self,
        row_ids: &BTreeSet<RowId>,
        collector: &mut ViewChangesCollector,
    ) -> Result<bool> {
        self.ensure_open()?;
        let changed = self.buffer.add_ids(row_ids);
        if changed {
            self.invalidate_all(collector)?;
        }
        Ok(changed)
    }

    /// Returns true if the pinned ids changed (and the view was invalidated)
    pub fn remove_ids_and_invalidate(
        &self,
        row_ids: &BTreeSet<RowId>,
        collector: &mut ViewChangesCollector,
    ) -> Result<bool> {
        self.ensure_open()?;
        let changed = self.buffer.remove_ids(row_ids);
        if changed {
            self.invalidate_all(collector)?;
        }
        Ok(changed)
    }

    /// Release caches without reporting a change. Later calls fail.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.attributes.invalidate_all();
            self.buffer.invalidate_all();
            log::debug!("View {} closed", self.view_id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct ViewBuilder {
    window_id: WindowId,
    source: Arc<dyn RecordSource>,
    view_id: Option<ViewId>,
    parent_view_id: Option<ViewId>,
    referencing_document_paths: Vec<DocumentPath>,
    sticky_filters: Vec<DocumentFilter>,
    filters: Vec<DocumentFilter>,
    pinned_ids: BTreeSet<RowId>,
    attributes_loader: Option<Arc<dyn RowAttributesLoader>>,
    config: EngineConfig,
}

impl ViewBuilder {
    /// Use a fixed view id instead of a random one
    pub fn view_id(mut self, view_id: ViewId) -> Self {
        self.view_id = Some(view_id);
        self
    }

    pub fn parent_view_id(mut self, parent_view_id: ViewId) -> Self {
        self.parent_view_id = Some(parent_view_id);
        self
    }

    pub fn referencing_document_path(mut self, path: DocumentPath) -> Self {
        self.referencing_document_paths.push(path);
        self
    }

    pub fn sticky_filter(mut self, filter: DocumentFilter) -> Self {
        self.sticky_filters.push(filter);
        self
    }

    pub fn filter(mut self, filter: DocumentFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn pinned_ids<I: IntoIterator<Item = RowId>>(mut self, ids: I) -> Self {
        self.pinned_ids.extend(ids);
        self
    }

    pub fn attributes_loader(mut self, loader: Arc<dyn RowAttributesLoader>) -> Self {
        self.attributes_loader = Some(loader);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<View> {
        if let Some(view_id) = &self.view_id {
            if view_id.window_id() != &self.window_id {
                return Err(StateError::validation(format!(
                    "view id {} does not belong to window {}",
                    view_id, self.window_id
                )));
            }
        }
        if self.sticky_filters.iter().any(DocumentFilter::is_pinned_ids) {
            return Err(StateError::validation(
                "pinned ids must be given as pinned ids, not as a sticky filter",
            ));
        }

        let view_id = self
            .view_id
            .unwrap_or_else(|| ViewId::random(self.window_id.clone()));
        let table_name = self.source.table_name().to_string();

        let mut query_filters = self.sticky_filters.clone();
        query_filters.extend(self.filters.iter().cloned());
        let buffer = RowsBuffer::new(self.source, query_filters, self.pinned_ids, &self.config);
        let attributes = RowAttributesProvider::new(
            self.attributes_loader,
            buffer.strategy() == BufferStrategy::HighVolume,
        );

        log::debug!(
            "Created view {} over {} ({:?})",
            view_id,
            table_name,
            buffer.strategy()
        );
        Ok(View {
            view_id,
            parent_view_id: self.parent_view_id,
            table_name,
            referencing_document_paths: self.referencing_document_paths,
            filters: self.filters,
            sticky_filters: self.sticky_filters,
            buffer,
            attributes,
            default_page_length: self.config.default_page_length,
            closed: AtomicBool::new(false),
        })
    }
}
