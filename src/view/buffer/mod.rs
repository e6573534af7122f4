//! View row buffers
//!
//! A view picks its buffer once, at creation, from the size of its initial
//! pinned-id set. It never switches afterwards.

mod fully_cached;
mod high_volume;

pub use fully_cached::FullyCachedRowsBuffer;
pub use high_volume::HighVolumeRowsBuffer;

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::row::ViewRow;
use super::source::{DocumentFilter, OrderBy, RecordSource, SqlWhereClause};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::types::{DocumentIdsSelection, RowId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BufferStrategy {
    FullyCached,
    HighVolume,
}

impl BufferStrategy {
    /// High volume when the pinned set is empty (unbounded) or at least
    /// `threshold` ids, fully cached otherwise
    pub fn select(pinned_ids_len: usize, threshold: usize) -> Self {
        if pinned_ids_len == 0 || pinned_ids_len >= threshold {
            BufferStrategy::HighVolume
        } else {
            BufferStrategy::FullyCached
        }
    }
}

pub enum RowsBuffer {
    FullyCached(FullyCachedRowsBuffer),
    HighVolume(HighVolumeRowsBuffer),
}

impl RowsBuffer {
    pub fn new(
        source: Arc<dyn RecordSource>,
        filters: Vec<DocumentFilter>,
        pinned_ids: BTreeSet<RowId>,
        config: &EngineConfig,
    ) -> Self {
        let strategy = BufferStrategy::select(pinned_ids.len(), config.high_volume_threshold);
        log::debug!(
            "Selected {:?} buffer over {} for {} pinned ids",
            strategy,
            source.table_name(),
            pinned_ids.len()
        );
        match strategy {
            BufferStrategy::FullyCached => {
                RowsBuffer::FullyCached(FullyCachedRowsBuffer::new(source, filters, pinned_ids))
            }
            BufferStrategy::HighVolume => RowsBuffer::HighVolume(HighVolumeRowsBuffer::new(
                source,
                filters,
                pinned_ids,
                config.high_volume_count,
                config.high_volume_row_cache,
            )),
        }
    }

    pub fn strategy(&self) -> BufferStrategy {
        match self {
            RowsBuffer::FullyCached(_) => BufferStrategy::FullyCached,
            RowsBuffer::HighVolume(_) => BufferStrategy::HighVolume,
        }
    }

    /// Number of rows, or -1 if unknown
    pub fn size(&self) -> i64 {
        match self {
            RowsBuffer::FullyCached(b) => b.size(),
            RowsBuffer::HighVolume(b) => b.size(),
        }
    }

    pub fn stream_page(
        &self,
        first_row: usize,
        page_length: usize,
        order_bys: &[OrderBy],
    ) -> Result<Vec<ViewRow>> {
        match self {
            RowsBuffer::FullyCached(b) => b.stream_page(first_row, page_length, order_bys),
            RowsBuffer::HighVolume(b) => b.stream_page(first_row, page_length, order_bys),
        }
    }

    pub fn get_by_id(&self, id: RowId) -> Result<ViewRow> {
        match self {
            RowsBuffer::FullyCached(b) => b.get_by_id(id),
            RowsBuffer::HighVolume(b) => b.get_by_id(id),
        }
    }

    pub fn stream_by_ids_excluding_included_rows(
        &self,
        selection: &DocumentIdsSelection,
    ) -> Result<Vec<ViewRow>> {
        match self {
            RowsBuffer::FullyCached(b) => b.stream_by_ids_excluding_included_rows(selection),
            RowsBuffer::HighVolume(b) => b.stream_by_ids_excluding_included_rows(selection),
        }
    }

    /// Every row followed by its included rows, depth first
    pub fn stream_all_recursive(&self) -> Result<Vec<ViewRow>> {
        match self {
            RowsBuffer::FullyCached(b) => b.stream_all_recursive(),
            RowsBuffer::HighVolume(b) => b.stream_all_recursive(),
        }
    }

    pub fn invalidate_all(&self) {
        match self {
            RowsBuffer::FullyCached(b) => b.invalidate_all(),
            RowsBuffer::HighVolume(b) => b.invalidate_all(),
        }
    }

    pub fn add_ids(&self, ids: &BTreeSet<RowId>) -> bool {
        match self {
            RowsBuffer::FullyCached(b) => b.add_ids(ids),
            RowsBuffer::HighVolume(b) => b.add_ids(ids),
        }
    }

    pub fn remove_ids(&self, ids: &BTreeSet<RowId>) -> bool {
        match self {
            RowsBuffer::FullyCached(b) => b.remove_ids(ids),
            RowsBuffer::HighVolume(b) => b.remove_ids(ids),
        }
    }

    pub fn contains_any_of(&self, ids: &BTreeSet<RowId>) -> bool {
        match self {
            RowsBuffer::FullyCached(b) => b.contains_any_of(ids),
            RowsBuffer::HighVolume(b) => b.contains_any_of(ids),
        }
    }

    pub fn sql_where_clause(&self, selection: &DocumentIdsSelection) -> SqlWhereClause {
        match self {
            RowsBuffer::FullyCached(b) => b.sql_where_clause(selection),
            RowsBuffer::HighVolume(b) => b.sql_where_clause(selection),
        }
    }

    /// Current pinned ids; `None` for an unbounded high-volume buffer
    pub fn pinned_ids(&self) -> Option<BTreeSet<RowId>> {
        match self {
            RowsBuffer::FullyCached(b) => b.pinned_ids(),
            RowsBuffer::HighVolume(b) => b.pinned_ids(),
        }
    }
}
