//! Views over record sources
//!
//! Rows come from a [`RecordSource`] through a [`RowsBuffer`] that either
//! caches every candidate row or queries page by page.

pub mod attributes;
pub mod buffer;
pub mod changes;
pub mod repository;
pub mod row;
pub mod source;
#[allow(clippy::module_inception)]
pub mod view;

pub use attributes::{RowAttributes, RowAttributesLoader, RowAttributesProvider};
pub use buffer::{BufferStrategy, FullyCachedRowsBuffer, HighVolumeRowsBuffer, RowsBuffer};
pub use changes::{ViewChanges, ViewChangesCollector};
pub use repository::ViewsRepository;
pub use row::{ViewRow, ViewRowBuilder};
pub use source::{
    DocumentFilter, FilterParameter, InMemoryRecordSource, OrderBy, RecordQuery, RecordSource,
    SqlWhereClause, PINNED_IDS_FILTER_ID,
};
pub use view::{View, ViewBuilder, ViewResult};
