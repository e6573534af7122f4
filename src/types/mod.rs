//! Shared value and identifier types

mod ids;
mod value;

pub use ids::{
    DetailId, DocumentId, DocumentIdsSelection, DocumentPath, RowId, TableRecordReference,
    ViewId, WindowId,
};
pub use value::{Value, ValueClass};
