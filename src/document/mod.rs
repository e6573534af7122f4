//! Editable documents and their change tracking
//!
//! Documents hold per-instance field state on top of a shared
//! [`DocumentDescriptor`](crate::descriptor::DocumentDescriptor). Every
//! mutation reports what it changed to a [`DocumentChangesCollector`] owned by
//! the current unit of work.

pub mod changes;
pub mod collection;
pub mod collector;
#[allow(clippy::module_inception)]
pub mod document;
pub mod field;
pub mod lookup;

pub use changes::{DocumentChanges, DocumentFieldChange, FieldChangeKind, Reason};
pub use collection::DocumentCollection;
pub use collector::DocumentChangesCollector;
pub use document::Document;
pub use field::DocumentField;
pub use lookup::{LookupDataSource, LookupValues};
