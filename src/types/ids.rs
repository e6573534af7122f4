//! Identifiers for documents, rows and views
//!
//! All identifiers are immutable value types: they are hashable, ordered and
//! cheap to clone so they can be used as keys for change collectors and buffers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Identifies a document schema (a "window")
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowId(String);

impl WindowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies an included detail (tab) within a document schema
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DetailId(String);

impl DetailId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DetailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a document or an included row
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocumentId {
    /// Not yet saved; there is exactly one "new" slot per parent
    New,
    Int(i64),
    Str(String),
}

impl DocumentId {
    pub fn is_new(&self) -> bool {
        matches!(self, DocumentId::New)
    }

    /// Parse the wire form: `"NEW"`, an integer, or any other string
    pub fn from_json(s: &str) -> Self {
        if s.eq_ignore_ascii_case("NEW") {
            return DocumentId::New;
        }
        match s.parse::<i64>() {
            Ok(n) => DocumentId::Int(n),
            Err(_) => DocumentId::Str(s.to_string()),
        }
    }
}

impl From<i64> for DocumentId {
    fn from(n: i64) -> Self {
        DocumentId::Int(n)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::New => f.write_str("NEW"),
            DocumentId::Int(n) => write!(f, "{}", n),
            DocumentId::Str(s) => f.write_str(s),
        }
    }
}

/// Full address of a document or of an included row inside it
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentPath {
    window_id: WindowId,
    document_id: DocumentId,
    detail_id: Option<DetailId>,
    row_id: Option<DocumentId>,
}

impl DocumentPath {
    /// Path of a root document
    pub fn root(window_id: WindowId, document_id: DocumentId) -> Self {
        Self {
            window_id,
            document_id,
            detail_id: None,
            row_id: None,
        }
    }

    /// Path of an included row below this root document
    pub fn with_row(&self, detail_id: DetailId, row_id: DocumentId) -> Self {
        Self {
            window_id: self.window_id.clone(),
            document_id: self.document_id.clone(),
            detail_id: Some(detail_id),
            row_id: Some(row_id),
        }
    }

    /// The root document's path (drops detail and row)
    pub fn root_path(&self) -> Self {
        Self::root(self.window_id.clone(), self.document_id.clone())
    }

    pub fn window_id(&self) -> &WindowId {
        &self.window_id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn detail_id(&self) -> Option<&DetailId> {
        self.detail_id.as_ref()
    }

    pub fn row_id(&self) -> Option<&DocumentId> {
        self.row_id.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.detail_id.is_none()
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.window_id, self.document_id)?;
        if let (Some(detail), Some(row)) = (&self.detail_id, &self.row_id) {
            write!(f, "/{}/{}", detail, row)?;
        }
        Ok(())
    }
}

/// Identifies a view row (the backing record id)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RowId(pub i64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a record in some table, as delivered by change notifications
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRecordReference {
    pub table_name: String,
    pub record_id: i64,
}

impl TableRecordReference {
    pub fn new(table_name: impl Into<String>, record_id: i64) -> Self {
        Self {
            table_name: table_name.into(),
            record_id,
        }
    }
}

/// Identifies a live view instance
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewId {
    window_id: WindowId,
    view_id: String,
}

impl ViewId {
    /// Allocate a fresh random view id for `window_id`
    pub fn random(window_id: WindowId) -> Self {
        Self {
            window_id,
            view_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn of(window_id: WindowId, view_id: impl Into<String>) -> Self {
        Self {
            window_id,
            view_id: view_id.into(),
        }
    }

    pub fn window_id(&self) -> &WindowId {
        &self.window_id
    }

    pub fn view_id(&self) -> &str {
        &self.view_id
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.window_id, self.view_id)
    }
}

/// A selection of rows: either everything or an explicit id set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentIdsSelection {
    All,
    Ids(BTreeSet<RowId>),
}

impl DocumentIdsSelection {
    pub fn of<I: IntoIterator<Item = RowId>>(ids: I) -> Self {
        DocumentIdsSelection::Ids(ids.into_iter().collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, DocumentIdsSelection::All)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DocumentIdsSelection::All => false,
            DocumentIdsSelection::Ids(ids) => ids.is_empty(),
        }
    }

    pub fn contains(&self, id: RowId) -> bool {
        match self {
            DocumentIdsSelection::All => true,
            DocumentIdsSelection::Ids(ids) => ids.contains(&id),
        }
    }
}
