//! Record source contract
//!
//! The row buffers never talk to storage directly. They describe what they
//! need as a [`RecordQuery`] and hand it to a [`RecordSource`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::row::ViewRow;
use crate::error::Result;
use crate::types::{RowId, Value};

/// Filter id of the sticky filter that carries a view's pinned ids
pub const PINNED_IDS_FILTER_ID: &str = "pinnedIds";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterParameter {
    pub field_name: String,
    pub value: Value,
}

/// A named filter; a row matches when every parameter matches
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentFilter {
    filter_id: String,
    parameters: Vec<FilterParameter>,
}

impl DocumentFilter {
    pub fn new(filter_id: impl Into<String>) -> Self {
        Self {
            filter_id: filter_id.into(),
            parameters: Vec::new(),
        }
    }

    /// Equality filter on one field
    pub fn equals(field_name: impl Into<String>, value: impl Into<Value>) -> Self {
        let field_name = field_name.into();
        Self::new(field_name.clone()).parameter(field_name, value)
    }

    /// The sticky filter describing a pinned id set
    pub fn pinned_ids(ids: &BTreeSet<RowId>) -> Self {
        Self {
            filter_id: PINNED_IDS_FILTER_ID.to_string(),
            parameters: ids
                .iter()
                .map(|id| FilterParameter {
                    field_name: "ID".to_string(),
                    value: Value::int(id.0),
                })
                .collect(),
        }
    }

    pub fn parameter(mut self, field_name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(FilterParameter {
            field_name: field_name.into(),
            value: value.into(),
        });
        self
    }

    pub fn filter_id(&self) -> &str {
        &self.filter_id
    }

    pub fn parameters(&self) -> &[FilterParameter] {
        &self.parameters
    }

    pub fn is_pinned_ids(&self) -> bool {
        self.filter_id == PINNED_IDS_FILTER_ID
    }

    pub fn matches(&self, row: &ViewRow) -> bool {
        self.parameters.iter().all(|p| {
            row.value(&p.field_name)
                .map(|v| v.total_cmp(&p.value).is_eq())
                .unwrap_or_else(|| p.value.is_null())
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub field_name: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ascending: true,
        }
    }

    pub fn desc(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ascending: false,
        }
    }

    /// Stable in-memory sort of `rows` by `order_bys`, first key first
    pub fn sort(rows: &mut [&ViewRow], order_bys: &[OrderBy]) {
        if order_bys.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            order_bys
                .iter()
                .map(|o| {
                    let x = a.value(&o.field_name).unwrap_or(&Value::Null);
                    let y = b.value(&o.field_name).unwrap_or(&Value::Null);
                    let ord = x.total_cmp(y);
                    if o.ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

/// Opaque predicate fragment produced by the record source
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SqlWhereClause(String);

impl SqlWhereClause {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlWhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a buffer asks of the record source
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordQuery {
    pub filters: Vec<DocumentFilter>,
    /// Sticky allow-list; `None` means unrestricted
    pub pinned_ids: Option<BTreeSet<RowId>>,
    /// Point lookup; `None` means every row matching the rest of the query
    pub row_ids: Option<BTreeSet<RowId>>,
    pub order_bys: Vec<OrderBy>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new(filters: Vec<DocumentFilter>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    pub fn with_pinned_ids(mut self, pinned_ids: Option<BTreeSet<RowId>>) -> Self {
        self.pinned_ids = pinned_ids;
        self
    }

    pub fn with_row_ids(mut self, row_ids: BTreeSet<RowId>) -> Self {
        self.row_ids = Some(row_ids);
        self
    }

    pub fn with_order_bys(mut self, order_bys: Vec<OrderBy>) -> Self {
        self.order_bys = order_bys;
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// True if a row with `id` and these values passes the query's predicates
    /// (paging aside)
    pub fn accepts(&self, row: &ViewRow) -> bool {
        let id = row.id();
        self.pinned_ids.as_ref().map_or(true, |ids| ids.contains(&id))
            && self.row_ids.as_ref().map_or(true, |ids| ids.contains(&id))
            && self.filters.iter().all(|f| f.matches(row))
    }
}

/// Query capability over one table.
///
/// Implementations propagate their own failures as
/// [`StateError::RecordSource`](crate::error::StateError::RecordSource); the
/// buffers pass them through unchanged.
pub trait RecordSource: Send + Sync {
    fn table_name(&self) -> &str;

    /// Rows matching `query`, ordered and paged as requested
    fn retrieve_rows(&self, query: &RecordQuery) -> Result<Vec<ViewRow>>;

    /// Number of rows matching `query` (paging ignored), or `None` when no
    /// cheap count is available
    fn count(&self, query: &RecordQuery) -> Result<Option<u64>>;

    fn build_sql_where_clause(&self, query: &RecordQuery) -> SqlWhereClause;
}

/// Record source over rows held in memory
pub struct InMemoryRecordSource {
    table_name: String,
    rows: RwLock<Vec<ViewRow>>,
    countable: bool,
    queries: AtomicUsize,
}

impl InMemoryRecordSource {
    pub fn new(table_name: impl Into<String>, rows: Vec<ViewRow>) -> Self {
        Self {
            table_name: table_name.into(),
            rows: RwLock::new(rows),
            countable: true,
            queries: AtomicUsize::new(0),
        }
    }

    /// Report counts as unknown
    pub fn without_count(mut self) -> Self {
        self.countable = false;
        self
    }

    /// Insert or replace a row by id
    pub fn upsert_row(&self, row: ViewRow) {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        match rows.iter_mut().find(|r| r.id() == row.id()) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    pub fn remove_row(&self, id: RowId) -> bool {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        let before = rows.len();
        rows.retain(|r| r.id() != id);
        rows.len() != before
    }

    /// Number of `retrieve_rows` and `count` calls served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl RecordSource for InMemoryRecordSource {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn retrieve_rows(&self, query: &RecordQuery) -> Result<Vec<ViewRow>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());

        let mut matching: Vec<&ViewRow> = rows.iter().filter(|r| query.accepts(r)).collect();
        OrderBy::sort(&mut matching, &query.order_bys);

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self, query: &RecordQuery) -> Result<Option<u64>> {
        if !self.countable {
            return Ok(None);
        }
        self.queries.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        Ok(Some(rows.iter().filter(|r| query.accepts(r)).count() as u64))
    }

    fn build_sql_where_clause(&self, query: &RecordQuery) -> SqlWhereClause {
        let mut parts = Vec::new();
        let key_column = format!("{}.{}_ID", self.table_name, self.table_name);
        for ids in [&query.pinned_ids, &query.row_ids].into_iter().flatten() {
            if ids.is_empty() {
                parts.push("1=0".to_string());
                continue;
            }
            let list: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            parts.push(format!("{} IN ({})", key_column, list.join(", ")));
        }
        for filter in &query.filters {
            for p in filter.parameters() {
                parts.push(format!(
                    "{}.{} = '{}'",
                    self.table_name,
                    p.field_name,
                    p.value.as_comparable_text().replace('\'', "''")
                ));
            }
        }
        if parts.is_empty() {
            SqlWhereClause::new("1=1")
        } else {
            SqlWhereClause::new(parts.join(" AND "))
        }
    }
}
