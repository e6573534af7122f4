//! Row buffer that queries the record source for every page
//!
//! Nothing is materialized beyond a small cache of recently seen rows, which
//! only ever serves `get_by_id`.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::CountPolicy;
use crate::error::{Result, StateError};
use crate::types::{DocumentIdsSelection, RowId};
use crate::view::row::ViewRow;
use crate::view::source::{DocumentFilter, OrderBy, RecordQuery, RecordSource, SqlWhereClause};

/// Bounded cache of recently seen rows; oldest entries are evicted first
#[derive(Debug)]
struct RecentRows {
    capacity: usize,
    order: VecDeque<RowId>,
    rows: HashMap<RowId, ViewRow>,
}

impl RecentRows {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            rows: HashMap::new(),
        }
    }

    fn get(&self, id: RowId) -> Option<&ViewRow> {
        self.rows.get(&id)
    }

    fn put(&mut self, row: &ViewRow) {
        if self.capacity == 0 {
            return;
        }
        if self.rows.insert(row.id(), row.clone()).is_none() {
            self.order.push_back(row.id());
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.rows.remove(&evicted);
            }
        }
    }

    fn remove(&mut self, id: RowId) {
        if self.rows.remove(&id).is_some() {
            self.order.retain(|cached| *cached != id);
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.rows.clear();
    }
}

pub struct HighVolumeRowsBuffer {
    source: Arc<dyn RecordSource>,
    filters: Vec<DocumentFilter>,
    /// `None` for an unbounded buffer (all rows matching the filters)
    pinned_ids: RwLock<Option<BTreeSet<RowId>>>,
    count_policy: CountPolicy,
    recent: Mutex<RecentRows>,
}

impl HighVolumeRowsBuffer {
    /// An empty `pinned_ids` set makes the buffer unbounded
    pub fn new(
        source: Arc<dyn RecordSource>,
        filters: Vec<DocumentFilter>,
        pinned_ids: BTreeSet<RowId>,
        count_policy: CountPolicy,
        row_cache_capacity: usize,
    ) -> Self {
        let pinned_ids = if pinned_ids.is_empty() {
            None
        } else {
            Some(pinned_ids)
        };
        Self {
            source,
            filters,
            pinned_ids: RwLock::new(pinned_ids),
            count_policy,
            recent: Mutex::new(RecentRows::new(row_cache_capacity)),
        }
    }

    fn base_query(&self) -> RecordQuery {
        let pinned_ids = self
            .pinned_ids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        RecordQuery::new(self.filters.clone()).with_pinned_ids(pinned_ids)
    }

    fn remember(&self, rows: &[ViewRow]) {
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        for row in rows {
            recent.put(row);
        }
    }

    /// Row count from the record source, or -1 when unknown. Never fails.
    pub fn size(&self) -> i64 {
        if self.count_policy == CountPolicy::Unknown {
            return -1;
        }
        match self.source.count(&self.base_query()) {
            Ok(Some(count)) => i64::try_from(count).unwrap_or(i64::MAX),
            Ok(None) => -1,
            Err(e) => {
                log::warn!("Count on {} failed: {}", self.source.table_name(), e);
                -1
            }
        }
    }

    pub fn stream_page(
        &self,
        first_row: usize,
        page_length: usize,
        order_bys: &[OrderBy],
    ) -> Result<Vec<ViewRow>> {
        let query = self
            .base_query()
            .with_order_bys(order_bys.to_vec())
            .with_page(first_row, page_length);
        let rows = self.source.retrieve_rows(&query)?;
        log::trace!(
            "Fetched page {}+{} ({} rows) from {}",
            first_row,
            page_length,
            rows.len(),
            self.source.table_name()
        );
        self.remember(&rows);
        Ok(rows)
    }

    pub fn get_by_id(&self, id: RowId) -> Result<ViewRow> {
        if let Some(row) = self
            .recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
        {
            return Ok(row.clone());
        }

        let query = self.base_query().with_row_ids(BTreeSet::from([id]));
        let row = self
            .source
            .retrieve_rows(&query)?
            .into_iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| StateError::not_found(format!("row {}", id)))?;
        self.remember(std::slice::from_ref(&row));
        Ok(row)
    }

    pub fn stream_by_ids_excluding_included_rows(
        &self,
        selection: &DocumentIdsSelection,
    ) -> Result<Vec<ViewRow>> {
        let ids = match selection {
            DocumentIdsSelection::All => {
                return Err(StateError::validation(
                    "streaming all rows by id is not supported by a high-volume view",
                ))
            }
            DocumentIdsSelection::Ids(ids) => ids,
        };
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .source
            .retrieve_rows(&self.base_query().with_row_ids(ids.clone()))?;
        self.remember(&rows);
        Ok(rows)
    }

    pub fn stream_all_recursive(&self) -> Result<Vec<ViewRow>> {
        let rows = self.source.retrieve_rows(&self.base_query())?;
        Ok(rows
            .iter()
            .flat_map(ViewRow::stream_recursive)
            .cloned()
            .collect())
    }

    pub fn invalidate_all(&self) {
        log::debug!(
            "Invalidating high-volume buffer over {}",
            self.source.table_name()
        );
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Extend the pinned ids; always false for an unbounded buffer
    pub fn add_ids(&self, ids: &BTreeSet<RowId>) -> bool {
        let mut pinned = self.pinned_ids.write().unwrap_or_else(|e| e.into_inner());
        match pinned.as_mut() {
            Some(pinned) => {
                let before = pinned.len();
                pinned.extend(ids.iter().copied());
                pinned.len() != before
            }
            None => false,
        }
    }

    /// Shrink the pinned ids; always false for an unbounded buffer
    pub fn remove_ids(&self, ids: &BTreeSet<RowId>) -> bool {
        let changed = {
            let mut pinned = self.pinned_ids.write().unwrap_or_else(|e| e.into_inner());
            match pinned.as_mut() {
                Some(pinned) => {
                    let before = pinned.len();
                    pinned.retain(|id| !ids.contains(id));
                    pinned.len() != before
                }
                None => false,
            }
        };
        if changed {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            for id in ids {
                recent.remove(*id);
            }
        }
        changed
    }

    /// Always a point query against the record source. A failing query is
    /// reported as a hit so callers refresh rather than miss a change.
    pub fn contains_any_of(&self, ids: &BTreeSet<RowId>) -> bool {
        if ids.is_empty() {
            return false;
        }
        let query = self.base_query().with_row_ids(ids.clone()).with_page(0, 1);
        match self.source.retrieve_rows(&query) {
            Ok(rows) => !rows.is_empty(),
            Err(e) => {
                log::warn!(
                    "Point query on {} failed, assuming rows are present: {}",
                    self.source.table_name(),
                    e
                );
                true
            }
        }
    }

    pub fn sql_where_clause(&self, selection: &DocumentIdsSelection) -> SqlWhereClause {
        let mut query = self.base_query();
        if let DocumentIdsSelection::Ids(ids) = selection {
            query = query.with_row_ids(ids.clone());
        }
        self.source.build_sql_where_clause(&query)
    }

    /// `None` for an unbounded buffer. A bounded buffer stays bounded after
    /// its last pinned id is removed.
    pub fn pinned_ids(&self) -> Option<BTreeSet<RowId>> {
        self.pinned_ids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
