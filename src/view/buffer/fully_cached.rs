//! Row buffer that loads every candidate row once and pages in memory

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::error::{Result, StateError};
use crate::types::{DocumentIdsSelection, RowId};
use crate::view::row::ViewRow;
use crate::view::source::{DocumentFilter, OrderBy, RecordQuery, RecordSource, SqlWhereClause};

/// Immutable snapshot of the loaded rows. Replaced wholesale, never patched.
#[derive(Debug)]
struct CachedRows {
    rows: Vec<ViewRow>,
    index: HashMap<RowId, usize>,
}

impl CachedRows {
    fn new(rows: Vec<ViewRow>) -> Self {
        let index = rows.iter().enumerate().map(|(i, r)| (r.id(), i)).collect();
        Self { rows, index }
    }

    fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// Loaded snapshot plus the invalidation count it was loaded under
#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    /// `None` until first access and after every invalidation
    rows: Option<Arc<CachedRows>>,
}

pub struct FullyCachedRowsBuffer {
    source: Arc<dyn RecordSource>,
    filters: Vec<DocumentFilter>,
    row_ids: RwLock<BTreeSet<RowId>>,
    cache: RwLock<CacheState>,
}

impl FullyCachedRowsBuffer {
    pub fn new(
        source: Arc<dyn RecordSource>,
        filters: Vec<DocumentFilter>,
        row_ids: BTreeSet<RowId>,
    ) -> Self {
        Self {
            source,
            filters,
            row_ids: RwLock::new(row_ids),
            cache: RwLock::new(CacheState::default()),
        }
    }

    fn candidate_ids(&self) -> BTreeSet<RowId> {
        self.row_ids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The loaded rows, loading them on a miss. A load that raced an
    /// invalidation is returned to its caller but never installed.
    fn snapshot(&self) -> Result<Arc<CachedRows>> {
        let generation = {
            let state = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = state.rows.as_ref() {
                return Ok(Arc::clone(cached));
            }
            state.generation
        };

        let row_ids = self.candidate_ids();
        let loaded = if row_ids.is_empty() {
            CachedRows::empty()
        } else {
            let query = RecordQuery::new(self.filters.clone()).with_pinned_ids(Some(row_ids));
            CachedRows::new(self.source.retrieve_rows(&query)?)
        };
        log::debug!(
            "Loaded {} rows from {} into fully cached buffer",
            loaded.rows.len(),
            self.source.table_name()
        );

        let loaded = Arc::new(loaded);
        let mut state = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if state.generation == generation {
            state.rows = Some(Arc::clone(&loaded));
        } else {
            log::trace!(
                "Discarding rows from {} loaded before an invalidation",
                self.source.table_name()
            );
        }
        Ok(loaded)
    }

    fn mark_dirty(&self) {
        let mut state = self.cache.write().unwrap_or_else(|e| e.into_inner());
        state.generation = state.generation.wrapping_add(1);
        state.rows = None;
    }

    pub fn size(&self) -> i64 {
        match self.snapshot() {
            Ok(cached) => cached.rows.len() as i64,
            Err(e) => {
                log::warn!(
                    "Failed loading rows from {} for size: {}",
                    self.source.table_name(),
                    e
                );
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
        let cached = self.snapshot()?;
        let mut rows: Vec<&ViewRow> = cached.rows.iter().collect();
        OrderBy::sort(&mut rows, order_bys);
        Ok(rows
            .into_iter()
            .skip(first_row)
            .take(page_length)
            .cloned()
            .collect())
    }

    pub fn get_by_id(&self, id: RowId) -> Result<ViewRow> {
        let cached = self.snapshot()?;
        cached
            .index
            .get(&id)
            .map(|&i| cached.rows[i].clone())
            .ok_or_else(|| StateError::not_found(format!("row {}", id)))
    }

    pub fn stream_by_ids_excluding_included_rows(
        &self,
        selection: &DocumentIdsSelection,
    ) -> Result<Vec<ViewRow>> {
        let cached = self.snapshot()?;
        Ok(match selection {
            DocumentIdsSelection::All => cached.rows.clone(),
            DocumentIdsSelection::Ids(ids) => ids
                .iter()
                .filter_map(|id| cached.index.get(id).map(|&i| cached.rows[i].clone()))
                .collect(),
        })
    }

    pub fn stream_all_recursive(&self) -> Result<Vec<ViewRow>> {
        let cached = self.snapshot()?;
        Ok(cached
            .rows
            .iter()
            .flat_map(ViewRow::stream_recursive)
            .cloned()
            .collect())
    }

    pub fn invalidate_all(&self) {
        log::debug!(
            "Invalidating fully cached buffer over {}",
            self.source.table_name()
        );
        self.mark_dirty();
    }

    pub fn add_ids(&self, ids: &BTreeSet<RowId>) -> bool {
        let changed = {
            let mut row_ids = self.row_ids.write().unwrap_or_else(|e| e.into_inner());
            let before = row_ids.len();
            row_ids.extend(ids.iter().copied());
            row_ids.len() != before
        };
        if changed {
            self.mark_dirty();
        }
        changed
    }

    pub fn remove_ids(&self, ids: &BTreeSet<RowId>) -> bool {
        let changed = {
            let mut row_ids = self.row_ids.write().unwrap_or_else(|e| e.into_inner());
            let before = row_ids.len();
            row_ids.retain(|id| !ids.contains(id));
            row_ids.len() != before
        };
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// Answered from the candidate ids and, when loaded, the cached rows
    /// (which also covers included rows). Never queries.
    pub fn contains_any_of(&self, ids: &BTreeSet<RowId>) -> bool {
        if ids.is_empty() {
            return false;
        }
        if self
            .row_ids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|id| ids.contains(id))
        {
            return true;
        }
        let state = self.cache.read().unwrap_or_else(|e| e.into_inner());
        state.rows.as_ref().map_or(false, |cached| {
            cached
                .rows
                .iter()
                .any(|row| ids.iter().any(|id| row.contains_recursive(*id)))
        })
    }

    pub fn sql_where_clause(&self, selection: &DocumentIdsSelection) -> SqlWhereClause {
        let mut query =
            RecordQuery::new(self.filters.clone()).with_pinned_ids(Some(self.candidate_ids()));
        if let DocumentIdsSelection::Ids(ids) = selection {
            query = query.with_row_ids(ids.clone());
        }
        self.source.build_sql_where_clause(&query)
    }

    /// Always bounded, even once every id has been removed
    pub fn pinned_ids(&self) -> Option<BTreeSet<RowId>> {
        Some(self.candidate_ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindowId;
    use crate::view::source::InMemoryRecordSource;
    use std::sync::{mpsc, Mutex};
    use std::thread;

    /// Record source whose first row query blocks until released
    struct GatedSource {
        inner: InMemoryRecordSource,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl GatedSource {
        fn new(inner: InMemoryRecordSource) -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let source = Arc::new(Self {
                inner,
                entered: Mutex::new(Some(entered_tx)),
                release: Mutex::new(Some(release_rx)),
            });
            (source, entered_rx, release_tx)
        }
    }

    impl RecordSource for GatedSource {
        fn table_name(&self) -> &str {
            self.inner.table_name()
        }

        fn retrieve_rows(&self, query: &RecordQuery) -> Result<Vec<ViewRow>> {
            let rows = self.inner.retrieve_rows(query);
            let entered = self.entered.lock().unwrap().take();
            if let Some(entered) = entered {
                entered.send(()).unwrap();
                let release = self.release.lock().unwrap().take();
                if let Some(release) = release {
                    release.recv().unwrap();
                }
            }
            rows
        }

        fn count(&self, query: &RecordQuery) -> Result<Option<u64>> {
            self.inner.count(query)
        }

        fn build_sql_where_clause(&self, query: &RecordQuery) -> SqlWhereClause {
            self.inner.build_sql_where_clause(query)
        }
    }

    fn source(n: i64) -> Arc<InMemoryRecordSource> {
        let rows = (1..=n)
            .map(|id| {
                ViewRow::builder(WindowId::new("540"), RowId(id))
                    .value("Value", 100 - id)
                    .build()
            })
            .collect();
        Arc::new(InMemoryRecordSource::new("M_Product", rows))
    }

    fn ids(list: &[i64]) -> BTreeSet<RowId> {
        list.iter().map(|&id| RowId(id)).collect()
    }

    fn row_ids(rows: &[ViewRow]) -> Vec<i64> {
        rows.iter().map(|r| r.id().0).collect()
    }

    #[test]
    fn test_loads_once_and_pages_in_memory() {
        let source = source(10);
        let buffer = FullyCachedRowsBuffer::new(source.clone(), vec![], ids(&[1, 2, 3, 4]));

        assert_eq!(buffer.size(), 4);
        assert_eq!(row_ids(&buffer.stream_page(0, 2, &[]).unwrap()), vec![1, 2]);
        assert_eq!(
            row_ids(&buffer.stream_page(1, 2, &[OrderBy::asc("Value")]).unwrap()),
            vec![3, 2]
        );
        assert_eq!(buffer.get_by_id(RowId(3)).unwrap().id(), RowId(3));
        assert!(buffer.get_by_id(RowId(9)).unwrap_err().is_not_found());
        assert_eq!(source.query_count(), 1);

        buffer.invalidate_all();
        buffer.size();
        assert_eq!(source.query_count(), 2);
    }

    #[test]
    fn test_add_ids_dirties_cache() {
        let source = source(10);
        let buffer = FullyCachedRowsBuffer::new(source.clone(), vec![], ids(&[1, 2]));
        assert_eq!(buffer.size(), 2);

        assert!(buffer.add_ids(&ids(&[7])));
        assert!(!buffer.add_ids(&ids(&[7])));
        assert_eq!(row_ids(&buffer.stream_page(0, 10, &[]).unwrap()), vec![1, 2, 7]);

        assert!(buffer.remove_ids(&ids(&[1])));
        assert_eq!(row_ids(&buffer.stream_page(0, 10, &[]).unwrap()), vec![2, 7]);
        assert_eq!(source.query_count(), 3);
    }

    #[test]
    fn test_empty_candidates_do_not_query() {
        let source = source(3);
        let buffer = FullyCachedRowsBuffer::new(source.clone(), vec![], ids(&[1]));
        buffer.remove_ids(&ids(&[1]));
        assert_eq!(buffer.size(), 0);
        assert_eq!(source.query_count(), 0);
    }

    #[test]
    fn test_contains_any_of_without_query() {
        let source = source(10);
        let buffer = FullyCachedRowsBuffer::new(source.clone(), vec![], ids(&[1, 2, 3]));
        assert!(buffer.contains_any_of(&ids(&[3, 8])));
        assert!(!buffer.contains_any_of(&ids(&[7])));
        assert_eq!(source.query_count(), 0);
    }

    #[test]
    fn test_stream_by_ids() {
        let buffer = FullyCachedRowsBuffer::new(source(10), vec![], ids(&[1, 2, 3]));
        let rows = buffer
            .stream_by_ids_excluding_included_rows(&DocumentIdsSelection::of(ids(&[3, 9])))
            .unwrap();
        assert_eq!(row_ids(&rows), vec![3]);
        let all = buffer
            .stream_by_ids_excluding_included_rows(&DocumentIdsSelection::All)
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_load_racing_add_ids_is_not_installed() {
        let (gated, entered, release) = GatedSource::new(InMemoryRecordSource::new(
            "M_Product",
            (1..=10)
                .map(|id| ViewRow::builder(WindowId::new("540"), RowId(id)).build())
                .collect(),
        ));
        let buffer = Arc::new(FullyCachedRowsBuffer::new(gated, vec![], ids(&[1, 2])));

        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.stream_page(0, 10, &[]).unwrap())
        };
        entered.recv().unwrap();
        assert!(buffer.add_ids(&ids(&[7])));
        release.send(()).unwrap();

        // the racing reader may see the old rows
        assert_eq!(row_ids(&reader.join().unwrap()), vec![1, 2]);
        assert_eq!(row_ids(&buffer.stream_page(0, 10, &[]).unwrap()), vec![1, 2, 7]);
    }

    #[test]
    fn test_load_racing_invalidate_all_reloads() {
        let (gated, entered, release) = GatedSource::new(InMemoryRecordSource::new(
            "M_Product",
            (1..=10)
                .map(|id| ViewRow::builder(WindowId::new("540"), RowId(id)).build())
                .collect(),
        ));
        let buffer = Arc::new(FullyCachedRowsBuffer::new(gated.clone(), vec![], ids(&[1, 2])));

        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.size())
        };
        entered.recv().unwrap();
        buffer.invalidate_all();
        gated.inner.upsert_row(
            ViewRow::builder(WindowId::new("540"), RowId(2))
                .value("Name", "changed")
                .build(),
        );
        release.send(()).unwrap();
        assert_eq!(reader.join().unwrap(), 2);

        let row = buffer.get_by_id(RowId(2)).unwrap();
        assert_eq!(row.value("Name"), Some(&crate::types::Value::text("changed")));
        assert_eq!(gated.inner.query_count(), 2);
    }
}
