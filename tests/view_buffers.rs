//! View buffer selection and invalidation through the public API
//!
//! Run with:
//!   cargo test --test view_buffers

use std::collections::BTreeSet;
use std::sync::Arc;

use docflow::types::{RowId, TableRecordReference, Value, WindowId};
use docflow::view::{
    BufferStrategy, InMemoryRecordSource, OrderBy, RecordSource, View, ViewRow, ViewsRepository,
};
use docflow::{EngineConfig, UnitOfWork};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn window() -> WindowId {
    WindowId::new("540")
}

fn product_rows(n: i64) -> Vec<ViewRow> {
    (1..=n)
        .map(|id| {
            ViewRow::builder(window(), RowId(id))
                .value("Value", format!("P-{:04}", id))
                .value("Price", id as f64 * 1.5)
                .build()
        })
        .collect()
}

fn source(n: i64) -> Arc<InMemoryRecordSource> {
    Arc::new(InMemoryRecordSource::new("M_Product", product_rows(n)))
}

fn ids(list: &[i64]) -> BTreeSet<RowId> {
    list.iter().map(|&id| RowId(id)).collect()
}

fn view(source: Arc<InMemoryRecordSource>, pinned: &[i64]) -> View {
    View::builder(window(), source as Arc<dyn RecordSource>)
        .pinned_ids(ids(pinned))
        .config(EngineConfig::default())
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn strategy_follows_pinned_id_count() {
    init_logging();

    let small = view(source(100), &[1, 2, 3]);
    assert_eq!(small.strategy(), BufferStrategy::FullyCached);
    assert_eq!(small.size().unwrap(), 3);

    let unbounded = view(source(100), &[]);
    assert_eq!(unbounded.strategy(), BufferStrategy::HighVolume);
    assert_eq!(unbounded.size().unwrap(), 100);

    let uncounted = View::builder(
        window(),
        Arc::new(InMemoryRecordSource::new("M_Product", product_rows(100)).without_count()),
    )
    .build()
    .unwrap();
    assert_eq!(uncounted.size().unwrap(), -1);
}

#[test]
fn threshold_comes_from_config() {
    init_logging();
    let config = EngineConfig::from_json_str(r#"{"high_volume_threshold": 3}"#).unwrap();
    let v = View::builder(window(), source(10))
        .pinned_ids(ids(&[1, 2, 3]))
        .config(config)
        .build()
        .unwrap();
    assert_eq!(v.strategy(), BufferStrategy::HighVolume);
    assert_eq!(v.size().unwrap(), 3);
}

#[test]
fn fully_cached_pages_without_requerying() {
    init_logging();
    let src = source(100);
    let v = view(src.clone(), &[5, 3, 9, 1]);

    let page = v.get_page(0, 2, &[OrderBy::desc("Price")]).unwrap();
    let page_ids: Vec<RowId> = page.rows.iter().map(|r| r.id()).collect();
    assert_eq!(page_ids, vec![RowId(9), RowId(5)]);
    assert_eq!(page.size, 4);

    v.get_page(2, 2, &[OrderBy::asc("Value")]).unwrap();
    v.get_by_id(RowId(3)).unwrap();
    assert_eq!(src.query_count(), 1);
}

#[test]
fn add_ids_shows_row_without_explicit_invalidate() {
    init_logging();
    let v = view(source(100), &[1, 2]);
    assert_eq!(v.get_page(0, 10, &[]).unwrap().rows.len(), 2);

    let (changed, flushed) = UnitOfWork::run("add", |uow| {
        v.add_ids_and_invalidate(&ids(&[42]), uow.view_changes())
    })
    .unwrap();
    assert!(changed);
    assert!(flushed.views[0].is_fully_changed());

    let rows = v.get_page(0, 10, &[]).unwrap().rows;
    assert!(rows.iter().any(|r| r.id() == RowId(42)));
    assert_eq!(
        rows.iter().find(|r| r.id() == RowId(42)).and_then(|r| r.value("Price")),
        Some(&Value::number(63.0))
    );
}

#[test]
fn high_volume_queries_every_page() {
    init_logging();
    let src = source(500);
    let v = view(src.clone(), &[]);

    let first = v.get_page(0, 50, &[OrderBy::asc("Value")]).unwrap();
    let second = v.get_page(50, 50, &[OrderBy::asc("Value")]).unwrap();
    assert_eq!(first.rows[0].id(), RowId(1));
    assert_eq!(second.rows[0].id(), RowId(51));
    // each page costs a row query and a count
    assert_eq!(src.query_count(), 4);
}

#[test]
fn notify_records_changed_only_escalates_on_hit() {
    init_logging();
    let repository = ViewsRepository::new();
    let v = repository.register(view(source(100), &[1, 2, 3])).unwrap();

    let (_, missed) = UnitOfWork::run("notify", |uow| {
        repository.notify_records_changed(
            &[TableRecordReference::new("M_Product", 7)],
            uow.view_changes(),
        )
    })
    .unwrap();
    assert!(missed.views.is_empty());

    v.add_ids_and_invalidate(&ids(&[7]), &mut docflow::view::ViewChangesCollector::new())
        .unwrap();

    let (_, hit) = UnitOfWork::run("notify", |uow| {
        repository.notify_records_changed(
            &[
                TableRecordReference::new("C_Order", 1),
                TableRecordReference::new("M_Product", 7),
            ],
            uow.view_changes(),
        )
    })
    .unwrap();
    assert_eq!(hit.views.len(), 1);
    assert_eq!(hit.views[0].view_id(), v.view_id());
    assert!(hit.views[0].is_fully_changed());
}

#[test]
fn remove_ids_drops_row_from_next_page() {
    init_logging();
    let v = view(source(100), &[1, 2, 3]);
    v.get_page(0, 10, &[]).unwrap();

    let (changed, _) = UnitOfWork::run("remove", |uow| {
        v.remove_ids_and_invalidate(&ids(&[2]), uow.view_changes())
    })
    .unwrap();
    assert!(changed);
    let page_ids: Vec<RowId> = v.get_page(0, 10, &[]).unwrap().rows.iter().map(|r| r.id()).collect();
    assert_eq!(page_ids, vec![RowId(1), RowId(3)]);
    assert_eq!(v.sticky_filters()[0].parameters().len(), 2);
}
