//! Document edit lifecycle through the public API
//!
//! Builds an order schema, edits it inside units of work and checks what the
//! flushed change sets report.
//!
//! Run with:
//!   cargo test --test document_recompute

use std::sync::Arc;

use docflow::descriptor::{DescriptorRegistry, DocumentDescriptor, FieldDescriptor, SchemaProvider, WidgetType};
use docflow::document::{DocumentCollection, FieldChangeKind, Reason};
use docflow::types::{DetailId, DocumentId, DocumentPath, Value, WindowId};
use docflow::{EngineConfig, StateError, UnitOfWork};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn order_window() -> WindowId {
    WindowId::new("143")
}

fn register_order_schema(registry: &DescriptorRegistry, config: &EngineConfig) {
    let descriptor = DocumentDescriptor::builder(order_window())
        .field(
            FieldDescriptor::builder("DocumentNo", WidgetType::Text)
                .key(true)
                .build()
                .unwrap(),
        )
        .field(FieldDescriptor::builder("Qty", WidgetType::Quantity).build().unwrap())
        .field(
            FieldDescriptor::builder("Discount", WidgetType::Number)
                .display_logic("@Qty@>10")
                .build()
                .unwrap(),
        )
        .field(
            FieldDescriptor::builder("IsApproved", WidgetType::YesNo)
                .default_value(Value::bool(false))
                .build()
                .unwrap(),
        )
        .field(
            FieldDescriptor::builder("Qty_Override", WidgetType::Quantity)
                .readonly_logic("@IsApproved@='Y'")
                .build()
                .unwrap(),
        )
        .included(
            DocumentDescriptor::builder(order_window())
                .detail_id(DetailId::new("lines"))
                .field(FieldDescriptor::builder("Product", WidgetType::Lookup).build().unwrap())
                .field(
                    FieldDescriptor::builder("Price", WidgetType::Amount)
                        .mandatory_logic("@Product@!''")
                        .build()
                        .unwrap(),
                ),
        )
        .build(&config.dependencies)
        .unwrap();
    registry.register(descriptor);
}

fn order_path(id: i64) -> DocumentPath {
    DocumentPath::root(order_window(), DocumentId::Int(id))
}

fn setup() -> DocumentCollection {
    init_logging();
    let config = EngineConfig::default();
    let registry = DescriptorRegistry::new();
    register_order_schema(&registry, &config);

    let mut documents = DocumentCollection::new();
    let descriptor = registry.document_descriptor(&order_window()).unwrap();
    let (_, flushed) = UnitOfWork::run("create", |uow| {
        documents
            .create_document(descriptor, DocumentId::Int(1), uow.document_changes())
            .map(|_| ())
    })
    .unwrap();
    assert_eq!(flushed.documents.len(), 1);
    documents
}

fn set(
    documents: &mut DocumentCollection,
    field: &str,
    value: Value,
) -> docflow::FlushedChanges {
    let (_, flushed) = UnitOfWork::run("edit", |uow| {
        documents.set_value(
            &order_path(1),
            field,
            value,
            Reason::from("user edit"),
            uow.document_changes(),
        )
    })
    .unwrap();
    flushed
}

fn kinds(flushed: &docflow::FlushedChanges, field: &str) -> Vec<FieldChangeKind> {
    flushed
        .documents
        .iter()
        .filter_map(|c| c.field_change(field))
        .flat_map(|c| c.kinds().iter().copied())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn discount_displayed_only_when_qty_exceeds_ten() {
    let mut documents = setup();

    let first = set(&mut documents, "Qty", Value::number(5.0));
    assert!(kinds(&first, "Discount").is_empty());

    let second = set(&mut documents, "Qty", Value::number(15.0));
    assert_eq!(kinds(&second, "Discount"), vec![FieldChangeKind::Displayed]);
    let change = second.documents[0].field_change("Discount").unwrap();
    assert!(change.is_displayed());
}

#[test]
fn readonly_collected_only_when_logic_flips() {
    let mut documents = setup();

    let approve = set(&mut documents, "IsApproved", Value::bool(true));
    assert_eq!(kinds(&approve, "Qty_Override"), vec![FieldChangeKind::Readonly]);

    // still approved: same value, nothing to report
    let again = set(&mut documents, "IsApproved", Value::text("Y"));
    assert!(again.is_empty());
}

#[test]
fn failed_edit_keeps_state_and_reports_nothing() {
    let mut documents = setup();
    set(&mut documents, "Qty", Value::number(3.0));

    let err = UnitOfWork::run("edit", |uow| {
        documents.set_value(
            &order_path(1),
            "Qty",
            Value::text("lots"),
            Reason::from("user edit"),
            uow.document_changes(),
        )
    })
    .unwrap_err();
    assert!(matches!(err, StateError::Validation(_)));
    assert_eq!(
        documents.get(&order_path(1)).unwrap().value("Qty").unwrap(),
        &Value::number(3.0)
    );
}

#[test]
fn included_rows_report_on_parent_and_row_paths() {
    let mut documents = setup();
    let lines = DetailId::new("lines");

    let (row_path, flushed) = UnitOfWork::run("add line", |uow| {
        let row = documents
            .get_mut(&order_path(1))?
            .create_included_document(&lines, DocumentId::Int(10), uow.document_changes())?;
        Ok(row.path().clone())
    })
    .unwrap();

    let paths: Vec<&DocumentPath> = flushed.documents.iter().map(|c| c.document_path()).collect();
    assert_eq!(paths, vec![&row_path, &order_path(1)]);
    assert!(flushed.documents[1].stale_details().contains(&lines));

    let (_, flushed) = UnitOfWork::run("pick product", |uow| {
        documents.set_value(
            &row_path,
            "Product",
            Value::lookup("1000001", "Widget"),
            Reason::from("user edit"),
            uow.document_changes(),
        )
    })
    .unwrap();
    assert_eq!(
        kinds(&flushed, "Price"),
        vec![FieldChangeKind::Mandatory]
    );
    assert!(documents.get(&row_path).unwrap().check_mandatory().is_err());
}

#[test]
fn flushed_changes_serialize_for_transport() {
    let mut documents = setup();
    let flushed = set(&mut documents, "Qty", Value::number(12.0));
    let json = serde_json::to_value(&flushed).unwrap();
    assert_eq!(json["unit_of_work"], "edit");
    assert_eq!(json["documents"][0]["fields"]["Qty"]["value"], 12.0);
}
