//! The editable document aggregate
//!
//! A `Document` owns its field state and its included detail rows. Value
//! changes are converted and validated before anything is mutated, then the
//! direct dependents of the changed field are recomputed. Recompute is
//! first-order: a dependent whose derived state flips does not trigger another
//! round for its own dependents.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::changes::{FieldChangeKind, Reason};
use super::collector::DocumentChangesCollector;
use super::field::DocumentField;
use super::lookup::{LookupDataSource, LookupValues};
use crate::descriptor::{
    DependencyType, Dependent, DocumentDescriptor, FieldDescriptor, FieldValues, LogicEvaluator,
};
use crate::error::{Result, StateError};
use crate::types::{DetailId, DocumentId, DocumentPath, Value};

pub struct Document {
    descriptor: Arc<DocumentDescriptor>,
    path: DocumentPath,
    /// Same order as the descriptor's fields
    fields: Vec<DocumentField>,
    evaluator: Arc<dyn LogicEvaluator>,
    included: BTreeMap<DetailId, Vec<Document>>,
}

impl Document {
    /// Create a document with default values and every logic expression
    /// evaluated once. Nothing is collected; callers report the initial state
    /// with [`DocumentChangesCollector::collect_from_document`].
    pub fn new(
        descriptor: Arc<DocumentDescriptor>,
        path: DocumentPath,
        evaluator: Arc<dyn LogicEvaluator>,
    ) -> Self {
        let fields = descriptor.fields().iter().map(DocumentField::new).collect();
        let mut document = Self {
            descriptor,
            path,
            fields,
            evaluator,
            included: BTreeMap::new(),
        };
        document.evaluate_all_logic();
        document
    }

    fn evaluate_all_logic(&mut self) {
        let descriptor = Arc::clone(&self.descriptor);
        let states: Vec<(bool, bool, bool)> = descriptor
            .fields()
            .iter()
            .map(|fd| {
                (
                    self.compute_readonly(fd),
                    self.evaluator.evaluate(fd.display_logic(), &*self),
                    self.evaluator.evaluate(fd.mandatory_logic(), &*self),
                )
            })
            .collect();

        for (field, (readonly, displayed, mandatory)) in self.fields.iter_mut().zip(states) {
            field.set_readonly(readonly);
            field.set_displayed(displayed);
            field.set_mandatory(mandatory);
        }
    }

    fn compute_readonly(&self, fd: &FieldDescriptor) -> bool {
        !fd.is_always_updateable() && self.evaluator.evaluate(fd.readonly_logic(), self)
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn descriptor(&self) -> &Arc<DocumentDescriptor> {
        &self.descriptor
    }

    pub fn fields(&self) -> &[DocumentField] {
        &self.fields
    }

    fn position(&self, field_name: &str) -> Result<usize> {
        self.descriptor.field_position(field_name).ok_or_else(|| {
            StateError::not_found(format!("field '{}' of document {}", field_name, self.path))
        })
    }

    pub fn field(&self, field_name: &str) -> Result<&DocumentField> {
        let index = self.position(field_name)?;
        Ok(&self.fields[index])
    }

    pub fn value(&self, field_name: &str) -> Result<&Value> {
        self.field(field_name).map(DocumentField::value)
    }

    /// Set a field's value and recompute its direct dependents.
    ///
    /// All-or-nothing: an unknown field or a value that does not fit the
    /// field's value class leaves the document untouched. Setting the current
    /// value is a no-op and collects nothing.
    pub fn set_value(
        &mut self,
        field_name: &str,
        value: Value,
        reason: Reason,
        collector: &mut DocumentChangesCollector,
    ) -> Result<()> {
        let index = self.position(field_name)?;
        let descriptor = Arc::clone(&self.descriptor);
        let value = descriptor.fields()[index]
            .value_class()
            .convert(field_name, value)?;

        if self.fields[index].value() == &value {
            return Ok(());
        }

        log::trace!("{}: {} = {}", self.path, field_name, value);
        self.fields[index].set_value(value);
        collector.collect_value_changed(&self.path, &self.fields[index], reason);

        for dependent in descriptor.dependencies().dependents_of(field_name) {
            self.recompute(&descriptor, dependent, field_name, collector);
        }
        Ok(())
    }

    fn recompute(
        &mut self,
        descriptor: &DocumentDescriptor,
        dependent: &Dependent,
        trigger: &str,
        collector: &mut DocumentChangesCollector,
    ) {
        let Some(index) = descriptor.field_position(&dependent.field_name) else {
            return;
        };
        let fd = &descriptor.fields()[index];

        match dependent.kind {
            DependencyType::ReadonlyLogic => {
                let readonly = self.compute_readonly(fd);
                if readonly != self.fields[index].is_readonly() {
                    self.fields[index].set_readonly(readonly);
                    collector.collect_readonly_changed(
                        &self.path,
                        &self.fields[index],
                        Reason::caused_by(trigger, FieldChangeKind::Readonly),
                    );
                }
            }
            DependencyType::DisplayLogic => {
                let displayed = self.evaluator.evaluate(fd.display_logic(), &*self);
                if displayed != self.fields[index].is_displayed() {
                    self.fields[index].set_displayed(displayed);
                    collector.collect_displayed_changed(
                        &self.path,
                        &self.fields[index],
                        Reason::caused_by(trigger, FieldChangeKind::Displayed),
                    );
                }
            }
            DependencyType::MandatoryLogic => {
                let mandatory = self.evaluator.evaluate(fd.mandatory_logic(), &*self);
                if mandatory != self.fields[index].is_mandatory() {
                    self.fields[index].set_mandatory(mandatory);
                    collector.collect_mandatory_changed(
                        &self.path,
                        &self.fields[index],
                        Reason::caused_by(trigger, FieldChangeKind::Mandatory),
                    );
                }
            }
            DependencyType::LookupValues => {
                self.fields[index].mark_lookup_values_stale();
                collector.collect_lookup_values_staled(
                    &self.path,
                    &self.fields[index],
                    Reason::caused_by(trigger, FieldChangeKind::LookupValuesStaled),
                );
            }
        }
        log::debug!(
            "{}: recomputed {:?} of {} after {} changed",
            self.path,
            dependent.kind,
            dependent.field_name,
            trigger
        );
    }

    /// Apply several value changes in order, stopping at the first failure.
    /// Changes applied before the failure stay applied.
    pub fn process_value_changes<I, S>(
        &mut self,
        changes: I,
        reason: Reason,
        collector: &mut DocumentChangesCollector,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        for (field_name, value) in changes {
            self.set_value(field_name.as_ref(), value, reason.clone(), collector)?;
        }
        Ok(())
    }

    /// Lookup candidates for a field, fetched from `source` only when the
    /// cached candidates are stale or were never fetched
    pub fn lookup_values(
        &mut self,
        field_name: &str,
        source: &dyn LookupDataSource,
    ) -> Result<Arc<LookupValues>> {
        let index = self.position(field_name)?;
        if let Some(cached) = self.fields[index].cached_lookup_values() {
            return Ok(Arc::clone(cached));
        }

        let values = Arc::new(source.retrieve_lookup_values(field_name, &*self)?);
        log::debug!(
            "{}: fetched {} lookup values for {}",
            self.path,
            values.len(),
            field_name
        );
        self.fields[index].set_lookup_values(Arc::clone(&values));
        Ok(values)
    }

    /// Fail if any displayed, mandatory field has no value
    pub fn check_mandatory(&self) -> Result<()> {
        let missing: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.is_missing_mandatory_value())
            .map(DocumentField::field_name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StateError::validation(format!(
                "mandatory fields without value in {}: {}",
                self.path,
                missing.join(", ")
            )))
        }
    }

    /// Create a row in one of this document's included details
    pub fn create_included_document(
        &mut self,
        detail_id: &DetailId,
        row_id: DocumentId,
        collector: &mut DocumentChangesCollector,
    ) -> Result<&mut Document> {
        let detail = self
            .descriptor
            .included_detail(detail_id)
            .cloned()
            .ok_or_else(|| {
                StateError::not_found(format!("detail {} of document {}", detail_id, self.path))
            })?;

        let row_path = self.path.with_row(detail_id.clone(), row_id);
        if self.included_documents(detail_id).iter().any(|d| d.path == row_path) {
            return Err(StateError::illegal_state(format!(
                "included document {} already exists",
                row_path
            )));
        }

        let row = Document::new(detail, row_path, Arc::clone(&self.evaluator));
        collector.collect_from_document(&row, Reason::new("included document created"));
        collector.collect_included_detail_staled(&self.path, detail_id.clone());
        log::debug!("{}: created included document {}", self.path, row.path);

        let rows = self.included.entry(detail_id.clone()).or_default();
        rows.push(row);
        let last = rows.len() - 1;
        Ok(&mut rows[last])
    }

    /// Remove a row from an included detail; the row and its state are
    /// returned to the caller and released with it
    pub fn delete_included_document(
        &mut self,
        detail_id: &DetailId,
        row_id: &DocumentId,
        collector: &mut DocumentChangesCollector,
    ) -> Result<Document> {
        let position = self
            .included
            .get(detail_id)
            .and_then(|rows| rows.iter().position(|d| d.path.row_id() == Some(row_id)))
            .ok_or_else(|| self.row_not_found(detail_id, row_id))?;

        let rows = self
            .included
            .get_mut(detail_id)
            .ok_or_else(|| StateError::not_found(format!("detail {}", detail_id)))?;
        let removed = rows.remove(position);
        collector.collect_included_detail_staled(&self.path, detail_id.clone());
        log::debug!("{}: deleted included document {}", self.path, removed.path);
        Ok(removed)
    }

    pub fn included_documents(&self, detail_id: &DetailId) -> &[Document] {
        self.included
            .get(detail_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn included_document(&self, detail_id: &DetailId, row_id: &DocumentId) -> Result<&Document> {
        self.included_documents(detail_id)
            .iter()
            .find(|d| d.path.row_id() == Some(row_id))
            .ok_or_else(|| self.row_not_found(detail_id, row_id))
    }

    pub fn included_document_mut(
        &mut self,
        detail_id: &DetailId,
        row_id: &DocumentId,
    ) -> Result<&mut Document> {
        let not_found = self.row_not_found(detail_id, row_id);
        self.included
            .get_mut(detail_id)
            .and_then(|rows| rows.iter_mut().find(|d| d.path.row_id() == Some(row_id)))
            .ok_or(not_found)
    }

    fn row_not_found(&self, detail_id: &DetailId, row_id: &DocumentId) -> StateError {
        StateError::not_found(format!(
            "included document {}",
            self.path.with_row(detail_id.clone(), row_id.clone())
        ))
    }
}

impl FieldValues for Document {
    fn field_value(&self, name: &str) -> Option<&Value> {
        self.descriptor
            .field_position(name)
            .map(|index| self.fields[index].value())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path)
            .field("fields", &self.fields)
            .field("included", &self.included)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DependencyConfig;
    use crate::descriptor::{DefaultLogicEvaluator, WidgetType};
    use crate::types::WindowId;
    use std::cell::Cell;

    fn order_descriptor() -> Arc<DocumentDescriptor> {
        DocumentDescriptor::builder(WindowId::new("143"))
            .field(FieldDescriptor::builder("Qty", WidgetType::Quantity).build().unwrap())
            .field(
                FieldDescriptor::builder("Discount", WidgetType::Number)
                    .display_logic("@Qty@>10")
                    .build()
                    .unwrap(),
            )
            .field(
                FieldDescriptor::builder("Processed", WidgetType::YesNo)
                    .default_value(Value::bool(false))
                    .build()
                    .unwrap(),
            )
            .field(
                FieldDescriptor::builder("Description", WidgetType::Text)
                    .readonly_logic("@Processed@='Y'")
                    .build()
                    .unwrap(),
            )
            .field(
                FieldDescriptor::builder("Comments", WidgetType::Text)
                    .readonly_logic("@Processed@='Y'")
                    .always_updateable(true)
                    .build()
                    .unwrap(),
            )
            .field(
                FieldDescriptor::builder("Warehouse", WidgetType::Lookup)
                    .mandatory_logic("@Processed@='Y'")
                    .build()
                    .unwrap(),
            )
            .field(
                FieldDescriptor::builder("Locator", WidgetType::Lookup)
                    .lookup_depends_on(["Warehouse"])
                    .display_logic("@Discount@>0")
                    .build()
                    .unwrap(),
            )
            .included(
                DocumentDescriptor::builder(WindowId::new("143"))
                    .detail_id(DetailId::new("lines"))
                    .field(FieldDescriptor::builder("Line", WidgetType::Integer).build().unwrap()),
            )
            .build(&DependencyConfig::default())
            .unwrap()
    }

    fn new_document() -> Document {
        Document::new(
            order_descriptor(),
            DocumentPath::root(WindowId::new("143"), DocumentId::Int(1)),
            Arc::new(DefaultLogicEvaluator),
        )
    }

    fn kinds_for(collector: &DocumentChangesCollector, doc: &Document, field: &str) -> Vec<FieldChangeKind> {
        collector
            .changes_for(doc.path())
            .and_then(|c| c.field_change(field))
            .map(|c| c.kinds().iter().copied().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_initial_logic_evaluated() {
        let doc = new_document();
        assert!(!doc.field("Discount").unwrap().is_displayed());
        assert!(!doc.field("Description").unwrap().is_readonly());
        assert!(!doc.field("Warehouse").unwrap().is_mandatory());
        assert_eq!(doc.value("Processed").unwrap(), &Value::bool(false));
    }

    #[test]
    fn test_display_flips_once() {
        let mut doc = new_document();

        let mut first = DocumentChangesCollector::new();
        doc.set_value("Qty", Value::int(5), Reason::from("user"), &mut first)
            .unwrap();
        assert!(kinds_for(&first, &doc, "Discount").is_empty());
        assert_eq!(kinds_for(&first, &doc, "Qty"), vec![FieldChangeKind::Value]);

        let mut second = DocumentChangesCollector::new();
        doc.set_value("Qty", Value::int(15), Reason::from("user"), &mut second)
            .unwrap();
        assert_eq!(
            kinds_for(&second, &doc, "Discount"),
            vec![FieldChangeKind::Displayed]
        );
        let change = second
            .changes_for(doc.path())
            .and_then(|c| c.field_change("Discount"))
            .unwrap();
        assert!(change.is_displayed());
    }

    #[test]
    fn test_same_value_is_noop() {
        let mut doc = new_document();
        let mut collector = DocumentChangesCollector::new();
        doc.set_value("Processed", Value::bool(false), Reason::from("user"), &mut collector)
            .unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_value_converted_before_compare() {
        let mut doc = new_document();
        let mut collector = DocumentChangesCollector::new();
        doc.set_value("Processed", Value::text("N"), Reason::from("user"), &mut collector)
            .unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_readonly_flip_respects_always_updateable() {
        let mut doc = new_document();
        let mut collector = DocumentChangesCollector::new();
        doc.set_value("Processed", Value::bool(true), Reason::from("complete"), &mut collector)
            .unwrap();

        assert!(doc.field("Description").unwrap().is_readonly());
        assert!(!doc.field("Comments").unwrap().is_readonly());
        assert_eq!(
            kinds_for(&collector, &doc, "Description"),
            vec![FieldChangeKind::Readonly]
        );
        assert!(kinds_for(&collector, &doc, "Comments").is_empty());
        assert_eq!(
            kinds_for(&collector, &doc, "Warehouse"),
            vec![FieldChangeKind::Mandatory]
        );
    }

    #[test]
    fn test_invalid_value_leaves_state_untouched() {
        let mut doc = new_document();
        let mut collector = DocumentChangesCollector::new();
        let err = doc
            .set_value("Qty", Value::text("many"), Reason::from("user"), &mut collector)
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
        assert!(doc.value("Qty").unwrap().is_null());
        assert!(collector.is_empty());
    }

    #[test]
    fn test_unknown_field_not_found() {
        let mut doc = new_document();
        let mut collector = DocumentChangesCollector::new();
        let err = doc
            .set_value("Nope", Value::int(1), Reason::from("user"), &mut collector)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_recompute_is_first_order() {
        let mut doc = new_document();
        let mut collector = DocumentChangesCollector::new();
        // Discount becomes displayed, but Locator's display logic reads
        // Discount's value, which did not change
        doc.set_value("Qty", Value::int(20), Reason::from("user"), &mut collector)
            .unwrap();
        assert!(kinds_for(&collector, &doc, "Locator").is_empty());

        doc.set_value("Discount", Value::number(3.0), Reason::from("user"), &mut collector)
            .unwrap();
        assert_eq!(
            kinds_for(&collector, &doc, "Locator"),
            vec![FieldChangeKind::Displayed]
        );
    }

    struct CountingLookups {
        calls: Cell<usize>,
    }

    impl LookupDataSource for CountingLookups {
        fn retrieve_lookup_values(
            &self,
            _field_name: &str,
            document_values: &dyn FieldValues,
        ) -> Result<LookupValues> {
            self.calls.set(self.calls.get() + 1);
            let warehouse = document_values
                .field_value("Warehouse")
                .map(Value::as_comparable_text)
                .unwrap_or_default();
            Ok(LookupValues::new(vec![Value::lookup(
                format!("{}-A", warehouse),
                "Aisle A",
            )]))
        }
    }

    #[test]
    fn test_lookup_values_refetched_only_when_stale() {
        let mut doc = new_document();
        let source = CountingLookups { calls: Cell::new(0) };

        doc.lookup_values("Locator", &source).unwrap();
        doc.lookup_values("Locator", &source).unwrap();
        assert_eq!(source.calls.get(), 1);

        let mut collector = DocumentChangesCollector::new();
        doc.set_value("Warehouse", Value::lookup("WH1", "Main"), Reason::from("user"), &mut collector)
            .unwrap();
        assert!(doc.field("Locator").unwrap().is_lookup_values_stale());
        assert_eq!(
            kinds_for(&collector, &doc, "Locator"),
            vec![FieldChangeKind::LookupValuesStaled]
        );

        let values = doc.lookup_values("Locator", &source).unwrap();
        assert_eq!(source.calls.get(), 2);
        assert!(values.contains_key("WH1-A"));
        assert!(!doc.field("Locator").unwrap().is_lookup_values_stale());
    }

    #[test]
    fn test_check_mandatory() {
        let mut doc = new_document();
        assert!(doc.check_mandatory().is_ok());

        let mut collector = DocumentChangesCollector::new();
        doc.set_value("Processed", Value::bool(true), Reason::from("user"), &mut collector)
            .unwrap();
        let err = doc.check_mandatory().unwrap_err();
        assert!(matches!(err, StateError::Validation(ref m) if m.contains("Warehouse")));
    }

    #[test]
    fn test_included_documents() {
        let mut doc = new_document();
        let lines = DetailId::new("lines");
        let mut collector = DocumentChangesCollector::new();

        doc.create_included_document(&lines, DocumentId::Int(10), &mut collector)
            .unwrap();
        assert!(collector
            .changes_for(doc.path())
            .unwrap()
            .stale_details()
            .contains(&lines));

        let err = doc
            .create_included_document(&lines, DocumentId::Int(10), &mut collector)
            .unwrap_err();
        assert!(matches!(err, StateError::IllegalState(_)));

        let err = doc
            .create_included_document(&DetailId::new("other"), DocumentId::Int(1), &mut collector)
            .unwrap_err();
        assert!(err.is_not_found());

        doc.included_document_mut(&lines, &DocumentId::Int(10))
            .unwrap()
            .set_value("Line", Value::int(10), Reason::from("user"), &mut collector)
            .unwrap();
        assert_eq!(
            doc.included_document(&lines, &DocumentId::Int(10))
                .unwrap()
                .value("Line")
                .unwrap(),
            &Value::int(10)
        );

        let removed = doc
            .delete_included_document(&lines, &DocumentId::Int(10), &mut collector)
            .unwrap();
        assert_eq!(removed.path().row_id(), Some(&DocumentId::Int(10)));
        assert!(doc.included_documents(&lines).is_empty());
        assert!(doc
            .delete_included_document(&lines, &DocumentId::Int(10), &mut collector)
            .unwrap_err()
            .is_not_found());
    }
}
