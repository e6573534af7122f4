//! Live documents, addressed by path

use std::collections::HashMap;
use std::sync::Arc;

use super::changes::Reason;
use super::collector::DocumentChangesCollector;
use super::document::Document;
use crate::descriptor::{DefaultLogicEvaluator, DocumentDescriptor, LogicEvaluator};
use crate::error::{Result, StateError};
use crate::types::{DocumentId, DocumentPath, Value};

/// Holds at most one live root document per path. Included rows are reached
/// through their root document.
pub struct DocumentCollection {
    evaluator: Arc<dyn LogicEvaluator>,
    documents: HashMap<DocumentPath, Document>,
}

impl Default for DocumentCollection {
    fn default() -> Self {
        Self::with_evaluator(Arc::new(DefaultLogicEvaluator))
    }
}

impl DocumentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evaluator(evaluator: Arc<dyn LogicEvaluator>) -> Self {
        Self {
            evaluator,
            documents: HashMap::new(),
        }
    }

    /// Create a root document and report its initial state to `collector`
    pub fn create_document(
        &mut self,
        descriptor: Arc<DocumentDescriptor>,
        document_id: DocumentId,
        collector: &mut DocumentChangesCollector,
    ) -> Result<&mut Document> {
        if descriptor.detail_id().is_some() {
            return Err(StateError::validation(format!(
                "descriptor of detail {:?} cannot back a root document",
                descriptor.detail_id()
            )));
        }
        let path = DocumentPath::root(descriptor.window_id().clone(), document_id);
        if self.documents.contains_key(&path) {
            return Err(StateError::illegal_state(format!(
                "document {} is already live",
                path
            )));
        }

        let document = Document::new(descriptor, path.clone(), Arc::clone(&self.evaluator));
        collector.collect_from_document(&document, Reason::new("document created"));
        log::debug!("Created document {}", path);
        Ok(self.documents.entry(path).or_insert(document))
    }

    pub fn contains(&self, path: &DocumentPath) -> bool {
        self.get(path).is_ok()
    }

    pub fn get(&self, path: &DocumentPath) -> Result<&Document> {
        let root = self
            .documents
            .get(&path.root_path())
            .ok_or_else(|| StateError::not_found(format!("document {}", path)))?;
        match (path.detail_id(), path.row_id()) {
            (None, None) => Ok(root),
            (Some(detail_id), Some(row_id)) => root.included_document(detail_id, row_id),
            _ => Err(StateError::not_found(format!("document {}", path))),
        }
    }

    pub fn get_mut(&mut self, path: &DocumentPath) -> Result<&mut Document> {
        let root = self
            .documents
            .get_mut(&path.root_path())
            .ok_or_else(|| StateError::not_found(format!("document {}", path)))?;
        match (path.detail_id(), path.row_id()) {
            (None, None) => Ok(root),
            (Some(detail_id), Some(row_id)) => root.included_document_mut(detail_id, row_id),
            _ => Err(StateError::not_found(format!("document {}", path))),
        }
    }

    /// Set a field on the document (or included row) at `path`
    pub fn set_value(
        &mut self,
        path: &DocumentPath,
        field_name: &str,
        value: Value,
        reason: Reason,
        collector: &mut DocumentChangesCollector,
    ) -> Result<()> {
        self.get_mut(path)?
            .set_value(field_name, value, reason, collector)
    }

    /// Drop a root document together with its included rows. Included rows
    /// are deleted through [`Document::delete_included_document`].
    pub fn remove(&mut self, path: &DocumentPath) -> Result<Document> {
        if path.detail_id().is_some() || path.row_id().is_some() {
            return Err(StateError::validation(format!(
                "{} is not a root document path",
                path
            )));
        }
        self.documents
            .remove(path)
            .ok_or_else(|| StateError::not_found(format!("document {}", path)))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DependencyConfig;
    use crate::descriptor::{FieldDescriptor, WidgetType};
    use crate::document::FieldChangeKind;
    use crate::types::{DetailId, WindowId};

    fn descriptor() -> Arc<DocumentDescriptor> {
        DocumentDescriptor::builder(WindowId::new("53009"))
            .field(FieldDescriptor::builder("Name", WidgetType::Text).build().unwrap())
            .included(
                DocumentDescriptor::builder(WindowId::new("53009"))
                    .detail_id(DetailId::new("items"))
                    .field(FieldDescriptor::builder("Qty", WidgetType::Quantity).build().unwrap()),
            )
            .build(&DependencyConfig::default())
            .unwrap()
    }

    #[test]
    fn test_create_reports_initial_state() {
        let mut documents = DocumentCollection::new();
        let mut collector = DocumentChangesCollector::new();
        let path = documents
            .create_document(descriptor(), DocumentId::Int(7), &mut collector)
            .unwrap()
            .path()
            .clone();

        let changes = collector.changes_for(&path).unwrap();
        let name = changes.field_change("Name").unwrap();
        assert!(name.has(FieldChangeKind::Value));
        assert!(name.has(FieldChangeKind::Displayed));
    }

    #[test]
    fn test_duplicate_live_document_rejected() {
        let mut documents = DocumentCollection::new();
        let mut collector = DocumentChangesCollector::new();
        documents
            .create_document(descriptor(), DocumentId::Int(7), &mut collector)
            .unwrap();
        let err = documents
            .create_document(descriptor(), DocumentId::Int(7), &mut collector)
            .unwrap_err();
        assert!(matches!(err, StateError::IllegalState(_)));
    }

    #[test]
    fn test_set_value_on_included_row_by_path() {
        let mut documents = DocumentCollection::new();
        let mut collector = DocumentChangesCollector::new();
        let items = DetailId::new("items");
        let root = documents
            .create_document(descriptor(), DocumentId::Int(7), &mut collector)
            .unwrap();
        root.create_included_document(&items, DocumentId::Int(1), &mut collector)
            .unwrap();
        let row_path = root.path().with_row(items, DocumentId::Int(1));

        let mut collector = DocumentChangesCollector::new();
        documents
            .set_value(&row_path, "Qty", Value::int(3), Reason::from("user"), &mut collector)
            .unwrap();
        assert_eq!(
            documents.get(&row_path).unwrap().value("Qty").unwrap(),
            &Value::number(3.0)
        );
        assert_eq!(collector.field_names(&row_path).len(), 1);

        let missing = row_path.root_path().with_row(DetailId::new("items"), DocumentId::Int(2));
        assert!(documents.get(&missing).unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove() {
        let mut documents = DocumentCollection::new();
        let mut collector = DocumentChangesCollector::new();
        let path = documents
            .create_document(descriptor(), DocumentId::Int(7), &mut collector)
            .unwrap()
            .path()
            .clone();
        documents.remove(&path).unwrap();
        assert!(documents.is_empty());
        assert!(!documents.contains(&path));
    }

    #[test]
    fn test_remove_rejects_included_row_path() {
        let mut documents = DocumentCollection::new();
        let mut collector = DocumentChangesCollector::new();
        let items = DetailId::new("items");
        let root = documents
            .create_document(descriptor(), DocumentId::Int(7), &mut collector)
            .unwrap();
        root.create_included_document(&items, DocumentId::Int(10), &mut collector)
            .unwrap();
        let root_path = root.path().clone();
        let row_path = root_path.with_row(items, DocumentId::Int(10));

        let err = documents.remove(&row_path).unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
        assert!(documents.contains(&root_path));
        assert!(documents.contains(&row_path));
    }

    #[test]
    fn test_partial_row_path_not_found() {
        let mut documents = DocumentCollection::new();
        let mut collector = DocumentChangesCollector::new();
        documents
            .create_document(descriptor(), DocumentId::Int(7), &mut collector)
            .unwrap();
        // a detail without a row, as a client could send it
        let mut json =
            serde_json::to_value(DocumentPath::root(WindowId::new("53009"), DocumentId::Int(7)))
                .unwrap();
        json["detail_id"] = serde_json::json!("items");
        let partial: DocumentPath = serde_json::from_value(json).unwrap();

        assert!(documents.get(&partial).unwrap_err().is_not_found());
        let err = documents
            .set_value(&partial, "Name", Value::text("x"), Reason::from("user"), &mut collector)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(documents.remove(&partial).is_err());
    }
}
