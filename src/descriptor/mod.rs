//! Document schemas
//!
//! A `DocumentDescriptor` describes one document type: its ordered fields,
//! their dependency map, and the descriptors of any included details (tabs).
//! Descriptors are built once, validated up front, and shared via `Arc`.

pub mod dependency;
pub mod field;
pub mod logic;

pub use dependency::{DependencyMap, DependencyType, Dependent};
pub use field::{FieldDescriptor, FieldDescriptorBuilder, WidgetType};
pub use logic::{DefaultLogicEvaluator, FieldValues, LogicEvaluator, LogicExpression};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::DependencyConfig;
use crate::error::{Result, StateError};
use crate::types::{DetailId, WindowId};

/// Immutable schema of one document type (or of one included detail)
#[derive(Debug)]
pub struct DocumentDescriptor {
    window_id: WindowId,
    detail_id: Option<DetailId>,
    fields: Vec<FieldDescriptor>,
    field_index: HashMap<String, usize>,
    dependencies: DependencyMap,
    included: Vec<Arc<DocumentDescriptor>>,
}

impl DocumentDescriptor {
    pub fn builder(window_id: WindowId) -> DocumentDescriptorBuilder {
        DocumentDescriptorBuilder {
            window_id,
            detail_id: None,
            fields: Vec::new(),
            included: Vec::new(),
        }
    }

    pub fn window_id(&self) -> &WindowId {
        &self.window_id
    }

    /// Set for included-detail descriptors, `None` for the main section
    pub fn detail_id(&self) -> Option<&DetailId> {
        self.detail_id.as_ref()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, field_name: &str) -> Option<&FieldDescriptor> {
        self.field_index.get(field_name).map(|&i| &self.fields[i])
    }

    /// Position of a field in declaration order
    pub(crate) fn field_position(&self, field_name: &str) -> Option<usize> {
        self.field_index.get(field_name).copied()
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn included_detail(&self, detail_id: &DetailId) -> Option<&Arc<DocumentDescriptor>> {
        self.included
            .iter()
            .find(|d| d.detail_id.as_ref() == Some(detail_id))
    }

    pub fn included_details(&self) -> impl Iterator<Item = &Arc<DocumentDescriptor>> {
        self.included.iter()
    }
}

pub struct DocumentDescriptorBuilder {
    window_id: WindowId,
    detail_id: Option<DetailId>,
    fields: Vec<FieldDescriptor>,
    included: Vec<DocumentDescriptorBuilder>,
}

impl DocumentDescriptorBuilder {
    pub fn detail_id(mut self, detail_id: DetailId) -> Self {
        self.detail_id = Some(detail_id);
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Add an included detail; its `detail_id` must be set
    pub fn included(mut self, detail: DocumentDescriptorBuilder) -> Self {
        self.included.push(detail);
        self
    }

    pub fn build(self, config: &DependencyConfig) -> Result<Arc<DocumentDescriptor>> {
        let mut field_index = HashMap::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            if field_index.insert(field.field_name().to_string(), i).is_some() {
                return Err(StateError::configuration(format!(
                    "duplicate field '{}' in window {}",
                    field.field_name(),
                    self.window_id
                )));
            }
        }

        let dependencies = DependencyMap::build(&self.fields, config)?;

        let mut included = Vec::with_capacity(self.included.len());
        for detail in self.included {
            let detail_id = detail.detail_id.clone().ok_or_else(|| {
                StateError::configuration(format!(
                    "included detail of window {} has no detail id",
                    self.window_id
                ))
            })?;
            if !detail.included.is_empty() {
                return Err(StateError::configuration(format!(
                    "included detail {} cannot have details of its own",
                    detail_id
                )));
            }
            let descriptor: Arc<DocumentDescriptor> = detail.build(config)?;
            if included
                .iter()
                .any(|d: &Arc<DocumentDescriptor>| d.detail_id() == Some(&detail_id))
            {
                return Err(StateError::configuration(format!(
                    "duplicate detail {} in window {}",
                    detail_id, self.window_id
                )));
            }
            included.push(descriptor);
        }

        Ok(Arc::new(DocumentDescriptor {
            window_id: self.window_id,
            detail_id: self.detail_id,
            fields: self.fields,
            field_index,
            dependencies,
            included,
        }))
    }
}

/// Supplies document descriptors by window id
pub trait SchemaProvider: Send + Sync {
    fn document_descriptor(&self, window_id: &WindowId) -> Result<Arc<DocumentDescriptor>>;
}

/// In-memory schema provider; descriptors are cached for the process lifetime
#[derive(Default)]
pub struct DescriptorRegistry {
    descriptors: RwLock<HashMap<WindowId, Arc<DocumentDescriptor>>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: Arc<DocumentDescriptor>) {
        let window_id = descriptor.window_id().clone();
        log::debug!("Registering document descriptor for window {}", window_id);
        self.descriptors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(window_id, descriptor);
    }
}

impl SchemaProvider for DescriptorRegistry {
    fn document_descriptor(&self, window_id: &WindowId) -> Result<Arc<DocumentDescriptor>> {
        self.descriptors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(window_id)
            .cloned()
            .ok_or_else(|| StateError::not_found(format!("document descriptor for window {}", window_id)))
    }
}
