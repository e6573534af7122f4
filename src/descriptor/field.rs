//! Field descriptors
//!
//! Schema-time definition of one field. Descriptors are immutable once built and
//! are shared by every document instance of their schema.

use serde::Serialize;

use super::logic::LogicExpression;
use crate::error::{Result, StateError};
use crate::types::{DetailId, Value, ValueClass};

/// How a field is rendered; carried through for collaborators, not interpreted here
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum WidgetType {
    Text,
    LongText,
    Integer,
    Number,
    Amount,
    Quantity,
    YesNo,
    Date,
    List,
    Lookup,
}

impl WidgetType {
    /// The value class a widget implies when none is given explicitly
    pub fn default_value_class(&self) -> ValueClass {
        match self {
            WidgetType::Text | WidgetType::LongText => ValueClass::Text,
            WidgetType::Integer => ValueClass::Integer,
            WidgetType::Number | WidgetType::Amount | WidgetType::Quantity => ValueClass::Number,
            WidgetType::YesNo => ValueClass::YesNo,
            WidgetType::Date => ValueClass::Date,
            WidgetType::List | WidgetType::Lookup => ValueClass::Lookup,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldDescriptor {
    field_name: String,
    detail_id: Option<DetailId>,
    caption: Option<String>,
    key: bool,
    widget_type: WidgetType,
    value_class: ValueClass,
    default_value: Option<Value>,
    readonly_logic: LogicExpression,
    always_updateable: bool,
    display_logic: LogicExpression,
    mandatory_logic: LogicExpression,
    lookup_depends_on: Vec<String>,
}

impl FieldDescriptor {
    pub fn builder(field_name: impl Into<String>, widget_type: WidgetType) -> FieldDescriptorBuilder {
        FieldDescriptorBuilder {
            field_name: field_name.into(),
            widget_type,
            detail_id: None,
            caption: None,
            key: false,
            value_class: None,
            default_value: None,
            readonly_logic: None,
            always_updateable: false,
            display_logic: None,
            mandatory_logic: None,
            lookup_depends_on: Vec::new(),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn detail_id(&self) -> Option<&DetailId> {
        self.detail_id.as_ref()
    }

    pub fn caption(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.field_name)
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn widget_type(&self) -> WidgetType {
        self.widget_type
    }

    pub fn value_class(&self) -> ValueClass {
        self.value_class
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn readonly_logic(&self) -> &LogicExpression {
        &self.readonly_logic
    }

    pub fn is_always_updateable(&self) -> bool {
        self.always_updateable
    }

    pub fn display_logic(&self) -> &LogicExpression {
        &self.display_logic
    }

    pub fn mandatory_logic(&self) -> &LogicExpression {
        &self.mandatory_logic
    }

    /// Names whose change invalidates this field's lookup candidates
    pub fn lookup_depends_on(&self) -> &[String] {
        &self.lookup_depends_on
    }
}

pub struct FieldDescriptorBuilder {
    field_name: String,
    widget_type: WidgetType,
    detail_id: Option<DetailId>,
    caption: Option<String>,
    key: bool,
    value_class: Option<ValueClass>,
    default_value: Option<Value>,
    readonly_logic: Option<String>,
    always_updateable: bool,
    display_logic: Option<String>,
    mandatory_logic: Option<String>,
    lookup_depends_on: Vec<String>,
}

impl FieldDescriptorBuilder {
    pub fn detail_id(mut self, detail_id: DetailId) -> Self {
        self.detail_id = Some(detail_id);
        self
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        let caption = caption.into();
        self.caption = if caption.is_empty() { None } else { Some(caption) };
        self
    }

    pub fn key(mut self, key: bool) -> Self {
        self.key = key;
        self
    }

    pub fn value_class(mut self, value_class: ValueClass) -> Self {
        self.value_class = Some(value_class);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn readonly_logic(mut self, source: impl Into<String>) -> Self {
        self.readonly_logic = Some(source.into());
        self
    }

    pub fn always_updateable(mut self, always_updateable: bool) -> Self {
        self.always_updateable = always_updateable;
        self
    }

    pub fn display_logic(mut self, source: impl Into<String>) -> Self {
        self.display_logic = Some(source.into());
        self
    }

    pub fn mandatory_logic(mut self, source: impl Into<String>) -> Self {
        self.mandatory_logic = Some(source.into());
        self
    }

    pub fn lookup_depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.lookup_depends_on.contains(&name) {
                self.lookup_depends_on.push(name);
            }
        }
        self
    }

    /// Parse the logic expressions and validate the default value
    pub fn build(self) -> Result<FieldDescriptor> {
        let field_name = self.field_name.trim().to_string();
        if field_name.is_empty() {
            return Err(StateError::configuration("field name is empty"));
        }

        let parse = |source: Option<String>, default: bool| -> Result<LogicExpression> {
            match source {
                Some(s) => LogicExpression::parse(&s).map_err(|e| {
                    StateError::configuration(format!("field '{}': {}", field_name, e))
                }),
                None => Ok(LogicExpression::constant(default)),
            }
        };
        let readonly_logic = parse(self.readonly_logic, false)?;
        let display_logic = parse(self.display_logic, true)?;
        let mandatory_logic = parse(self.mandatory_logic, false)?;

        let value_class = self
            .value_class
            .unwrap_or_else(|| self.widget_type.default_value_class());

        let default_value = match self.default_value {
            Some(value) => Some(value_class.convert(&field_name, value).map_err(|e| {
                StateError::configuration(format!("invalid default value: {}", e))
            })?),
            None => None,
        };

        Ok(FieldDescriptor {
            field_name,
            detail_id: self.detail_id,
            caption: self.caption,
            key: self.key,
            widget_type: self.widget_type,
            value_class,
            default_value,
            readonly_logic,
            always_updateable: self.always_updateable,
            display_logic,
            mandatory_logic,
            lookup_depends_on: self.lookup_depends_on,
        })
    }
}
