//! Typed field registry for editable record classes.
//!
//! Records are read and written by field name, but every name is resolved
//! against a `ClassSchema` first so a bad name or a mistyped value fails
//! loudly instead of silently creating a new attribute.
use crate::error::WorkflowError;
use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type RecordId = u64;

/// Storage kind of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    ShortText,
    LongText,
    RichText,
    Integer,
    Float,
    Boolean,
    DateTime,
    HasOne { class: String },
    HasMany { class: String },
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::ShortText => "short_text",
            FieldKind::LongText => "long_text",
            FieldKind::RichText => "rich_text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::DateTime => "date_time",
            FieldKind::HasOne { .. } => "has_one",
            FieldKind::HasMany { .. } => "has_many",
        }
    }

    /// Class name on the far side of a relation field.
    pub fn related_class(&self) -> Option<&str> {
        match self {
            FieldKind::HasOne { class } | FieldKind::HasMany { class } => Some(class),
            _ => None,
        }
    }

    /// Whether `value` is a legal native value for this kind.
    pub fn accepts(&self, value: &NativeValue) -> bool {
        matches!(
            (self, value),
            (_, NativeValue::Null)
                | (
                    FieldKind::ShortText | FieldKind::LongText | FieldKind::RichText,
                    NativeValue::Text(_)
                )
                | (FieldKind::Integer, NativeValue::Integer(_))
                | (FieldKind::Float, NativeValue::Float(_))
                | (FieldKind::Boolean, NativeValue::Boolean(_))
                | (FieldKind::DateTime, NativeValue::DateTime(_))
                | (FieldKind::HasOne { .. }, NativeValue::Ref(_))
                | (FieldKind::HasMany { .. }, NativeValue::Refs(_))
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native storage value of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Ref(RecordId),
    Refs(Vec<RecordId>),
}

impl NativeValue {
    /// Template truthiness: empty, zero, false and unset all count as false.
    pub fn is_truthy(&self) -> bool {
        match self {
            NativeValue::Null => false,
            NativeValue::Text(text) => !text.trim().is_empty(),
            NativeValue::Integer(value) => *value != 0,
            NativeValue::Float(value) => *value != 0.0,
            NativeValue::Boolean(value) => *value,
            NativeValue::DateTime(_) => true,
            NativeValue::Ref(id) => *id != 0,
            NativeValue::Refs(ids) => !ids.is_empty(),
        }
    }
}

/// Field registry for one record class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassSchema {
    pub name: String,
    /// Field used when a record of this class is shown as a candidate.
    #[serde(default = "default_title_field")]
    pub title_field: String,
    pub fields: BTreeMap<String, FieldKind>,
}

fn default_title_field() -> String {
    "Title".to_string()
}

impl ClassSchema {
    pub fn field(&self, name: &str) -> Option<&FieldKind> {
        self.fields.get(name)
    }

    /// Resolve a field or fail with a validation error naming the class.
    pub fn require_field(&self, name: &str) -> Result<&FieldKind> {
        self.field(name).ok_or_else(|| {
            WorkflowError::Validation(format!("class {} has no field {name:?}", self.name)).into()
        })
    }
}

/// One loaded record with schema-checked field access.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<ClassSchema>,
    id: RecordId,
    fields: BTreeMap<String, NativeValue>,
}

impl Record {
    pub fn new(schema: Arc<ClassSchema>, id: RecordId) -> Self {
        Self {
            schema,
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn class(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ClassSchema {
        &self.schema
    }

    /// Read a field; unset fields read as `Null`.
    pub fn get(&self, field: &str) -> Result<&NativeValue> {
        self.schema.require_field(field)?;
        Ok(self.fields.get(field).unwrap_or(&NativeValue::Null))
    }

    /// Write a field after checking the value against the field kind.
    pub fn set(&mut self, field: &str, value: NativeValue) -> Result<()> {
        let kind = self.schema.require_field(field)?;
        if !kind.accepts(&value) {
            return Err(WorkflowError::Validation(format!(
                "{}.{field} is {kind} and cannot hold {value:?}",
                self.schema.name
            ))
            .into());
        }
        self.fields.insert(field.to_string(), value);
        Ok(())
    }

    pub fn fields(&self) -> &BTreeMap<String, NativeValue> {
        &self.fields
    }

    /// Display title used in candidate lists.
    pub fn title(&self) -> String {
        match self.fields.get(&self.schema.title_field) {
            Some(NativeValue::Text(text)) if !text.trim().is_empty() => text.trim().to_string(),
            _ => format!("{} #{}", self.schema.name, self.id),
        }
    }
}
