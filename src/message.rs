//! Message schemas and message values.
//!
//! A [`MessageType`] is built once through [`MessageTypeBuilder`], which
//! rejects malformed schemas up front. [`Message`] values are type-checked on
//! every assignment, so the only thing left to verify before encoding is that
//! required fields are present ([`Message::check_initialized`]).
//!
//! Enum fields accept a value's name or number and store the resolved
//! [`EnumValue`](crate::EnumValue). Float fields only hold finite numbers.

use crate::types::{Decode, EnumType, FieldType, TypeMismatch, Value};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    name: String,
    number: u32,
    field_type: FieldType,
    kind: FieldKind,
    #[serde(skip)]
    default: Option<Value>,
}

impl FieldDescriptor {
    pub(crate) fn new(
        name: impl Into<String>,
        number: u32,
        field_type: FieldType,
        kind: FieldKind,
    ) -> Self {
        Self {
            name: name.into(),
            number,
            field_type,
            kind,
            default: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_repeated(&self) -> bool {
        self.kind == FieldKind::Repeated
    }

    /// What [`Message::get`] reports while the field is unset.
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

/// Schema of a message: a name and its ordered fields.
///
/// Types compare structurally, so two separately built but identical schemas
/// are interchangeable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageType {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageType {
    pub fn builder(name: impl Into<String>) -> MessageTypeBuilder {
        MessageTypeBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// The empty message used when a remote method declares no request type.
    pub fn void() -> Arc<MessageType> {
        Self::from_parts("VoidMessage", Vec::new())
    }

    /// Skips validation; only for schemas the crate itself defines.
    pub(crate) fn from_parts(name: &str, fields: Vec<FieldDescriptor>) -> Arc<MessageType> {
        Arc::new(Self {
            name: name.to_owned(),
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }
}

pub struct MessageTypeBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageTypeBuilder {
    /// Adds a field numbered one past the highest number used so far.
    pub fn field(self, name: impl Into<String>, field_type: FieldType, kind: FieldKind) -> Self {
        let number = self.fields.iter().map(|f| f.number).max().unwrap_or(0) + 1;
        self.numbered_field(number, name, field_type, kind)
    }

    pub fn numbered_field(
        mut self,
        number: u32,
        name: impl Into<String>,
        field_type: FieldType,
        kind: FieldKind,
    ) -> Self {
        self.fields
            .push(FieldDescriptor::new(name, number, field_type, kind));
        self
    }

    pub fn optional(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field(name, field_type, FieldKind::Optional)
    }

    pub fn required(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field(name, field_type, FieldKind::Required)
    }

    pub fn repeated(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field(name, field_type, FieldKind::Repeated)
    }

    /// An optional field that reads as `default` until assigned.
    pub fn defaulted(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        default: impl Into<Value>,
    ) -> Self {
        self = self.optional(name, field_type);
        if let Some(field) = self.fields.last_mut() {
            field.default = Some(default.into());
        }
        self
    }

    pub fn build(self) -> Result<Arc<MessageType>, SchemaError> {
        let Self { name, mut fields } = self;
        if !name.split('.').all(is_identifier) {
            return Err(SchemaError::InvalidTypeName(name));
        }
        for (index, field) in fields.iter().enumerate() {
            if !is_identifier(&field.name) {
                return Err(SchemaError::InvalidFieldName {
                    message: name,
                    field: field.name.clone(),
                });
            }
            if field.number == 0 {
                return Err(SchemaError::ZeroFieldNumber {
                    message: name,
                    field: field.name.clone(),
                });
            }
            let earlier = &fields[..index];
            if earlier.iter().any(|other| other.name == field.name) {
                return Err(SchemaError::DuplicateFieldName {
                    message: name,
                    field: field.name.clone(),
                });
            }
            if earlier.iter().any(|other| other.number == field.number) {
                return Err(SchemaError::DuplicateFieldNumber {
                    message: name,
                    number: field.number,
                });
            }
        }
        for field in &mut fields {
            if let Some(default) = field.default.take() {
                let default = assignable(&field.name, &field.field_type, default).map_err(
                    |source| SchemaError::InvalidDefault {
                        message: name.clone(),
                        field: field.name.clone(),
                        source,
                    },
                )?;
                field.default = Some(default);
            }
        }
        Ok(Arc::new(MessageType { name, fields }))
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("invalid message type name {0:?}")]
    InvalidTypeName(String),

    #[error("message {message}: invalid field name {field:?}")]
    InvalidFieldName { message: String, field: String },

    #[error("message {message}: field {field:?} must have a non-zero number")]
    ZeroFieldNumber { message: String, field: String },

    #[error("message {message}: duplicate field name {field:?}")]
    DuplicateFieldName { message: String, field: String },

    #[error("message {message}: field number {number} is used more than once")]
    DuplicateFieldNumber { message: String, number: u32 },

    #[error("message {message}: bad default: {source}")]
    InvalidDefault {
        message: String,
        field: String,
        source: ValidationError,
    },

    #[error("enum {enum_type}: invalid value name {value:?}")]
    InvalidEnumValueName { enum_type: String, value: String },

    #[error("enum {enum_type}: duplicate value name {value:?}")]
    DuplicateEnumValueName { enum_type: String, value: String },

    #[error("enum {enum_type}: value number {number} is used more than once")]
    DuplicateEnumValueNumber { enum_type: String, number: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message {message} has no field {field:?}")]
    UnknownField { message: String, field: String },

    #[error("field {field:?}: {source}")]
    WrongType { field: String, source: TypeMismatch },

    #[error("field {field:?} is repeated and must be assigned a list")]
    ExpectedList { field: String },

    #[error("field {field:?} is not repeated and cannot be assigned a list")]
    UnexpectedList { field: String },

    #[error("message {message} is missing required field {field:?}")]
    MissingRequired { message: String, field: String },

    #[error("field {field:?}: {value} is not a value of enum {enum_type}")]
    UnknownEnumValue {
        field: String,
        enum_type: String,
        value: String,
    },

    #[error("field {field:?} cannot hold a non-finite float")]
    NonFiniteFloat { field: String },
}

/// Resolves enum names and numbers, widens integers into floats and checks
/// the result against `field_type`.
fn assignable(
    field: &str,
    field_type: &FieldType,
    value: Value,
) -> Result<Value, ValidationError> {
    let unknown = |enum_type: &EnumType, value: String| ValidationError::UnknownEnumValue {
        field: field.to_owned(),
        enum_type: enum_type.name().to_owned(),
        value,
    };
    let value = match (field_type, value) {
        (FieldType::Enum(enum_type), Value::String(name)) => match enum_type.by_name(&name) {
            Some(resolved) => Value::Enum(resolved.clone()),
            None => return Err(unknown(enum_type, name)),
        },
        (FieldType::Enum(enum_type), Value::Integer(number)) => {
            match enum_type.by_number(number) {
                Some(resolved) => Value::Enum(resolved.clone()),
                None => return Err(unknown(enum_type, number.to_string())),
            }
        }
        (field_type, value) => field_type.coerce(value),
    };
    if matches!(value, Value::Float(x) if !x.is_finite()) {
        return Err(ValidationError::NonFiniteFloat {
            field: field.to_owned(),
        });
    }
    field_type
        .check(&value)
        .map_err(|source| ValidationError::WrongType {
            field: field.to_owned(),
            source,
        })?;
    Ok(value)
}

/// An instance of a [`MessageType`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    message_type: Arc<MessageType>,
    values: BTreeMap<String, Value>,
}

impl Message {
    pub fn new(message_type: &Arc<MessageType>) -> Self {
        Self {
            message_type: Arc::clone(message_type),
            values: BTreeMap::new(),
        }
    }

    pub fn message_type(&self) -> &Arc<MessageType> {
        &self.message_type
    }

    /// Assigns a field after checking it against the schema.
    ///
    /// Assigning an empty list to a repeated field leaves it unset.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), ValidationError> {
        let descriptor = self
            .message_type
            .field(field)
            .ok_or_else(|| ValidationError::UnknownField {
                message: self.message_type.name().to_owned(),
                field: field.to_owned(),
            })?;
        let field_type = descriptor.field_type();

        let value = match (descriptor.is_repeated(), value.into()) {
            (true, Value::List(items)) => {
                let items = items
                    .into_iter()
                    .map(|item| assignable(field, field_type, item))
                    .collect::<Result<Vec<_>, _>>()?;
                if items.is_empty() {
                    self.values.remove(field);
                    return Ok(());
                }
                Value::List(items)
            }
            (true, _) => {
                return Err(ValidationError::ExpectedList {
                    field: field.to_owned(),
                })
            }
            (false, Value::List(_)) => {
                return Err(ValidationError::UnexpectedList {
                    field: field.to_owned(),
                })
            }
            (false, value) => assignable(field, field_type, value)?,
        };
        self.values.insert(field.to_owned(), value);
        Ok(())
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self, ValidationError> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Inserts without checking; only for values the crate builds itself.
    pub(crate) fn insert_unchecked(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_owned(), value);
    }

    /// The assigned value, or the field's default while it is unset.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .get(field)
            .or_else(|| self.message_type.field(field)?.default())
    }

    /// Reads a field as a Rust value; `Ok(None)` when the field is unset and
    /// has no default.
    pub fn get_as<T: Decode>(&self, field: &str) -> Result<Option<T>, TypeMismatch> {
        self.get(field).map(T::decode).transpose()
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn clear(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    /// Assigned fields in schema order; defaults are not included.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldDescriptor, &Value)> {
        self.message_type
            .fields()
            .iter()
            .filter_map(|field| Some((field, self.values.get(field.name())?)))
    }

    pub fn check_initialized(&self) -> Result<(), ValidationError> {
        for field in self.message_type.fields() {
            match self.values.get(field.name()) {
                None if field.kind() == FieldKind::Required => {
                    return Err(ValidationError::MissingRequired {
                        message: self.message_type.name().to_owned(),
                        field: field.name().to_owned(),
                    })
                }
                Some(Value::Message(nested)) => nested.check_initialized()?,
                Some(Value::List(items)) => {
                    for item in items {
                        if let Value::Message(nested) = item {
                            nested.check_initialized()?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
