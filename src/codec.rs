use crate::{
    message::{Message, MessageType, ValidationError},
    types::{FieldType, TypeMismatch, Value},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Number, Value as JsonValue};
use std::{fmt, sync::Arc};
use thiserror::Error;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Turns messages into bytes and back.
///
/// Transports, dispatchers and stubs only ever see this trait, so the wire
/// format can be swapped without touching them.
pub trait Codec: fmt::Debug + Send + Sync {
    /// The content type this codec writes.
    fn content_type(&self) -> &str;

    fn encode(&self, message: &Message) -> Result<Vec<u8>, EncodeError>;

    fn decode(&self, bytes: &[u8], message_type: &Arc<MessageType>)
        -> Result<Message, DecodeError>;
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("message is not initialized: {0}")]
    Uninitialized(#[source] ValidationError),

    #[error("serializing message: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed content: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected an object for message {0}")]
    NotAnObject(String),

    #[error("field {field:?} is not valid base64: {source}")]
    Base64 {
        field: String,
        source: base64::DecodeError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// JSON objects keyed by field name.
///
/// Enums are written by name and bytes as standard base64. Decoding accepts
/// integers for float fields and enum numbers for enum fields, treats `null`
/// and `[]` as unset, and decodes an empty or blank body as an empty message.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn message_to_json(message: &Message) -> JsonValue {
        let object: Map<String, JsonValue> = message
            .iter()
            .map(|(field, value)| (field.name().to_owned(), Self::value_to_json(value)))
            .collect();
        JsonValue::Object(object)
    }

    fn value_to_json(value: &Value) -> JsonValue {
        match value {
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Integer(n) => JsonValue::from(*n),
            // Messages only hold finite floats.
            Value::Float(x) => Number::from_f64(*x).map_or(JsonValue::Null, JsonValue::Number),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Bytes(bytes) => JsonValue::String(STANDARD.encode(bytes)),
            Value::Enum(value) => JsonValue::String(value.name().to_owned()),
            Value::Message(nested) => Self::message_to_json(nested),
            Value::List(items) => JsonValue::Array(items.iter().map(Self::value_to_json).collect()),
        }
    }

    fn message_from_json(
        message_type: &Arc<MessageType>,
        json: JsonValue,
    ) -> Result<Message, DecodeError> {
        let JsonValue::Object(object) = json else {
            return Err(DecodeError::NotAnObject(message_type.name().to_owned()));
        };
        let mut message = Message::new(message_type);
        for (name, json_value) in object {
            let field = message_type
                .field(&name)
                .ok_or_else(|| ValidationError::UnknownField {
                    message: message_type.name().to_owned(),
                    field: name.clone(),
                })?;
            if json_value.is_null() {
                continue;
            }
            let value = if field.is_repeated() {
                let JsonValue::Array(items) = json_value else {
                    return Err(ValidationError::ExpectedList { field: name }.into());
                };
                Value::List(
                    items
                        .into_iter()
                        .map(|item| Self::value_from_json(&name, field.field_type(), item))
                        .collect::<Result<_, _>>()?,
                )
            } else {
                Self::value_from_json(&name, field.field_type(), json_value)?
            };
            message.set(&name, value)?;
        }
        Ok(message)
    }

    fn value_from_json(
        field: &str,
        field_type: &FieldType,
        json: JsonValue,
    ) -> Result<Value, DecodeError> {
        let mismatch = |json: &JsonValue| -> DecodeError {
            ValidationError::WrongType {
                field: field.to_owned(),
                source: TypeMismatch::new(field_type.name(), json_kind(json)),
            }
            .into()
        };
        Ok(match (field_type, json) {
            (FieldType::String, JsonValue::String(s)) => Value::String(s),
            (FieldType::Integer, JsonValue::Number(n)) => match n.as_i64() {
                Some(n) => Value::Integer(n),
                None => return Err(mismatch(&JsonValue::Number(n))),
            },
            (FieldType::Float, JsonValue::Number(n)) => match n.as_f64() {
                Some(x) => Value::Float(x),
                None => return Err(mismatch(&JsonValue::Number(n))),
            },
            (FieldType::Boolean, JsonValue::Bool(b)) => Value::Boolean(b),
            (FieldType::Bytes, JsonValue::String(s)) => {
                Value::Bytes(STANDARD.decode(s).map_err(|source| DecodeError::Base64 {
                    field: field.to_owned(),
                    source,
                })?)
            }
            // Names and numbers are resolved against the enum by `Message::set`.
            (FieldType::Enum(_), JsonValue::String(name)) => Value::String(name),
            (FieldType::Enum(_), JsonValue::Number(n)) => match n.as_i64() {
                Some(n) => Value::Integer(n),
                None => return Err(mismatch(&JsonValue::Number(n))),
            },
            (FieldType::Message(nested), json @ JsonValue::Object(_)) => {
                Value::Message(Self::message_from_json(nested, json)?)
            }
            (_, json) => return Err(mismatch(&json)),
        })
    }
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_f64() => "float",
        JsonValue::Number(_) => "integer",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, EncodeError> {
        message
            .check_initialized()
            .map_err(EncodeError::Uninitialized)?;
        Ok(serde_json::to_vec(&Self::message_to_json(message))?)
    }

    fn decode(
        &self,
        bytes: &[u8],
        message_type: &Arc<MessageType>,
    ) -> Result<Message, DecodeError> {
        let message = if bytes.iter().all(u8::is_ascii_whitespace) {
            Message::new(message_type)
        } else {
            let json: JsonValue = serde_json::from_slice(bytes)?;
            Self::message_from_json(message_type, json)?
        };
        message.check_initialized()?;
        Ok(message)
    }
}
