use crate::message::{is_identifier, Message, MessageType, SchemaError};
use serde::Serialize;
use std::{fmt, sync::Arc};
use thiserror::Error;

/// The declared type of a message field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Bytes,
    Enum(Arc<EnumType>),
    Message(Arc<MessageType>),
}

impl FieldType {
    pub fn name(&self) -> &str {
        use FieldType::*;
        match self {
            String => "String",
            Integer => "Integer",
            Float => "Float",
            Boolean => "Boolean",
            Bytes => "Bytes",
            Enum(enum_type) => enum_type.name(),
            Message(message_type) => message_type.name(),
        }
    }

    /// Checks that a single (non-list) value inhabits this type.
    pub fn check(&self, value: &Value) -> Result<(), TypeMismatch> {
        match (self, value) {
            (FieldType::String, Value::String(_))
            | (FieldType::Integer, Value::Integer(_))
            | (FieldType::Float, Value::Float(_))
            | (FieldType::Boolean, Value::Boolean(_))
            | (FieldType::Bytes, Value::Bytes(_)) => Ok(()),
            (FieldType::Enum(expected), Value::Enum(value))
                if expected.by_number(value.number()) == Some(value) =>
            {
                Ok(())
            }
            (FieldType::Message(expected), Value::Message(message))
                if message.message_type() == expected =>
            {
                Ok(())
            }
            _ => Err(TypeMismatch::new(self.name(), value.kind())),
        }
    }

    /// Widens integers assigned to float fields; every other value passes through.
    pub(crate) fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (FieldType::Float, Value::Integer(n)) => Value::Float(n as f64),
            (_, value) => value,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named set of symbolic values, each with a distinct number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumType {
    name: String,
    values: Vec<EnumValue>,
}

impl EnumType {
    pub fn builder(name: impl Into<String>) -> EnumTypeBuilder {
        EnumTypeBuilder {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    pub fn by_name(&self, name: &str) -> Option<&EnumValue> {
        self.values.iter().find(|value| value.name == name)
    }

    pub fn by_number(&self, number: i64) -> Option<&EnumValue> {
        self.values.iter().find(|value| value.number == number)
    }
}

pub struct EnumTypeBuilder {
    name: String,
    values: Vec<EnumValue>,
}

impl EnumTypeBuilder {
    pub fn value(mut self, name: impl Into<String>, number: i64) -> Self {
        self.values.push(EnumValue {
            name: name.into(),
            number,
        });
        self
    }

    pub fn build(self) -> Result<Arc<EnumType>, SchemaError> {
        let Self { name, values } = self;
        if !name.split('.').all(is_identifier) {
            return Err(SchemaError::InvalidTypeName(name));
        }
        for (index, value) in values.iter().enumerate() {
            if !is_identifier(&value.name) {
                return Err(SchemaError::InvalidEnumValueName {
                    enum_type: name,
                    value: value.name.clone(),
                });
            }
            let earlier = &values[..index];
            if earlier.iter().any(|other| other.name == value.name) {
                return Err(SchemaError::DuplicateEnumValueName {
                    enum_type: name,
                    value: value.name.clone(),
                });
            }
            if earlier.iter().any(|other| other.number == value.number) {
                return Err(SchemaError::DuplicateEnumValueNumber {
                    enum_type: name,
                    number: value.number,
                });
            }
        }
        Ok(Arc::new(EnumType { name, values }))
    }
}

/// One member of an [`EnumType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumValue {
    name: String,
    number: i64,
}

impl EnumValue {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> i64 {
        self.number
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A field value held by a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    Enum(EnumValue),
    Message(Message),
    List(Vec<Value>),
}

impl Value {
    pub fn kind(&self) -> &str {
        use Value::*;
        match self {
            String(_) => "String",
            Integer(_) => "Integer",
            Float(_) => "Float",
            Boolean(_) => "Boolean",
            Bytes(_) => "Bytes",
            Enum(_) => "Enum",
            Message(message) => message.message_type().name(),
            List(_) => "List",
        }
    }
}

/// Rust types with a fixed field type.
pub trait Typed {
    fn field_type() -> FieldType;
}

pub trait Encode {
    fn encode(val: Self) -> Value;
}

pub trait Decode: Sized {
    fn decode(val: &Value) -> Result<Self, TypeMismatch>;
}

macro_rules! impl_encode_decode {
    ($rust_type:ty, $field_type:expr, $encode_name:pat => $encode_expr:expr, $($decode_arm:tt)*) => {
        impl Typed for $rust_type {
            fn field_type() -> FieldType {
                $field_type
            }
        }

        impl Encode for $rust_type {
            fn encode($encode_name: $rust_type) -> Value {
                $encode_expr
            }
        }

        impl Decode for $rust_type {
            fn decode(val: &Value) -> Result<Self, TypeMismatch> {
                Ok(match val {
                    $($decode_arm)*,
                    _ => return Err(TypeMismatch::new(<Self as Typed>::field_type().name(), val.kind()))
                })
            }
        }

        impl From<$rust_type> for Value {
            fn from(val: $rust_type) -> Value {
                <$rust_type as Encode>::encode(val)
            }
        }
    };
}

impl_encode_decode!(String, FieldType::String, s => Value::String(s), Value::String(s) => s.clone());
impl_encode_decode!(i64, FieldType::Integer, n => Value::Integer(n), Value::Integer(n) => *n);
impl_encode_decode!(bool, FieldType::Boolean, b => Value::Boolean(b), Value::Boolean(b) => *b);
impl_encode_decode!(
    f64,
    FieldType::Float,
    x => Value::Float(x),
    Value::Float(x) => *x,
    Value::Integer(n) => *n as f64
);
impl_encode_decode!(Vec<u8>, FieldType::Bytes, b => Value::Bytes(b), Value::Bytes(b) => b.clone());

impl From<&str> for Value {
    fn from(val: &str) -> Value {
        Value::String(val.to_owned())
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Value {
        Value::Integer(i64::from(val))
    }
}

impl From<&[u8]> for Value {
    fn from(val: &[u8]) -> Value {
        Value::Bytes(val.to_vec())
    }
}

impl Encode for EnumValue {
    fn encode(val: Self) -> Value {
        Value::Enum(val)
    }
}

impl Decode for EnumValue {
    fn decode(val: &Value) -> Result<Self, TypeMismatch> {
        match val {
            Value::Enum(value) => Ok(value.clone()),
            _ => Err(TypeMismatch::new("Enum", val.kind())),
        }
    }
}

impl From<EnumValue> for Value {
    fn from(val: EnumValue) -> Value {
        Value::Enum(val)
    }
}

impl Encode for Message {
    fn encode(val: Self) -> Value {
        Value::Message(val)
    }
}

impl Decode for Message {
    fn decode(val: &Value) -> Result<Self, TypeMismatch> {
        match val {
            Value::Message(message) => Ok(message.clone()),
            _ => Err(TypeMismatch::new("Message", val.kind())),
        }
    }
}

impl From<Message> for Value {
    fn from(val: Message) -> Value {
        Value::Message(val)
    }
}

impl Encode for Value {
    fn encode(val: Self) -> Value {
        val
    }
}

impl Decode for Value {
    fn decode(val: &Value) -> Result<Self, TypeMismatch> {
        Ok(val.clone())
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(val: Self) -> Value {
        Value::List(val.into_iter().map(T::encode).collect())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(val: &Value) -> Result<Self, TypeMismatch> {
        match val {
            Value::List(items) => items.iter().map(T::decode).collect(),
            _ => Err(TypeMismatch::new("List", val.kind())),
        }
    }
}

impl<T: Encode> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Value {
        <Vec<T> as Encode>::encode(val)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("type mismatch: expected {expected}, found {found}")]
pub struct TypeMismatch {
    expected: String,
    found: String,
}

impl TypeMismatch {
    pub(crate) fn new(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn found(&self) -> &str {
        &self.found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::from("x"), FieldType::String)]
    #[case(Value::from(7), FieldType::Integer)]
    #[case(Value::from(2.5), FieldType::Float)]
    #[case(Value::from(true), FieldType::Boolean)]
    #[case(Value::from(&b"\xff"[..]), FieldType::Bytes)]
    fn primitives_check_against_their_own_type(#[case] value: Value, #[case] field_type: FieldType) {
        assert_eq!(field_type.check(&value), Ok(()));
    }

    #[test]
    fn mismatch_names_both_sides() {
        let err = FieldType::String.check(&Value::Integer(10)).unwrap_err();
        assert_eq!(err.expected(), "String");
        assert_eq!(err.found(), "Integer");
        assert_eq!(err.to_string(), "type mismatch: expected String, found Integer");
    }

    #[test]
    fn floats_decode_from_integers() {
        assert_eq!(f64::decode(&Value::Integer(10)), Ok(10.0));
        assert!(i64::decode(&Value::Float(1.5)).is_err());
    }

    #[test]
    fn coerce_only_widens_integers_for_float_fields() {
        assert_eq!(FieldType::Float.coerce(Value::Integer(3)), Value::Float(3.0));
        assert_eq!(FieldType::Integer.coerce(Value::Integer(3)), Value::Integer(3));
    }

    #[test]
    fn bytes_are_not_integer_lists() {
        let bytes = Value::from(b"a bytes".to_vec());
        assert_eq!(bytes.kind(), "Bytes");
        assert_eq!(Vec::<u8>::decode(&bytes), Ok(b"a bytes".to_vec()));
        assert!(Vec::<i64>::decode(&bytes).is_err());
    }

    fn color() -> Arc<EnumType> {
        EnumType::builder("Color")
            .value("RED", 1)
            .value("GREEN", 2)
            .value("BLUE", 3)
            .build()
            .unwrap()
    }

    #[test]
    fn enum_values_are_found_by_name_or_number() {
        let color = color();
        let green = color.by_name("GREEN").unwrap();
        assert_eq!(green.number(), 2);
        assert_eq!(color.by_number(2), Some(green));
        assert_eq!(color.by_name("PURPLE"), None);

        let field_type = FieldType::Enum(color.clone());
        assert_eq!(field_type.name(), "Color");
        assert_eq!(field_type.check(&Value::Enum(green.clone())), Ok(()));
    }

    #[test]
    fn foreign_enum_values_do_not_check() {
        let other = EnumType::builder("Other").value("GREEN", 7).build().unwrap();
        let foreign = other.by_name("GREEN").unwrap().clone();
        assert!(FieldType::Enum(color()).check(&Value::Enum(foreign)).is_err());
    }

    #[rstest]
    #[case::bad_name(
        EnumType::builder("Color").value("not a name", 1),
        SchemaError::InvalidEnumValueName { enum_type: "Color".into(), value: "not a name".into() }
    )]
    #[case::duplicate_name(
        EnumType::builder("Color").value("RED", 1).value("RED", 2),
        SchemaError::DuplicateEnumValueName { enum_type: "Color".into(), value: "RED".into() }
    )]
    #[case::duplicate_number(
        EnumType::builder("Color").value("RED", 1).value("GREEN", 1),
        SchemaError::DuplicateEnumValueNumber { enum_type: "Color".into(), number: 1 }
    )]
    fn malformed_enums_are_rejected(
        #[case] builder: EnumTypeBuilder,
        #[case] expected: SchemaError,
    ) {
        assert_eq!(builder.build().unwrap_err(), expected);
    }

    #[test]
    fn lists_decode_element_wise() {
        let value = Value::from(vec![1_i64, 2, 3]);
        assert_eq!(Vec::<i64>::decode(&value), Ok(vec![1, 2, 3]));

        let mixed = Value::List(vec![Value::Integer(1), Value::from("two")]);
        assert!(Vec::<i64>::decode(&mixed).is_err());
    }
}
