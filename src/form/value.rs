use std::fmt::{Display, Formatter};
use std::str::FromStr;

use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

/// Current values of a form, keyed by field name in declaration order.
pub type FormValues = IndexMap<String, FieldValue>;

/// A single field value.
///
/// `Null` stands for "absent": an untouched number field or a single-file
/// field with nothing picked. It converts to and from JSON `null`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(Decimal),
    Text(String),
    List(Vec<FieldValue>),
    File(FileRef),
}

/// A file picked by the user. The engine only sees its metadata.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mime: None,
        }
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn extension(&self) -> Option<&str> {
        self.name
            .rsplit_once('.')
            .map(|(_, extension)| extension)
            .filter(|extension| !extension.is_empty())
    }
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn list(values: impl IntoIterator<Item = impl Into<FieldValue>>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// Null, the empty string and the empty list all count as "no input".
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Bool(_) | FieldValue::Number(_) | FieldValue::File(_) => false,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FieldValue::Null | FieldValue::Bool(_) | FieldValue::Number(_) | FieldValue::Text(_)
        )
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Number(_) => "number",
            FieldValue::Text(_) => "text",
            FieldValue::List(_) => "list",
            FieldValue::File(_) => "file",
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Number(value) => write!(f, "{}", value.normalize()),
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            FieldValue::File(file) => f.write_str(&file.name),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<FileRef> for FieldValue {
    fn from(value: FileRef) -> Self {
        Self::File(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        Self::List(value)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Objects that do not describe a file (`name` + `size`) become `Null`.
impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(value) => FieldValue::Bool(value),
            Value::Number(number) => decimal_from_number(&number)
                .map_or_else(|| FieldValue::Text(number.to_string()), FieldValue::Number),
            Value::String(text) => FieldValue::Text(text),
            Value::Array(items) => FieldValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(object) => file_from_object(object).map_or(FieldValue::Null, FieldValue::File),
        }
    }
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(value) => Value::Bool(value),
            FieldValue::Number(number) => number_from_decimal(number),
            FieldValue::Text(text) => Value::String(text),
            FieldValue::List(items) => Value::Array(items.into_iter().map(Into::into).collect()),
            FieldValue::File(file) => {
                let mut object = Map::new();
                object.insert("name".into(), Value::String(file.name));
                object.insert("size".into(), Value::Number(file.size.into()));
                if let Some(mime) = file.mime {
                    object.insert("mime".into(), Value::String(mime));
                }
                Value::Object(object)
            }
        }
    }
}

fn file_from_object(object: Map<String, Value>) -> Option<FileRef> {
    let name = object.get("name")?.as_str()?.to_owned();
    let size = object.get("size")?.as_u64()?;
    let mime = object
        .get("mime")
        .and_then(Value::as_str)
        .map(str::to_owned);
    Some(FileRef { name, size, mime })
}

pub(crate) fn decimal_from_number(number: &Number) -> Option<Decimal> {
    if let Some(value) = number.as_i64() {
        return Some(Decimal::from(value));
    }
    if let Some(value) = number.as_u64() {
        return Some(Decimal::from(value));
    }
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Integers that fit `i64` and fractions whose shortest `f64` form reads back
/// as the same decimal are written as JSON numbers. Anything else is written
/// as its decimal text, which the number cast parses back exactly.
fn number_from_decimal(value: Decimal) -> Value {
    let value = value.normalize();
    if value.fract().is_zero() {
        if let Some(integer) = value.to_i64() {
            return Value::Number(integer.into());
        }
    }
    value
        .to_f64()
        .and_then(Number::from_f64)
        .filter(|number| decimal_from_number(number) == Some(value))
        .map_or_else(|| Value::String(value.to_string()), Value::Number)
}

/// `deserialize_with` helper for optional numeric bounds given as JSON numbers.
pub(crate) fn deserialize_decimal_option<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(number) = Option::<Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    decimal_from_number(&number)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("{number} is not a representable number")))
}
