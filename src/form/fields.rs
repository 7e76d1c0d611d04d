use std::collections::BTreeSet;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::descriptor::{FieldDescriptor, FieldKind, FieldKindTag};
use super::value::FieldValue;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("field descriptors must be a JSON array")]
    NotAList,
    #[error("invalid field list JSON: {0}")]
    Json(String),
    #[error("duplicate field name `{0}`")]
    DuplicateName(String),
    #[error("field name must not be empty")]
    EmptyName,
    #[error("unsupported field type `{0}`")]
    UnsupportedType(String),
    #[error("malformed field descriptor: {0}")]
    Malformed(String),
    #[error("field `{0}` needs at least one option")]
    MissingOptions(String),
    #[error("checkbox `{0}` needs distinct scalar checked and unchecked values")]
    CheckboxEncoding(String),
    #[error("default value of `{name}` does not fit a {kind} field")]
    InvalidDefault { name: String, kind: FieldKindTag },
    #[error("field `{0}` has a minimum greater than its maximum")]
    InvertedBounds(String),
    #[error("array field `{0}` cannot hold array items")]
    NestedArray(String),
    #[error("invalid regex `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid date `{0}`")]
    InvalidDate(String),
}

/// A descriptor that could not be accepted. The renderer shows `error` in
/// place of the widget; the rest of the form is unaffected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RejectedField {
    pub index: usize,
    pub name: Option<String>,
    pub error: ConfigError,
}

/// The validated set of descriptors a form is built from.
///
/// Names are unique across the whole list; a duplicate fails construction.
/// Any other configuration problem only rejects the offending field.
#[derive(Clone, Debug, Default)]
pub struct FieldList {
    fields: Vec<FieldDescriptor>,
    positions: Vec<usize>,
    rejected: Vec<RejectedField>,
}

impl FieldList {
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, ConfigError> {
        Self::from_entries(fields.into_iter().map(Ok).collect())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let value: Value =
            serde_json::from_str(json).map_err(|error| ConfigError::Json(error.to_string()))?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Array(items) = value else {
            return Err(ConfigError::NotAList);
        };
        let entries = items
            .into_iter()
            .map(|item| {
                let name = item.get("name").and_then(Value::as_str).map(str::to_owned);
                let type_error = item
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(|tag| FieldKindTag::from_str(tag).err());
                FieldDescriptor::deserialize(item).map_err(|error| {
                    let error = type_error
                        .unwrap_or_else(|| ConfigError::Malformed(error.to_string()));
                    (name, error)
                })
            })
            .collect();
        Self::from_entries(entries)
    }

    fn from_entries(
        entries: Vec<Result<FieldDescriptor, (Option<String>, ConfigError)>>,
    ) -> Result<Self, ConfigError> {
        let mut seen = BTreeSet::new();
        for name in entries.iter().filter_map(|entry| match entry {
            Ok(field) => Some(field.name.as_str()),
            Err((name, _)) => name.as_deref(),
        }) {
            if !name.is_empty() && !seen.insert(name) {
                return Err(ConfigError::DuplicateName(name.to_owned()));
            }
        }

        let mut list = FieldList::default();
        for (index, entry) in entries.into_iter().enumerate() {
            let checked = entry.and_then(|mut field| {
                adopt_item_name(&mut field);
                match check_descriptor(&field) {
                    Ok(()) => Ok(field),
                    Err(error) => Err((Some(field.name.clone()), error)),
                }
            });
            match checked {
                Ok(field) => {
                    list.fields.push(field);
                    list.positions.push(index);
                }
                Err((name, error)) => {
                    tracing::warn!(index, name = name.as_deref(), %error, "rejecting field descriptor");
                    list.rejected.push(RejectedField { index, name, error });
                }
            }
        }
        Ok(list)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn rejected(&self) -> &[RejectedField] {
        &self.rejected
    }

    /// Accepted fields paired with their index in the declared list.
    pub fn positioned(&self) -> impl Iterator<Item = (usize, &FieldDescriptor)> {
        self.positions.iter().copied().zip(self.fields.iter())
    }
}

fn adopt_item_name(field: &mut FieldDescriptor) {
    if let FieldKind::Array(config) = &mut field.kind {
        config.item.name = field.name.clone();
    }
}

fn check_descriptor(field: &FieldDescriptor) -> Result<(), ConfigError> {
    if field.name.is_empty() {
        return Err(ConfigError::EmptyName);
    }
    let name = || field.name.clone();
    let invalid_default = || ConfigError::InvalidDefault {
        name: field.name.clone(),
        kind: field.tag(),
    };
    let default = field.default_value.as_ref();

    match &field.kind {
        FieldKind::Text(_)
        | FieldKind::Textarea(_)
        | FieldKind::Password(_)
        | FieldKind::Email(_)
        | FieldKind::Url(_)
        | FieldKind::Date(_) => {
            if default.is_some_and(|value| value.as_text().is_none()) {
                return Err(invalid_default());
            }
        }
        FieldKind::Select(config) | FieldKind::SearchableSelect(config) => {
            if config.options.is_empty() {
                return Err(ConfigError::MissingOptions(name()));
            }
            if default.is_some_and(|value| value.as_text().is_none()) {
                return Err(invalid_default());
            }
        }
        FieldKind::MultiSelect(config) => {
            if config.options.is_empty() {
                return Err(ConfigError::MissingOptions(name()));
            }
            if default.is_some_and(|value| !is_text_list(value)) {
                return Err(invalid_default());
            }
        }
        FieldKind::Number(config) => {
            if let (Some(min), Some(max)) = (config.min, config.max) {
                if min > max {
                    return Err(ConfigError::InvertedBounds(name()));
                }
            }
            if default.is_some_and(|value| {
                !matches!(value, FieldValue::Number(_) | FieldValue::Null)
            }) {
                return Err(invalid_default());
            }
        }
        FieldKind::Checkbox(config) => {
            let checked = config.checked();
            let unchecked = config.unchecked();
            if checked == unchecked || !checked.is_scalar() || !unchecked.is_scalar() {
                return Err(ConfigError::CheckboxEncoding(name()));
            }
            if default.is_some_and(|value| *value != checked && *value != unchecked) {
                return Err(invalid_default());
            }
        }
        FieldKind::File(config) => {
            let fits = |value: &FieldValue| match value {
                FieldValue::List(items) => {
                    config.multiple && items.iter().all(|item| matches!(item, FieldValue::File(_)))
                }
                FieldValue::File(_) | FieldValue::Null => !config.multiple,
                _ => false,
            };
            if default.is_some_and(|value| !fits(value)) {
                return Err(invalid_default());
            }
        }
        FieldKind::Array(config) => {
            if let (Some(min), Some(max)) = (config.min_items, config.max_items) {
                if min > max {
                    return Err(ConfigError::InvertedBounds(name()));
                }
            }
            if matches!(config.item.kind, FieldKind::Array(_)) {
                return Err(ConfigError::NestedArray(name()));
            }
            if default.is_some_and(|value| value.as_list().is_none()) {
                return Err(invalid_default());
            }
            check_descriptor(&config.item)?;
        }
    }

    if let FieldKind::Date(config) = &field.kind {
        if let (Some(min), Some(max)) = (&config.min_date, &config.max_date) {
            if min.at() > max.at() {
                return Err(ConfigError::InvertedBounds(name()));
            }
        }
    }
    Ok(())
}

fn is_text_list(value: &FieldValue) -> bool {
    value
        .as_list()
        .is_some_and(|items| items.iter().all(|item| item.as_text().is_some()))
}
