use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;

use super::value::{FieldValue, FileRef, FormValues};

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RecordError {
    #[error("missing value for field `{0}`")]
    Missing(String),
    #[error("field `{field}` expected {expected}, found {found}")]
    Mismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// A typed view of submitted form values. Usually derived with
/// `#[derive(FormRecord)]`; `#[form(rename = "...")]` maps a struct field to a
/// differently named form field.
pub trait FormRecord: Sized {
    fn from_values(values: &FormValues) -> Result<Self, RecordError>;
}

/// Conversion from a single field value.
pub trait FromFieldValue: Sized {
    const EXPECTED: &'static str;

    fn from_field_value(value: &FieldValue) -> Option<Self>;
}

/// Reads and converts the value of `name`. A missing entry is read as `Null`
/// so `Option` fields tolerate it.
pub fn record_field<T: FromFieldValue>(values: &FormValues, name: &str) -> Result<T, RecordError> {
    match values.get(name) {
        Some(value) => T::from_field_value(value).ok_or_else(|| RecordError::Mismatch {
            field: name.to_owned(),
            expected: T::EXPECTED,
            found: value.type_name(),
        }),
        None => T::from_field_value(&FieldValue::Null)
            .ok_or_else(|| RecordError::Missing(name.to_owned())),
    }
}

impl FromFieldValue for FieldValue {
    const EXPECTED: &'static str = "any value";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromFieldValue for String {
    const EXPECTED: &'static str = "text";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_text().map(str::to_owned)
    }
}

impl FromFieldValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }
}

impl FromFieldValue for Decimal {
    const EXPECTED: &'static str = "number";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_number()
    }
}

impl FromFieldValue for f64 {
    const EXPECTED: &'static str = "number";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_number().and_then(|number| number.to_f64())
    }
}

impl FromFieldValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value
            .as_number()
            .filter(|number| number.fract().is_zero())
            .and_then(|number| number.to_i64())
    }
}

impl FromFieldValue for FileRef {
    const EXPECTED: &'static str = "file";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::File(file) => Some(file.clone()),
            _ => None,
        }
    }
}

impl<T: FromFieldValue> FromFieldValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            value => T::from_field_value(value).map(Some),
        }
    }
}

impl<T: FromFieldValue> FromFieldValue for Vec<T> {
    const EXPECTED: &'static str = "list";

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value
            .as_list()?
            .iter()
            .map(T::from_field_value)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> FormValues {
        FormValues::from([
            ("age".to_owned(), FieldValue::Number(Decimal::from(25))),
            ("ratio".to_owned(), FieldValue::Number(Decimal::new(15, 1))),
            ("tags".to_owned(), FieldValue::list(["a", "b"])),
            ("avatar".to_owned(), FieldValue::Null),
        ])
    }

    #[test]
    fn converts_typed_fields() {
        let values = values();
        assert_eq!(record_field::<i64>(&values, "age"), Ok(25));
        assert_eq!(record_field::<f64>(&values, "ratio"), Ok(1.5));
        assert_eq!(
            record_field::<Vec<String>>(&values, "tags"),
            Ok(vec!["a".to_owned(), "b".to_owned()])
        );
        assert_eq!(record_field::<Option<FileRef>>(&values, "avatar"), Ok(None));
        assert_eq!(record_field::<Option<String>>(&values, "nickname"), Ok(None));
    }

    #[test]
    fn reports_missing_and_mismatched_fields() {
        let values = values();
        assert_eq!(
            record_field::<String>(&values, "nickname"),
            Err(RecordError::Missing("nickname".into()))
        );
        assert_eq!(
            record_field::<i64>(&values, "ratio"),
            Err(RecordError::Mismatch {
                field: "ratio".into(),
                expected: "integer",
                found: "number",
            })
        );
    }
}
