use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use futures::future::join_all;
use indexmap::IndexMap;
use regex::Regex;
use rust_decimal::Decimal;

use super::array::Cardinality;
use super::descriptor::{DateBound, FieldDescriptor, FieldKind, Pattern, parse_date_input};
use super::fields::FieldList;
use super::validation::{CustomValidation, FieldError, FieldErrorKind};
use super::value::{FieldValue, FileRef, FormValues};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is a valid regex")
});

/// Errors produced for one field: its own errors plus, for array fields, the
/// errors of individual items keyed by index.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldErrors {
    pub errors: Vec<FieldError>,
    pub items: BTreeMap<usize, Vec<FieldError>>,
}

impl FieldErrors {
    pub fn single(error: FieldError) -> Self {
        Self {
            errors: vec![error],
            items: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.items.values().all(Vec::is_empty)
    }

    pub fn first(&self) -> Option<&FieldError> {
        self.errors
            .first()
            .or_else(|| self.items.values().find_map(|errors| errors.first()))
    }

    fn into_outcome(self, value: FieldValue) -> FieldOutcome {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// The cast value on success.
pub type FieldOutcome = Result<FieldValue, FieldErrors>;

/// Result of validating a whole value map.
#[derive(Clone, Debug, Default)]
pub struct FormReport {
    /// Cast values for valid fields, the submitted value for invalid ones.
    pub values: FormValues,
    pub errors: IndexMap<String, FieldErrors>,
}

impl FormReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-field validators for a form, keyed and ordered like the field list.
#[derive(Clone, Debug, Default)]
pub struct FormSchema {
    fields: IndexMap<String, FieldSchema>,
}

impl FormSchema {
    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSchema)> {
        self.fields.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates every field concurrently and waits for all of them.
    pub async fn validate(&self, values: &FormValues) -> FormReport {
        let outcomes = join_all(self.fields.iter().map(|(name, schema)| {
            let value = values.get(name).cloned().unwrap_or_default();
            async move {
                let outcome = schema.validate(&value).await;
                (name, value, outcome)
            }
        }))
        .await;
        collect_report(outcomes)
    }

    /// Like [`FormSchema::validate`] without custom predicates.
    pub fn validate_sync(&self, values: &FormValues) -> FormReport {
        collect_report(self.fields.iter().map(|(name, schema)| {
            let value = values.get(name).cloned().unwrap_or_default();
            let outcome = schema.validate_sync(&value);
            (name, value, outcome)
        }))
    }
}

fn collect_report<'a>(
    outcomes: impl IntoIterator<Item = (&'a String, FieldValue, FieldOutcome)>,
) -> FormReport {
    let mut report = FormReport::default();
    for (name, value, outcome) in outcomes {
        match outcome {
            Ok(cast) => {
                report.values.insert(name.clone(), cast);
            }
            Err(errors) => {
                report.values.insert(name.clone(), value);
                report.errors.insert(name.clone(), errors);
            }
        }
    }
    report
}

/// Builds one validator per accepted field.
pub fn synthesize_schema(fields: &FieldList) -> FormSchema {
    FormSchema {
        fields: fields
            .iter()
            .map(|field| (field.name.clone(), FieldSchema::from_descriptor(field)))
            .collect(),
    }
}

/// Validator chain for one field: cast, declarative rules, then the custom
/// predicate.
#[derive(Clone, Debug)]
pub struct FieldSchema {
    name: String,
    label: String,
    disabled: bool,
    base: BaseType,
    rules: Vec<Rule>,
    item: Option<Box<FieldSchema>>,
    custom: Option<CustomCheck>,
}

#[derive(Clone, Debug)]
struct CustomCheck {
    validation: CustomValidation,
    message: String,
}

#[derive(Clone, Debug)]
enum BaseType {
    Text,
    Number,
    TextList,
    Checkbox {
        checked: FieldValue,
        unchecked: FieldValue,
    },
    File {
        multiple: bool,
    },
    List,
}

#[derive(Clone, Debug)]
enum Rule {
    Required(String),
    RequiredChecked { expected: FieldValue, message: String },
    MaxLength { max: usize, message: String },
    Pattern { pattern: Pattern, message: String },
    Email(String),
    Url(String),
    Min { min: Decimal, message: String },
    Max { max: Decimal, message: String },
    DateFormat(String),
    MinDate { bound: DateBound, message: String },
    MaxDate { bound: DateBound, message: String },
    MaxSelections { max: usize, message: String },
    Accept { accept: Vec<String>, message: String },
    MaxFileSize { max: u64, message: String },
    MaxFiles { max: usize, message: String },
    MinItems { min: usize, message: String },
    MaxItems { max: usize, message: String },
}

struct Checked {
    value: FieldValue,
    errors: Vec<FieldError>,
    cast_ok: bool,
}

impl FieldSchema {
    pub fn from_descriptor(field: &FieldDescriptor) -> Self {
        let label = field.display_label().to_owned();
        let required = field.required.then(|| {
            field
                .required_message
                .clone()
                .unwrap_or_else(|| format!("{label} is required"))
        });
        let mut rules = Vec::new();
        let mut item = None;

        let base = match &field.kind {
            FieldKind::Text(config) | FieldKind::Textarea(config) | FieldKind::Password(config) => {
                rules.extend(required.map(Rule::Required));
                push_max_length(&mut rules, &label, config.max_length, &config.max_length_message);
                push_pattern(&mut rules, &label, &config.pattern, &config.pattern_message);
                BaseType::Text
            }
            FieldKind::Email(config) => {
                rules.extend(required.map(Rule::Required));
                rules.push(Rule::Email(format!("{label} must be a valid email address")));
                push_pattern(&mut rules, &label, &config.pattern, &config.pattern_message);
                BaseType::Text
            }
            FieldKind::Url(config) => {
                rules.extend(required.map(Rule::Required));
                rules.push(Rule::Url(format!("{label} must be a valid URL")));
                push_max_length(&mut rules, &label, config.max_length, &config.max_length_message);
                push_pattern(&mut rules, &label, &config.pattern, &config.pattern_message);
                BaseType::Text
            }
            FieldKind::Number(config) => {
                rules.extend(required.map(Rule::Required));
                if field.custom_validation.is_none() {
                    if let Some(min) = config.min {
                        let message = config.min_message.clone().unwrap_or_else(|| {
                            format!("{label} must be at least {}", min.normalize())
                        });
                        rules.push(Rule::Min { min, message });
                    }
                    if let Some(max) = config.max {
                        let message = config.max_message.clone().unwrap_or_else(|| {
                            format!("{label} must be at most {}", max.normalize())
                        });
                        rules.push(Rule::Max { max, message });
                    }
                }
                BaseType::Number
            }
            FieldKind::Select(_) | FieldKind::SearchableSelect(_) => {
                rules.extend(required.map(Rule::Required));
                BaseType::Text
            }
            FieldKind::MultiSelect(config) => {
                rules.extend(required.map(Rule::Required));
                if let Some(max) = config.max_selections {
                    rules.push(Rule::MaxSelections {
                        max,
                        message: format!("{label} allows at most {max} selections"),
                    });
                }
                BaseType::TextList
            }
            FieldKind::Checkbox(config) => {
                if let Some(message) = required {
                    rules.push(Rule::RequiredChecked {
                        expected: config.checked(),
                        message,
                    });
                }
                BaseType::Checkbox {
                    checked: config.checked(),
                    unchecked: config.unchecked(),
                }
            }
            FieldKind::Date(config) => {
                rules.extend(required.map(Rule::Required));
                rules.push(Rule::DateFormat(format!("{label} must be a valid date")));
                if let Some(bound) = &config.min_date {
                    rules.push(Rule::MinDate {
                        message: format!("{label} must be on or after {}", bound.as_str()),
                        bound: bound.clone(),
                    });
                }
                if let Some(bound) = &config.max_date {
                    rules.push(Rule::MaxDate {
                        message: format!("{label} must be on or before {}", bound.as_str()),
                        bound: bound.clone(),
                    });
                }
                BaseType::Text
            }
            FieldKind::File(config) => {
                rules.extend(required.map(Rule::Required));
                if let Some(accept) = &config.accept {
                    rules.push(Rule::Accept {
                        accept: accept
                            .split(',')
                            .map(|entry| entry.trim().to_ascii_lowercase())
                            .filter(|entry| !entry.is_empty())
                            .collect(),
                        message: format!("{label} must be a file of type {accept}"),
                    });
                }
                if let Some(max) = config.max_size {
                    rules.push(Rule::MaxFileSize {
                        max,
                        message: format!("{label} must be at most {max} bytes"),
                    });
                }
                if let (true, Some(max)) = (config.multiple, config.max_files) {
                    rules.push(Rule::MaxFiles {
                        max,
                        message: format!("{label} allows at most {max} files"),
                    });
                }
                BaseType::File {
                    multiple: config.multiple,
                }
            }
            FieldKind::Array(config) => {
                let cardinality = Cardinality::from_descriptor(field, config);
                rules.extend(cardinality.required.map(Rule::Required));
                if let Some((min, message)) = cardinality.min {
                    rules.push(Rule::MinItems { min, message });
                }
                if let Some((max, message)) = cardinality.max {
                    rules.push(Rule::MaxItems { max, message });
                }
                let mut item_field = (*config.item).clone();
                if item_field.label.is_empty() {
                    item_field.label = label.clone();
                }
                item = Some(Box::new(FieldSchema::from_descriptor(&item_field)));
                BaseType::List
            }
        };

        let custom = field.custom_validation.clone().map(|validation| CustomCheck {
            validation,
            message: field
                .custom_validation_message
                .clone()
                .unwrap_or_else(|| format!("{label} is invalid")),
        });

        Self {
            name: field.name.clone(),
            label,
            disabled: field.disable_error,
            base,
            rules,
            item,
            custom,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn has_custom_validation(&self) -> bool {
        self.custom.is_some()
    }

    pub async fn validate(&self, value: &FieldValue) -> FieldOutcome {
        if self.disabled {
            return Ok(value.clone());
        }
        let checked = self.check_declarative(value);
        let mut report = FieldErrors {
            errors: checked.errors,
            items: BTreeMap::new(),
        };
        let mut value = checked.value;
        if !checked.cast_ok {
            return report.into_outcome(value);
        }

        if let (Some(item), FieldValue::List(elements)) = (self.item.as_deref(), &mut value) {
            let outcomes = join_all(elements.iter().map(|element| item.validate_item(element))).await;
            for (index, outcome) in outcomes.into_iter().enumerate() {
                match outcome {
                    Ok(cast) => elements[index] = cast,
                    Err(errors) => {
                        report.items.insert(index, errors);
                    }
                }
            }
        }

        if let Some(error) = self.run_custom(&value).await {
            report.errors.push(error);
        }
        report.into_outcome(value)
    }

    /// Runs every check except the custom predicate.
    pub fn validate_sync(&self, value: &FieldValue) -> FieldOutcome {
        if self.disabled {
            return Ok(value.clone());
        }
        let checked = self.check_declarative(value);
        let mut report = FieldErrors {
            errors: checked.errors,
            items: BTreeMap::new(),
        };
        let mut value = checked.value;
        if checked.cast_ok {
            if let (Some(item), FieldValue::List(elements)) = (self.item.as_deref(), &mut value) {
                for (index, element) in elements.iter_mut().enumerate() {
                    match item.validate_sync(element) {
                        Ok(cast) => *element = cast,
                        Err(errors) => {
                            report.items.insert(index, errors.errors);
                        }
                    }
                }
            }
        }
        report.into_outcome(value)
    }

    async fn validate_item(&self, value: &FieldValue) -> Result<FieldValue, Vec<FieldError>> {
        if self.disabled {
            return Ok(value.clone());
        }
        let Checked {
            value,
            mut errors,
            cast_ok,
        } = self.check_declarative(value);
        if cast_ok {
            if let Some(error) = self.run_custom(&value).await {
                errors.push(error);
            }
        }
        if errors.is_empty() { Ok(value) } else { Err(errors) }
    }

    fn check_declarative(&self, value: &FieldValue) -> Checked {
        let value = match self.cast(value) {
            Ok(value) => value,
            Err(error) => {
                return Checked {
                    value: value.clone(),
                    errors: vec![error],
                    cast_ok: false,
                };
            }
        };
        let mut errors = Vec::new();
        for rule in &self.rules {
            if let Err(error) = rule.check(&value) {
                let stop = rule.is_required();
                errors.push(error);
                if stop {
                    break;
                }
            }
        }
        Checked {
            value,
            errors,
            cast_ok: true,
        }
    }

    async fn run_custom(&self, value: &FieldValue) -> Option<FieldError> {
        let custom = self.custom.as_ref()?;
        if custom.validation.evaluate(&self.name, value.clone()).await {
            None
        } else {
            Some(FieldError::new(FieldErrorKind::Custom, custom.message.clone()))
        }
    }

    fn cast(&self, value: &FieldValue) -> Result<FieldValue, FieldError> {
        let type_error = |expected: &str| {
            FieldError::new(
                FieldErrorKind::Type,
                format!("{} must be {expected}", self.label),
            )
        };
        match (&self.base, value) {
            (BaseType::Text, FieldValue::Null) => Ok(FieldValue::Text(String::new())),
            (BaseType::Text, FieldValue::Text(_)) => Ok(value.clone()),
            (BaseType::Text, _) => Err(type_error("text")),

            (BaseType::Number, FieldValue::Null | FieldValue::Number(_)) => Ok(value.clone()),
            (BaseType::Number, FieldValue::Text(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(FieldValue::Null);
                }
                Decimal::from_str(text)
                    .or_else(|_| Decimal::from_scientific(text))
                    .map(FieldValue::Number)
                    .map_err(|_| type_error("a number"))
            }
            (BaseType::Number, _) => Err(type_error("a number")),

            (BaseType::TextList, FieldValue::Null) => Ok(FieldValue::List(Vec::new())),
            (BaseType::TextList, FieldValue::List(items))
                if items.iter().all(|item| item.as_text().is_some()) =>
            {
                Ok(value.clone())
            }
            (BaseType::TextList, _) => Err(type_error("a list of text values")),

            (BaseType::Checkbox { unchecked, .. }, FieldValue::Null) => Ok(unchecked.clone()),
            (BaseType::Checkbox { checked, unchecked }, value)
                if value == checked || value == unchecked =>
            {
                Ok(value.clone())
            }
            (BaseType::Checkbox { .. }, _) => Err(FieldError::new(
                FieldErrorKind::Type,
                format!("{} has an invalid value", self.label),
            )),

            (BaseType::File { multiple: false }, FieldValue::Null | FieldValue::File(_)) => {
                Ok(value.clone())
            }
            (BaseType::File { multiple: true }, FieldValue::Null) => Ok(FieldValue::List(Vec::new())),
            (BaseType::File { multiple: true }, FieldValue::List(items))
                if items.iter().all(|item| matches!(item, FieldValue::File(_))) =>
            {
                Ok(value.clone())
            }
            (BaseType::File { multiple: false }, _) => Err(type_error("a file")),
            (BaseType::File { multiple: true }, _) => Err(type_error("a list of files")),

            (BaseType::List, FieldValue::Null) => Ok(FieldValue::List(Vec::new())),
            (BaseType::List, FieldValue::List(_)) => Ok(value.clone()),
            (BaseType::List, _) => Err(type_error("a list")),
        }
    }
}

impl Rule {
    fn is_required(&self) -> bool {
        matches!(self, Rule::Required(_) | Rule::RequiredChecked { .. })
    }

    fn check(&self, value: &FieldValue) -> Result<(), FieldError> {
        let text = value.as_text().filter(|text| !text.is_empty());
        let files = || -> Vec<&FileRef> {
            match value {
                FieldValue::File(file) => vec![file],
                FieldValue::List(items) => items
                    .iter()
                    .filter_map(|item| match item {
                        FieldValue::File(file) => Some(file),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            }
        };
        let list_len = value.as_list().map_or(0, <[FieldValue]>::len);

        let (passed, kind, message) = match self {
            Rule::Required(message) => (!value.is_empty(), FieldErrorKind::Required, message),
            Rule::RequiredChecked { expected, message } => {
                (value == expected, FieldErrorKind::Required, message)
            }
            Rule::MaxLength { max, message } => (
                text.is_none_or(|text| text.chars().count() <= *max),
                FieldErrorKind::MaxLength,
                message,
            ),
            Rule::Pattern { pattern, message } => (
                text.is_none_or(|text| pattern.is_match(text)),
                FieldErrorKind::Pattern,
                message,
            ),
            Rule::Email(message) => (
                text.is_none_or(|text| EMAIL.is_match(text)),
                FieldErrorKind::Format,
                message,
            ),
            Rule::Url(message) => (text.is_none_or(is_url), FieldErrorKind::Format, message),
            Rule::Min { min, message } => (
                value.as_number().is_none_or(|number| number >= *min),
                FieldErrorKind::Min,
                message,
            ),
            Rule::Max { max, message } => (
                value.as_number().is_none_or(|number| number <= *max),
                FieldErrorKind::Max,
                message,
            ),
            Rule::DateFormat(message) => (
                text.is_none_or(|text| parse_date_input(text).is_some()),
                FieldErrorKind::Format,
                message,
            ),
            Rule::MinDate { bound, message } => (
                text.and_then(parse_date_input)
                    .is_none_or(|at| at >= bound.at()),
                FieldErrorKind::MinDate,
                message,
            ),
            Rule::MaxDate { bound, message } => (
                text.and_then(parse_date_input)
                    .is_none_or(|at| at <= bound.at()),
                FieldErrorKind::MaxDate,
                message,
            ),
            Rule::MaxSelections { max, message } => {
                (list_len <= *max, FieldErrorKind::MaxSelections, message)
            }
            Rule::Accept { accept, message } => (
                files().into_iter().all(|file| accepts(accept, file)),
                FieldErrorKind::FileType,
                message,
            ),
            Rule::MaxFileSize { max, message } => (
                files().into_iter().all(|file| file.size <= *max),
                FieldErrorKind::FileSize,
                message,
            ),
            Rule::MaxFiles { max, message } => (list_len <= *max, FieldErrorKind::MaxFiles, message),
            Rule::MinItems { min, message } => (list_len >= *min, FieldErrorKind::MinItems, message),
            Rule::MaxItems { max, message } => (list_len <= *max, FieldErrorKind::MaxItems, message),
        };

        if passed {
            Ok(())
        } else {
            Err(FieldError::new(kind, message.clone()))
        }
    }
}

fn push_max_length(rules: &mut Vec<Rule>, label: &str, max: Option<usize>, message: &Option<String>) {
    if let Some(max) = max {
        rules.push(Rule::MaxLength {
            max,
            message: message
                .clone()
                .unwrap_or_else(|| format!("{label} must be at most {max} characters")),
        });
    }
}

fn push_pattern(rules: &mut Vec<Rule>, label: &str, pattern: &Option<Pattern>, message: &Option<String>) {
    if let Some(pattern) = pattern {
        rules.push(Rule::Pattern {
            pattern: pattern.clone(),
            message: message
                .clone()
                .unwrap_or_else(|| format!("{label} format is invalid")),
        });
    }
}

fn is_url(text: &str) -> bool {
    url::Url::parse(text).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https" | "ftp") && url.host_str().is_some_and(|host| !host.is_empty())
    })
}

fn accepts(accept: &[String], file: &FileRef) -> bool {
    if accept.is_empty() {
        return true;
    }
    let extension = file.extension().map(str::to_ascii_lowercase);
    let mime = file.mime.as_deref().map(str::to_ascii_lowercase);
    accept.iter().any(|entry| {
        if let Some(wanted) = entry.strip_prefix('.') {
            extension.as_deref() == Some(wanted)
        } else if let Some(family) = entry.strip_suffix("/*") {
            mime.as_deref()
                .and_then(|mime| mime.split_once('/'))
                .is_some_and(|(kind, _)| kind == family)
        } else {
            mime.as_deref() == Some(entry.as_str())
        }
    })
}
