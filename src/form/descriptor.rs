use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::fields::ConfigError;
use super::validation::CustomValidation;
use super::value::{FieldValue, deserialize_decimal_option};

/// Declarative description of one form field.
///
/// The kind-specific payload lives in [`FieldKind`]; everything else applies to
/// every kind. Descriptors are built in code with the builder methods or loaded
/// from JSON through [`FieldList::from_json_str`](super::FieldList::from_json_str).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub required_message: Option<String>,
    /// Excludes the field from validation entirely, `required` included.
    #[serde(default)]
    pub disable_error: bool,
    /// Validation still runs; only the message is hidden from the renderer.
    #[serde(default)]
    pub disable_error_message: bool,
    #[serde(skip)]
    pub custom_validation: Option<CustomValidation>,
    #[serde(default)]
    pub custom_validation_message: Option<String>,
    #[serde(default)]
    pub default_value: Option<FieldValue>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FieldKind {
    Text(TextConfig),
    Textarea(TextConfig),
    Password(TextConfig),
    Email(EmailConfig),
    Url(UrlConfig),
    Number(NumberConfig),
    Select(SelectConfig),
    SearchableSelect(SelectConfig),
    MultiSelect(MultiSelectConfig),
    Checkbox(CheckboxConfig),
    Date(DateConfig),
    File(FileConfig),
    Array(ArrayConfig),
}

/// Payload-free mirror of [`FieldKind`], used as a registry key and as the
/// item type of array fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FieldKindTag {
    Text,
    Textarea,
    Password,
    Email,
    Url,
    Number,
    Select,
    SearchableSelect,
    MultiSelect,
    Checkbox,
    Date,
    File,
    Array,
}

impl FieldKindTag {
    pub const ALL: [FieldKindTag; 13] = [
        FieldKindTag::Text,
        FieldKindTag::Textarea,
        FieldKindTag::Password,
        FieldKindTag::Email,
        FieldKindTag::Url,
        FieldKindTag::Number,
        FieldKindTag::Select,
        FieldKindTag::SearchableSelect,
        FieldKindTag::MultiSelect,
        FieldKindTag::Checkbox,
        FieldKindTag::Date,
        FieldKindTag::File,
        FieldKindTag::Array,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            FieldKindTag::Text => "text",
            FieldKindTag::Textarea => "textarea",
            FieldKindTag::Password => "password",
            FieldKindTag::Email => "email",
            FieldKindTag::Url => "url",
            FieldKindTag::Number => "number",
            FieldKindTag::Select => "select",
            FieldKindTag::SearchableSelect => "searchable-select",
            FieldKindTag::MultiSelect => "multi-select",
            FieldKindTag::Checkbox => "checkbox",
            FieldKindTag::Date => "date",
            FieldKindTag::File => "file",
            FieldKindTag::Array => "array",
        }
    }
}

impl Display for FieldKindTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKindTag {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        FieldKindTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == value)
            .ok_or_else(|| ConfigError::UnsupportedType(value.to_owned()))
    }
}

impl FieldKind {
    pub fn tag(&self) -> FieldKindTag {
        match self {
            FieldKind::Text(_) => FieldKindTag::Text,
            FieldKind::Textarea(_) => FieldKindTag::Textarea,
            FieldKind::Password(_) => FieldKindTag::Password,
            FieldKind::Email(_) => FieldKindTag::Email,
            FieldKind::Url(_) => FieldKindTag::Url,
            FieldKind::Number(_) => FieldKindTag::Number,
            FieldKind::Select(_) => FieldKindTag::Select,
            FieldKind::SearchableSelect(_) => FieldKindTag::SearchableSelect,
            FieldKind::MultiSelect(_) => FieldKindTag::MultiSelect,
            FieldKind::Checkbox(_) => FieldKindTag::Checkbox,
            FieldKind::Date(_) => FieldKindTag::Date,
            FieldKind::File(_) => FieldKindTag::File,
            FieldKind::Array(_) => FieldKindTag::Array,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextConfig {
    #[serde(rename = "maxlength")]
    pub max_length: Option<usize>,
    #[serde(rename = "maxlengthMessage")]
    pub max_length_message: Option<String>,
    #[serde(rename = "regex")]
    pub pattern: Option<Pattern>,
    #[serde(rename = "regexMessage")]
    pub pattern_message: Option<String>,
}

impl TextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn pattern_message(mut self, message: impl Into<String>) -> Self {
        self.pattern_message = Some(message.into());
        self
    }
}

/// The email format check always runs; `pattern` is an additional constraint.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailConfig {
    #[serde(rename = "regex")]
    pub pattern: Option<Pattern>,
    #[serde(rename = "regexMessage")]
    pub pattern_message: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UrlConfig {
    #[serde(rename = "maxlength")]
    pub max_length: Option<usize>,
    #[serde(rename = "maxlengthMessage")]
    pub max_length_message: Option<String>,
    #[serde(rename = "regex")]
    pub pattern: Option<Pattern>,
    #[serde(rename = "regexMessage")]
    pub pattern_message: Option<String>,
}

/// Numeric bounds.
///
/// When the field also carries a custom validation, `min` and `max` are not
/// enforced by the schema; the custom predicate owns range checking so a
/// value is never reported twice.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NumberConfig {
    #[serde(deserialize_with = "deserialize_decimal_option")]
    pub min: Option<Decimal>,
    #[serde(deserialize_with = "deserialize_decimal_option")]
    pub max: Option<Decimal>,
    pub min_message: Option<String>,
    pub max_message: Option<String>,
}

impl NumberConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: impl Into<Decimal>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn max(mut self, max: impl Into<Decimal>) -> Self {
        self.max = Some(max.into());
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub disabled: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            disabled: false,
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectConfig {
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub clearable: bool,
}

impl SelectConfig {
    pub fn new(options: impl IntoIterator<Item = SelectOption>) -> Self {
        Self {
            options: options.into_iter().collect(),
            clearable: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSelectConfig {
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub max_selections: Option<usize>,
}

impl MultiSelectConfig {
    pub fn new(options: impl IntoIterator<Item = SelectOption>) -> Self {
        Self {
            options: options.into_iter().collect(),
            searchable: false,
            max_selections: None,
        }
    }

    pub fn max_selections(mut self, max: usize) -> Self {
        self.max_selections = Some(max);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelPosition {
    Left,
    #[default]
    Right,
}

/// Checkbox state encoding. Unset values fall back to `true` / `false`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckboxConfig {
    pub checked_value: Option<FieldValue>,
    pub unchecked_value: Option<FieldValue>,
    pub label_position: LabelPosition,
}

impl CheckboxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encoded(checked: impl Into<FieldValue>, unchecked: impl Into<FieldValue>) -> Self {
        Self {
            checked_value: Some(checked.into()),
            unchecked_value: Some(unchecked.into()),
            label_position: LabelPosition::default(),
        }
    }

    pub fn checked(&self) -> FieldValue {
        self.checked_value.clone().unwrap_or(FieldValue::Bool(true))
    }

    pub fn unchecked(&self) -> FieldValue {
        self.unchecked_value
            .clone()
            .unwrap_or(FieldValue::Bool(false))
    }

    pub fn is_checked(&self, value: &FieldValue) -> bool {
        *value == self.checked()
    }

    pub fn toggle(&self, current: &FieldValue) -> FieldValue {
        if self.is_checked(current) {
            self.unchecked()
        } else {
            self.checked()
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DateConfig {
    pub min_date: Option<DateBound>,
    pub max_date: Option<DateBound>,
    pub show_time: bool,
}

impl DateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_date(mut self, bound: DateBound) -> Self {
        self.min_date = Some(bound);
        self
    }

    pub fn max_date(mut self, bound: DateBound) -> Self {
        self.max_date = Some(bound);
        self
    }
}

/// `accept` uses the browser syntax: comma separated extensions (`.pdf`),
/// exact mime types (`application/pdf`) or wildcards (`image/*`).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileConfig {
    pub accept: Option<String>,
    pub multiple: bool,
    pub max_size: Option<u64>,
    pub max_files: Option<usize>,
}

impl FileConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn max_files(mut self, max: usize) -> Self {
        self.max_files = Some(max);
        self
    }
}

/// A list of homogeneous items. `item` describes one element; its `name` is
/// replaced by the array's name when the field list is built.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "RawArrayConfig")]
pub struct ArrayConfig {
    pub item: Box<FieldDescriptor>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub min_items_message: Option<String>,
    pub max_items_message: Option<String>,
}

impl ArrayConfig {
    pub fn new(item: impl Into<FieldKind>) -> Self {
        Self::of(FieldDescriptor::new("", item))
    }

    pub fn of(item: FieldDescriptor) -> Self {
        Self {
            item: Box::new(item),
            min_items: None,
            max_items: None,
            min_items_message: None,
            max_items_message: None,
        }
    }

    pub fn min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn item_type(&self) -> FieldKindTag {
        self.item.kind.tag()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArrayConfig {
    item_type: String,
    #[serde(default)]
    item_config: Map<String, Value>,
    #[serde(default)]
    min_items: Option<usize>,
    #[serde(default)]
    max_items: Option<usize>,
    #[serde(default)]
    min_items_message: Option<String>,
    #[serde(default)]
    max_items_message: Option<String>,
}

impl TryFrom<RawArrayConfig> for ArrayConfig {
    type Error = ConfigError;

    fn try_from(raw: RawArrayConfig) -> Result<Self, Self::Error> {
        let item_type = FieldKindTag::from_str(&raw.item_type)?;
        let mut item = raw.item_config;
        item.insert("type".into(), Value::String(item_type.as_str().into()));
        item.entry("name").or_insert_with(|| Value::String(String::new()));
        let item = FieldDescriptor::deserialize(Value::Object(item))
            .map_err(|error| ConfigError::Malformed(error.to_string()))?;
        Ok(Self {
            item: Box::new(item),
            min_items: raw.min_items,
            max_items: raw.max_items,
            min_items_message: raw.min_items_message,
            max_items_message: raw.max_items_message,
        })
    }
}

macro_rules! impl_kind_from_config {
    ($($config:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$config> for FieldKind {
                fn from(config: $config) -> Self {
                    FieldKind::$variant(config)
                }
            }
        )*
    };
}

impl_kind_from_config! {
    TextConfig => Text,
    EmailConfig => Email,
    UrlConfig => Url,
    NumberConfig => Number,
    SelectConfig => Select,
    MultiSelectConfig => MultiSelect,
    CheckboxConfig => Checkbox,
    DateConfig => Date,
    FileConfig => File,
    ArrayConfig => Array,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<FieldKind>) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            required: false,
            required_message: None,
            disable_error: false,
            disable_error_message: false,
            custom_validation: None,
            custom_validation_message: None,
            default_value: None,
            kind: kind.into(),
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text(TextConfig::default()))
    }

    pub fn textarea(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Textarea(TextConfig::default()))
    }

    pub fn password(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Password(TextConfig::default()))
    }

    pub fn email(name: impl Into<String>) -> Self {
        Self::new(name, EmailConfig::default())
    }

    pub fn url(name: impl Into<String>) -> Self {
        Self::new(name, UrlConfig::default())
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, NumberConfig::default())
    }

    pub fn select(name: impl Into<String>, options: impl IntoIterator<Item = SelectOption>) -> Self {
        Self::new(name, SelectConfig::new(options))
    }

    pub fn searchable_select(
        name: impl Into<String>,
        options: impl IntoIterator<Item = SelectOption>,
    ) -> Self {
        Self::new(name, FieldKind::SearchableSelect(SelectConfig::new(options)))
    }

    pub fn multi_select(
        name: impl Into<String>,
        options: impl IntoIterator<Item = SelectOption>,
    ) -> Self {
        Self::new(name, MultiSelectConfig::new(options))
    }

    pub fn checkbox(name: impl Into<String>) -> Self {
        Self::new(name, CheckboxConfig::default())
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, DateConfig::default())
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileConfig::default())
    }

    pub fn array(name: impl Into<String>, config: ArrayConfig) -> Self {
        Self::new(name, config)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn required_message(mut self, message: impl Into<String>) -> Self {
        self.required_message = Some(message.into());
        self
    }

    pub fn disable_error(mut self, disable: bool) -> Self {
        self.disable_error = disable;
        self
    }

    pub fn disable_error_message(mut self, disable: bool) -> Self {
        self.disable_error_message = disable;
        self
    }

    pub fn custom_validation(mut self, validation: CustomValidation) -> Self {
        self.custom_validation = Some(validation);
        self
    }

    pub fn custom_validation_message(mut self, message: impl Into<String>) -> Self {
        self.custom_validation_message = Some(message.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// The label shown in messages; falls back to the field name.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }

    pub fn tag(&self) -> FieldKindTag {
        self.kind.tag()
    }
}

/// A compiled regular expression attached to a text-like field.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|error| ConfigError::InvalidPattern {
                pattern: pattern.to_owned(),
                reason: error.to_string(),
            })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.0.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Pattern {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Pattern::new(&value)
    }
}

/// An inclusive date bound, parsed once from its ISO form.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct DateBound {
    source: String,
    at: NaiveDateTime,
}

impl DateBound {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        parse_date_input(value)
            .map(|at| Self {
                source: value.to_owned(),
                at,
            })
            .ok_or_else(|| ConfigError::InvalidDate(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn at(&self) -> NaiveDateTime {
        self.at
    }
}

impl TryFrom<String> for DateBound {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DateBound::parse(&value)
    }
}

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Accepts `YYYY-MM-DD`, local date-times with or without seconds, and RFC 3339.
pub fn parse_date_input(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.naive_utc());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
