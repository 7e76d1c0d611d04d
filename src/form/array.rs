use super::controller::{FormController, FormError, FormResult, read_lock, write_lock};
use super::defaults::default_value;
use super::descriptor::{ArrayConfig, FieldDescriptor, FieldKind};
use super::validation::{FieldError, FieldErrorKind};
use super::value::FieldValue;

/// Length constraints of an array field with their resolved messages.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Cardinality {
    pub(crate) required: Option<String>,
    pub(crate) min: Option<(usize, String)>,
    pub(crate) max: Option<(usize, String)>,
}

impl Cardinality {
    pub(crate) fn from_descriptor(field: &FieldDescriptor, config: &ArrayConfig) -> Self {
        let label = field.display_label();
        Self {
            required: field.required.then(|| {
                field
                    .required_message
                    .clone()
                    .unwrap_or_else(|| format!("{label} is required"))
            }),
            min: config.min_items.map(|min| {
                let message = config
                    .min_items_message
                    .clone()
                    .unwrap_or_else(|| format!("{label} must have at least {min} items"));
                (min, message)
            }),
            max: config.max_items.map(|max| {
                let message = config
                    .max_items_message
                    .clone()
                    .unwrap_or_else(|| format!("{label} must have at most {max} items"));
                (max, message)
            }),
        }
    }

    /// First violated constraint in the order required, min, max.
    pub(crate) fn check(&self, len: usize) -> Option<FieldError> {
        if let (Some(message), 0) = (&self.required, len) {
            return Some(FieldError::new(FieldErrorKind::Required, message.clone()));
        }
        if let Some((min, message)) = &self.min {
            if len < *min {
                return Some(FieldError::new(FieldErrorKind::MinItems, message.clone()));
            }
        }
        if let Some((max, message)) = &self.max {
            if len > *max {
                return Some(FieldError::new(FieldErrorKind::MaxItems, message.clone()));
            }
        }
        None
    }
}

pub fn check_cardinality(field: &FieldDescriptor, config: &ArrayConfig, len: usize) -> Option<FieldError> {
    Cardinality::from_descriptor(field, config).check(len)
}

pub fn can_add_item(config: &ArrayConfig, len: usize) -> bool {
    config.max_items.is_none_or(|max| len < max)
}

pub fn can_remove_item(config: &ArrayConfig, len: usize) -> bool {
    len > config.min_items.unwrap_or(0)
}

/// Appends the item default unless the array is full. Returns whether an
/// item was added.
pub fn add_item(items: &mut Vec<FieldValue>, config: &ArrayConfig) -> bool {
    if !can_add_item(config, items.len()) {
        return false;
    }
    items.push(default_value(&config.item));
    true
}

/// Removes the item at `index` unless the array is at its floor or the index
/// is out of range.
pub fn remove_item(items: &mut Vec<FieldValue>, config: &ArrayConfig, index: usize) -> bool {
    if index >= items.len() || !can_remove_item(config, items.len()) {
        return false;
    }
    items.remove(index);
    true
}

pub fn update_item(items: &mut [FieldValue], index: usize, value: FieldValue) -> bool {
    match items.get_mut(index) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

/// Whether an element carries content rather than an empty placeholder.
fn is_meaningful(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => false,
        FieldValue::Bool(flag) => *flag,
        FieldValue::Number(number) => !number.is_zero(),
        FieldValue::Text(text) => !text.trim().is_empty(),
        FieldValue::List(items) => !items.is_empty(),
        FieldValue::File(_) => true,
    }
}

pub fn count_valid_items(items: &[FieldValue]) -> usize {
    items.iter().filter(|item| is_meaningful(item)).count()
}

pub fn has_valid_items(items: &[FieldValue]) -> bool {
    items.iter().any(is_meaningful)
}

/// Display hint for arrays whose length is fine but whose items are still
/// blank placeholders.
pub fn item_hint(config: &ArrayConfig, items: &[FieldValue]) -> Option<String> {
    let min = config.min_items.filter(|min| *min > 0)?;
    (items.len() >= min && count_valid_items(items) < min)
        .then(|| format!("At least {min} items must have a value"))
}

impl FormController {
    /// Appends one default item. At capacity this is a no-op returning `false`.
    pub fn add_item(&self, name: &str) -> FormResult<bool> {
        self.edit_array(name, |items, config| add_item(items, config))
    }

    /// Removes the item at `index`. At the floor this is a no-op returning
    /// `false`.
    pub fn remove_item(&self, name: &str, index: usize) -> FormResult<bool> {
        self.edit_array(name, |items, config| -> FormResult<bool> {
            check_index(name, index, items.len())?;
            Ok(remove_item(items, config, index))
        })
        .and_then(|changed| changed)
    }

    pub fn update_item(&self, name: &str, index: usize, value: impl Into<FieldValue>) -> FormResult<()> {
        let value = value.into();
        self.edit_array(name, |items, _| -> FormResult<bool> {
            check_index(name, index, items.len())?;
            update_item(items, index, value);
            Ok(true)
        })
        .and_then(|changed| changed.map(|_| ()))
    }

    pub fn can_add_item(&self, name: &str) -> FormResult<bool> {
        let config = self.array_config(name)?;
        Ok(can_add_item(config, self.array_items(name)?.len()))
    }

    pub fn can_remove_item(&self, name: &str) -> FormResult<bool> {
        let config = self.array_config(name)?;
        Ok(can_remove_item(config, self.array_items(name)?.len()))
    }

    pub fn array_item_hint(&self, name: &str) -> FormResult<Option<String>> {
        let config = self.array_config(name)?;
        Ok(item_hint(config, &self.array_items(name)?))
    }

    fn array_config(&self, name: &str) -> FormResult<&ArrayConfig> {
        match self.fields.get(name).map(|field| &field.kind) {
            Some(FieldKind::Array(config)) => Ok(config),
            _ => Err(self.wrong_kind(name, "array")),
        }
    }

    fn array_items(&self, name: &str) -> FormResult<Vec<FieldValue>> {
        let state = read_lock(&self.state, "reading array items")?;
        Ok(match state.values.get(name) {
            Some(FieldValue::List(items)) => items.clone(),
            _ => Vec::new(),
        })
    }

    /// Applies `edit` to the array's items. Only a change marks the field
    /// dirty and triggers validation.
    fn edit_array<T>(
        &self,
        name: &str,
        edit: impl FnOnce(&mut Vec<FieldValue>, &ArrayConfig) -> T,
    ) -> FormResult<T>
    where
        T: EditOutcome,
    {
        let config = self.array_config(name)?;
        let (outcome, validate) = {
            let mut state = write_lock(&self.state, "editing array items")?;
            let mut items = match state.values.get(name) {
                Some(FieldValue::List(items)) => items.clone(),
                _ => Vec::new(),
            };
            let outcome = edit(&mut items, config);
            if !outcome.changed() {
                return Ok(outcome);
            }
            state.meta_mut(name)?.dirty = true;
            state.values.insert(name.to_owned(), FieldValue::List(items));
            (outcome, state.triggers_on_change(&self.options))
        };
        if validate {
            let _ = self.validate_field(name)?;
        }
        Ok(outcome)
    }
}

trait EditOutcome {
    fn changed(&self) -> bool;
}

impl EditOutcome for bool {
    fn changed(&self) -> bool {
        *self
    }
}

impl EditOutcome for FormResult<bool> {
    fn changed(&self) -> bool {
        matches!(self, Ok(true))
    }
}

fn check_index(name: &str, index: usize, len: usize) -> FormResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(FormError::ItemOutOfRange {
            name: name.to_owned(),
            index,
            len,
        })
    }
}
