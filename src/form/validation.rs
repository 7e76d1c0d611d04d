use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::future::{self, Future};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use futures_timer::Delay;

use super::controller::{
    FieldMeta, FormController, FormError, FormResult, ValidationTicket, read_lock, write_lock,
};
use super::descriptor::FieldKind;
use super::schema::FieldErrors;
use super::value::FieldValue;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FieldErrorKind {
    /// The value has the wrong shape for the field kind.
    Type,
    Required,
    MaxLength,
    Pattern,
    /// Email, URL or date format.
    Format,
    Min,
    Max,
    MinDate,
    MaxDate,
    MaxSelections,
    FileType,
    FileSize,
    MaxFiles,
    MinItems,
    MaxItems,
    Custom,
    /// Set by the host through [`FormController::set_error`].
    Manual,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn manual(message: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Manual, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// What a custom predicate returned. `Bool(true)` and the empty string pass;
/// everything else fails.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CustomVerdict {
    Bool(bool),
    Text(String),
}

impl CustomVerdict {
    pub fn is_pass(&self) -> bool {
        match self {
            CustomVerdict::Bool(passed) => *passed,
            CustomVerdict::Text(text) => text.is_empty(),
        }
    }
}

impl From<bool> for CustomVerdict {
    fn from(value: bool) -> Self {
        CustomVerdict::Bool(value)
    }
}

impl From<String> for CustomVerdict {
    fn from(value: String) -> Self {
        CustomVerdict::Text(value)
    }
}

impl From<&str> for CustomVerdict {
    fn from(value: &str) -> Self {
        CustomVerdict::Text(value.to_owned())
    }
}

pub type CustomFault = Box<dyn std::error::Error + Send + Sync>;

pub type BoxedValidationFuture =
    Pin<Box<dyn Future<Output = Result<CustomVerdict, CustomFault>> + Send + 'static>>;

type CustomValidationFn = Arc<dyn Fn(FieldValue) -> BoxedValidationFuture + Send + Sync>;

/// A caller-supplied predicate attached to a field.
///
/// Faults never escape: an `Err`, a panic while calling the predicate, or a
/// panic while polling its future all count as a failed check.
#[derive(Clone)]
pub struct CustomValidation(CustomValidationFn);

impl CustomValidation {
    pub fn sync<F, R>(predicate: F) -> Self
    where
        F: Fn(&FieldValue) -> Result<R, CustomFault> + Send + Sync + 'static,
        R: Into<CustomVerdict>,
    {
        Self(Arc::new(move |value: FieldValue| -> BoxedValidationFuture {
            Box::pin(future::ready(predicate(&value).map(Into::<CustomVerdict>::into)))
        }))
    }

    pub fn future<F, Fut, R>(predicate: F) -> Self
    where
        F: Fn(FieldValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, CustomFault>> + Send + 'static,
        R: Into<CustomVerdict>,
    {
        Self(Arc::new(move |value: FieldValue| -> BoxedValidationFuture {
            let pending = predicate(value);
            Box::pin(async move { pending.await.map(Into::<CustomVerdict>::into) })
        }))
    }

    /// Returns whether the predicate passed.
    pub async fn evaluate(&self, field: &str, value: FieldValue) -> bool {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| (self.0)(value))) {
            Ok(pending) => AssertUnwindSafe(pending)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panic_fault(payload))),
            Err(payload) => Err(panic_fault(payload)),
        };
        match result {
            Ok(verdict) => verdict.is_pass(),
            Err(fault) => {
                tracing::warn!(field, %fault, "custom validation fault treated as failure");
                false
            }
        }
    }
}

impl Debug for CustomValidation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("CustomValidation(..)")
    }
}

fn keep_custom_errors(previous: &FieldMeta, errors: &mut FieldErrors, len: usize) {
    carry_custom(&previous.errors, &mut errors.errors);
    for (index, item) in previous.item_errors.range(..len) {
        carry_custom(item, errors.items.entry(*index).or_default());
    }
    errors.items.retain(|_, item| !item.is_empty());
}

/// Only a slot that passed the declarative rules keeps its custom failure,
/// matching the full chain where a declarative failure skips the predicate.
fn carry_custom(previous: &[FieldError], target: &mut Vec<FieldError>) {
    if target.is_empty() {
        target.extend(previous.iter().filter(|error| error.kind == FieldErrorKind::Custom).cloned());
    }
}

fn panic_fault(payload: Box<dyn Any + Send>) -> CustomFault {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    format!("custom validation panicked: {detail}").into()
}

impl FormController {
    /// Writes a value and marks the field dirty. Depending on the options the
    /// field is then validated without its custom predicate.
    pub fn set_value(&self, name: &str, value: impl Into<FieldValue>) -> FormResult<()> {
        if self.write_value(name, value.into())? {
            let _ = self.validate_field(name)?;
        }
        Ok(())
    }

    /// Like [`FormController::set_value`], running the full chain including
    /// the custom predicate.
    pub async fn set_value_async(&self, name: &str, value: impl Into<FieldValue>) -> FormResult<()> {
        if self.write_value(name, value.into())? {
            let _ = self.validate_field_async(name).await?;
        }
        Ok(())
    }

    /// Marks the field touched (blur).
    pub fn touch(&self, name: &str) -> FormResult<()> {
        if self.mark_touched(name)? {
            let _ = self.validate_field(name)?;
        }
        Ok(())
    }

    pub async fn touch_async(&self, name: &str) -> FormResult<()> {
        if self.mark_touched(name)? {
            let _ = self.validate_field_async(name).await?;
        }
        Ok(())
    }

    /// Flips a checkbox between its checked and unchecked encodings and
    /// returns the new value.
    pub fn toggle_checkbox(&self, name: &str) -> FormResult<FieldValue> {
        let Some(FieldKind::Checkbox(config)) = self.fields.get(name).map(|field| &field.kind) else {
            return Err(self.wrong_kind(name, "checkbox"));
        };
        let next = config.toggle(&self.get_value(name)?);
        self.set_value(name, next.clone())?;
        Ok(next)
    }

    /// Validates one field synchronously and stores the result. Returns
    /// whether the field is valid.
    ///
    /// Custom predicates do not run here, so a custom failure already on the
    /// field is kept until an async validation replaces it.
    pub fn validate_field(&self, name: &str) -> FormResult<bool> {
        let schema = self
            .schema
            .get(name)
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))?;
        let value = self.get_value(name)?;
        let mut errors = schema.validate_sync(&value).err().unwrap_or_default();

        let mut state = write_lock(&self.state, "writing field validation result")?;
        let len = value.as_list().map_or(0, <[FieldValue]>::len);
        keep_custom_errors(state.meta_mut(name)?, &mut errors, len);
        let valid = errors.is_empty();
        state.apply_field_errors(name, errors, &self.options)?;
        state.refresh_first_error();
        Ok(valid)
    }

    /// Validates one field with its custom predicate. A newer validation of
    /// the same field, or a reset, discards this result.
    pub async fn validate_field_async(&self, name: &str) -> FormResult<bool> {
        let schema = self
            .schema
            .get(name)
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))?;
        let ticket = {
            let mut state = write_lock(&self.state, "starting async field validation")?;
            let ticket = ValidationTicket(state.next_ticket());
            state.tickets.insert(name.to_owned(), ticket);
            state.meta_mut(name)?.validating = true;
            ticket
        };

        if !self.options.revalidate_debounce.is_zero() {
            Delay::new(self.options.revalidate_debounce).await;
            if !self.is_latest_ticket(name, ticket)? {
                return Ok(false);
            }
        }

        let value = self.get_value(name)?;
        let errors = schema.validate(&value).await.err().unwrap_or_default();
        self.finish_async_validation(name, ticket, errors)
    }

    /// Runs the full chain over every field and stores the errors without
    /// submitting. Returns whether the form is valid.
    pub async fn validate_form(&self) -> FormResult<bool> {
        let values = self.get_values()?;
        let report = self.schema.validate(&values).await;
        let mut state = write_lock(&self.state, "applying form validation result")?;
        let names = state.field_meta.keys().cloned().collect::<Vec<_>>();
        for name in names {
            let errors = report.errors.get(&name).cloned().unwrap_or_default();
            state.apply_field_errors(&name, errors, &self.options)?;
        }
        state.refresh_first_error();
        Ok(state.first_error.is_none())
    }

    pub(super) fn write_value(&self, name: &str, value: FieldValue) -> FormResult<bool> {
        let mut state = write_lock(&self.state, "writing field value")?;
        state.meta_mut(name)?.dirty = true;
        state.values.insert(name.to_owned(), value);
        Ok(state.triggers_on_change(&self.options))
    }

    fn mark_touched(&self, name: &str) -> FormResult<bool> {
        let mut state = write_lock(&self.state, "touching field")?;
        state.meta_mut(name)?.touched = true;
        Ok(state.triggers_on_blur(&self.options))
    }

    pub(super) fn wrong_kind(&self, name: &str, expected: &'static str) -> FormError {
        if self.fields.get(name).is_some() {
            FormError::WrongKind {
                name: name.to_owned(),
                expected,
            }
        } else {
            FormError::UnknownField(name.to_owned())
        }
    }

    fn is_latest_ticket(&self, name: &str, ticket: ValidationTicket) -> FormResult<bool> {
        Ok(read_lock(&self.state, "checking latest validation ticket")?
            .tickets
            .get(name)
            .copied()
            == Some(ticket))
    }

    fn finish_async_validation(
        &self,
        name: &str,
        ticket: ValidationTicket,
        errors: FieldErrors,
    ) -> FormResult<bool> {
        let mut state = write_lock(&self.state, "finishing async validation")?;
        if state.tickets.get(name).copied() != Some(ticket) {
            tracing::trace!(form = %self.id, field = name, "discarding superseded field validation");
            return Ok(false);
        }
        let valid = errors.is_empty();
        state.apply_field_errors(name, errors, &self.options)?;
        state.refresh_first_error();
        Ok(valid)
    }
}
