use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use indexmap::IndexMap;
use thiserror::Error;

use super::array::Cardinality;
use super::defaults::derive_defaults;
use super::descriptor::FieldKind;
use super::fields::{ConfigError, FieldList};
use super::schema::{FieldErrors, FormReport, FormSchema, synthesize_schema};
use super::validation::FieldError;
use super::value::{FieldValue, FormValues};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form-{}", self.0)
    }
}

/// Identifies one asynchronous validation of a single field. Only the latest
/// ticket for a field may write its result.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

/// Identifies one `submit` call. Only the latest ticket may write errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubmitTicket(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

/// When edits trigger validation before the first submit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

/// When edits trigger validation after a submit has happened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevalidateMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
    pub revalidate_mode: RevalidateMode,
    pub validate_first_error_only: bool,
    /// Delay before an async revalidation runs; newer edits supersede it.
    pub revalidate_debounce: Duration,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_mode: ValidationMode::OnSubmit,
            revalidate_mode: RevalidateMode::OnChange,
            validate_first_error_only: false,
            revalidate_debounce: Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldMeta {
    /// Set on the first edit; only `reset` clears it.
    pub dirty: bool,
    pub touched: bool,
    pub validating: bool,
    pub errors: Vec<FieldError>,
    pub item_errors: BTreeMap<usize, Vec<FieldError>>,
}

impl FieldMeta {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.item_errors.values().all(Vec::is_empty)
    }

    fn clear_errors(&mut self) {
        self.errors.clear();
        self.item_errors.clear();
        self.validating = false;
    }
}

#[derive(Clone, Debug)]
pub struct FormSnapshot {
    pub values: FormValues,
    pub submit_state: SubmitState,
    pub submit_count: u32,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub first_error: Option<String>,
    pub field_meta: IndexMap<String, FieldMeta>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Validation passed and the submit callback received these values.
    Submitted(FormValues),
    /// At least one field failed; the callback was not invoked.
    Invalid,
    /// A newer `submit` or a `reset` started before this one finished.
    Superseded,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("form submit is already in progress")]
    AlreadySubmitting,
    #[error("submit handler panicked")]
    SubmitHandlerPanicked,
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("field `{name}` is not a {expected} field")]
    WrongKind { name: String, expected: &'static str },
    #[error("item {index} is out of range for field `{name}` with {len} items")]
    ItemOutOfRange { name: String, index: usize, len: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type FormResult<T> = Result<T, FormError>;

pub type SubmitHandler = Arc<dyn Fn(&FormValues) + Send + Sync>;
pub type ResetHandler = Arc<dyn Fn() + Send + Sync>;

pub(super) struct FormState {
    pub(super) values: FormValues,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
    pub(super) field_meta: IndexMap<String, FieldMeta>,
    pub(super) tickets: BTreeMap<String, ValidationTicket>,
    pub(super) submit_ticket: SubmitTicket,
    pub(super) ticket_seq: u64,
    pub(super) first_error: Option<String>,
}

impl FormState {
    fn fresh(fields: &FieldList) -> Self {
        Self {
            values: derive_defaults(fields),
            submit_state: SubmitState::Idle,
            submit_count: 0,
            field_meta: fields
                .names()
                .map(|name| (name.to_owned(), FieldMeta::default()))
                .collect(),
            tickets: BTreeMap::new(),
            submit_ticket: SubmitTicket(0),
            ticket_seq: 0,
            first_error: None,
        }
    }

    pub(super) fn meta_mut(&mut self, name: &str) -> FormResult<&mut FieldMeta> {
        self.field_meta
            .get_mut(name)
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))
    }

    pub(super) fn next_ticket(&mut self) -> u64 {
        self.ticket_seq += 1;
        self.ticket_seq
    }

    pub(super) fn refresh_first_error(&mut self) {
        self.first_error = self
            .field_meta
            .iter()
            .find_map(|(name, meta)| (!meta.is_valid()).then(|| name.clone()));
    }

    /// Edits validate according to `validate_mode` until the first submit,
    /// then according to `revalidate_mode`.
    pub(super) fn triggers_on_change(&self, options: &FormOptions) -> bool {
        if self.submit_count == 0 {
            options.validate_mode == ValidationMode::OnChange
        } else {
            options.revalidate_mode == RevalidateMode::OnChange
        }
    }

    pub(super) fn triggers_on_blur(&self, options: &FormOptions) -> bool {
        if self.submit_count == 0 {
            options.validate_mode == ValidationMode::OnBlur
        } else {
            options.revalidate_mode == RevalidateMode::OnBlur
        }
    }

    pub(super) fn apply_field_errors(
        &mut self,
        name: &str,
        errors: FieldErrors,
        options: &FormOptions,
    ) -> FormResult<()> {
        let meta = self.meta_mut(name)?;
        meta.validating = false;
        meta.errors = errors.errors;
        meta.item_errors = errors.items;
        if options.validate_first_error_only {
            meta.errors.truncate(1);
            for item in meta.item_errors.values_mut() {
                item.truncate(1);
            }
        }
        Ok(())
    }

    fn apply_report(&mut self, report: &FormReport, options: &FormOptions) -> FormResult<()> {
        let names = self.field_meta.keys().cloned().collect::<Vec<_>>();
        for name in names {
            let errors = report.errors.get(&name).cloned().unwrap_or_default();
            self.apply_field_errors(&name, errors, options)?;
        }
        self.refresh_first_error();
        Ok(())
    }
}

/// Live form session built from a field list.
///
/// Cloning yields another handle to the same session. All mutation goes
/// through the methods on this type.
#[derive(Clone)]
pub struct FormController {
    pub(super) id: FormId,
    pub(super) options: FormOptions,
    pub(super) fields: Arc<FieldList>,
    pub(super) schema: Arc<FormSchema>,
    pub(super) state: Arc<RwLock<FormState>>,
    submit_handler: Option<SubmitHandler>,
    reset_handler: Option<ResetHandler>,
}

impl FormController {
    pub fn new(fields: FieldList, options: FormOptions) -> Self {
        let schema = synthesize_schema(&fields);
        let state = FormState::fresh(&fields);
        Self {
            id: FormId::next(),
            options,
            fields: Arc::new(fields),
            schema: Arc::new(schema),
            state: Arc::new(RwLock::new(state)),
            submit_handler: None,
            reset_handler: None,
        }
    }

    /// Called with the validated values after a successful submit.
    pub fn on_submit(mut self, handler: impl Fn(&FormValues) + Send + Sync + 'static) -> Self {
        self.submit_handler = Some(Arc::new(handler));
        self
    }

    pub fn on_reset(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.reset_handler = Some(Arc::new(handler));
        self
    }

    pub fn form_id(&self) -> FormId {
        self.id
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn fields(&self) -> &FieldList {
        &self.fields
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    /// Validates every field, re-checks array cardinality, and hands the cast
    /// values to the submit callback only when nothing failed.
    pub async fn submit(&self) -> FormResult<SubmitOutcome> {
        let (ticket, values) = {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if state.submit_state == SubmitState::Submitting {
                return Err(FormError::AlreadySubmitting);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
            state.submit_ticket = SubmitTicket(state.next_ticket());
            for meta in state.field_meta.values_mut() {
                meta.validating = true;
            }
            (state.submit_ticket, state.values.clone())
        };
        tracing::debug!(form = %self.id, ticket = ticket.0, "validating form for submit");

        let report = self.schema.validate(&values).await;

        let submitted = {
            let mut state = write_lock(&self.state, "applying submit validation")?;
            if state.submit_ticket != ticket {
                tracing::trace!(form = %self.id, ticket = ticket.0, "discarding superseded submit");
                return Ok(SubmitOutcome::Superseded);
            }
            state.apply_report(&report, &self.options)?;
            self.recheck_array_cardinality(&mut state, &values)?;
            if state.first_error.is_some() {
                transition_submit_state(&mut state, SubmitState::Failed)?;
                tracing::debug!(
                    form = %self.id,
                    first_error = state.first_error.as_deref(),
                    "submit blocked by validation errors"
                );
                return Ok(SubmitOutcome::Invalid);
            }
            transition_submit_state(&mut state, SubmitState::Submitting)?;
            report.values
        };

        let handled = match &self.submit_handler {
            Some(handler) => panic::catch_unwind(AssertUnwindSafe(|| handler(&submitted))),
            None => Ok(()),
        };

        let mut state = write_lock(&self.state, "completing submit")?;
        if handled.is_err() {
            if state.submit_ticket == ticket {
                transition_submit_state(&mut state, SubmitState::Failed)?;
            }
            tracing::warn!(form = %self.id, ticket = ticket.0, "submit handler panicked");
            return Err(FormError::SubmitHandlerPanicked);
        }
        if state.submit_ticket == ticket {
            transition_submit_state(&mut state, SubmitState::Succeeded)?;
        }
        tracing::debug!(form = %self.id, ticket = ticket.0, "form submitted");
        Ok(SubmitOutcome::Submitted(submitted))
    }

    /// Drives [`FormController::submit`] to completion on the current thread.
    pub fn submit_blocking(&self) -> FormResult<SubmitOutcome> {
        futures::executor::block_on(self.submit())
    }

    /// Runs `submit` and maps a successful outcome through `f`, mirroring a
    /// host that wants the values without registering a callback.
    pub async fn submit_with<F, Fut>(&self, f: F) -> FormResult<Option<Fut::Output>>
    where
        F: FnOnce(FormValues) -> Fut,
        Fut: Future,
    {
        match self.submit().await? {
            SubmitOutcome::Submitted(values) => Ok(Some(f(values).await)),
            SubmitOutcome::Invalid | SubmitOutcome::Superseded => Ok(None),
        }
    }

    /// Restores freshly derived defaults, clears every error and flag, and
    /// invalidates in-flight validations.
    pub fn reset(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "resetting form")?;
            let ticket = state.next_ticket();
            let mut fresh = FormState::fresh(&self.fields);
            fresh.ticket_seq = ticket;
            fresh.submit_ticket = SubmitTicket(ticket);
            *state = fresh;
        }
        tracing::debug!(form = %self.id, "form reset");
        if let Some(handler) = &self.reset_handler {
            handler();
        }
        Ok(())
    }

    pub fn get_values(&self) -> FormResult<FormValues> {
        Ok(read_lock(&self.state, "reading form values")?.values.clone())
    }

    pub fn get_value(&self, name: &str) -> FormResult<FieldValue> {
        read_lock(&self.state, "reading field value")?
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))
    }

    pub fn clear_errors(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "clearing all field errors")?;
        for meta in state.field_meta.values_mut() {
            meta.clear_errors();
        }
        state.first_error = None;
        Ok(())
    }

    pub fn clear_field_errors(&self, name: &str) -> FormResult<()> {
        let mut state = write_lock(&self.state, "clearing field errors")?;
        state.meta_mut(name)?.clear_errors();
        state.refresh_first_error();
        Ok(())
    }

    /// Replaces the field's errors with `error`.
    pub fn set_error(&self, name: &str, error: FieldError) -> FormResult<()> {
        let mut state = write_lock(&self.state, "setting field error")?;
        let meta = state.meta_mut(name)?;
        meta.errors = vec![error];
        meta.validating = false;
        state.refresh_first_error();
        Ok(())
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        Ok(FormSnapshot {
            values: state.values.clone(),
            submit_state: state.submit_state,
            submit_count: state.submit_count,
            is_dirty: state.field_meta.values().any(|meta| meta.dirty),
            is_valid: state.field_meta.values().all(FieldMeta::is_valid),
            first_error: state.first_error.clone(),
            field_meta: state.field_meta.clone(),
        })
    }

    pub fn field_meta(&self, name: &str) -> FormResult<FieldMeta> {
        read_lock(&self.state, "reading field meta")?
            .field_meta
            .get(name)
            .cloned()
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))
    }

    /// Array length errors are written directly for every array field the
    /// schema pass left without a field-level error.
    fn recheck_array_cardinality(&self, state: &mut FormState, values: &FormValues) -> FormResult<()> {
        for field in self.fields.iter() {
            let FieldKind::Array(config) = &field.kind else {
                continue;
            };
            if field.disable_error {
                continue;
            }
            let len = values
                .get(&field.name)
                .and_then(FieldValue::as_list)
                .map_or(0, <[FieldValue]>::len);
            let Some(error) = Cardinality::from_descriptor(field, config).check(len) else {
                continue;
            };
            let meta = state.meta_mut(&field.name)?;
            if meta.errors.is_empty() {
                tracing::debug!(form = %self.id, field = %field.name, "array cardinality re-check failed");
                meta.errors.push(error);
            }
        }
        state.refresh_first_error();
        Ok(())
    }
}

pub(super) fn transition_submit_state(state: &mut FormState, next: SubmitState) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
