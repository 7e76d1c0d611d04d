use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;

use super::controller::{FormController, FormError, FormResult, read_lock};
use super::descriptor::{FieldDescriptor, FieldKindTag};
use super::fields::RejectedField;
use super::value::FieldValue;

/// What a renderer needs to draw one field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldState {
    pub value: FieldValue,
    /// Message to show next to the widget, already filtered for visibility.
    pub error: Option<String>,
    /// Whether the widget should use its invalid styling.
    pub invalid: bool,
    pub touched: bool,
    pub dirty: bool,
    pub item_errors: BTreeMap<usize, String>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no renderer registered for field type `{0}`")]
    UnsupportedKind(FieldKindTag),
    #[error("no renderer registered for rejected fields")]
    NoRejectedRenderer,
    #[error(transparent)]
    Form(#[from] FormError),
}

type FieldRenderer<Out> = Arc<dyn Fn(&FieldDescriptor, &FieldState) -> Out + Send + Sync>;
type RejectedRenderer<Out> = Arc<dyn Fn(&RejectedField) -> Out + Send + Sync>;

/// Render strategies keyed by field kind, supplied by the host.
pub struct RendererRegistry<Out> {
    renderers: HashMap<FieldKindTag, FieldRenderer<Out>>,
    rejected: Option<RejectedRenderer<Out>>,
}

impl<Out> Default for RendererRegistry<Out> {
    fn default() -> Self {
        Self {
            renderers: HashMap::new(),
            rejected: None,
        }
    }
}

impl<Out> RendererRegistry<Out> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        kind: FieldKindTag,
        render: impl Fn(&FieldDescriptor, &FieldState) -> Out + Send + Sync + 'static,
    ) -> Self {
        self.renderers.insert(kind, Arc::new(render));
        self
    }

    /// Strategy for descriptors the field list rejected; it receives the
    /// configuration error to show in place of the widget.
    pub fn on_rejected(mut self, render: impl Fn(&RejectedField) -> Out + Send + Sync + 'static) -> Self {
        self.rejected = Some(Arc::new(render));
        self
    }

    pub fn supports(&self, kind: FieldKindTag) -> bool {
        self.renderers.contains_key(&kind)
    }

    pub fn render(&self, field: &FieldDescriptor, state: &FieldState) -> Result<Out, RenderError> {
        let kind = field.tag();
        let render = self
            .renderers
            .get(&kind)
            .ok_or(RenderError::UnsupportedKind(kind))?;
        Ok(render(field, state))
    }

    pub fn render_rejected(&self, rejected: &RejectedField) -> Result<Out, RenderError> {
        let render = self.rejected.as_ref().ok_or(RenderError::NoRejectedRenderer)?;
        Ok(render(rejected))
    }

    /// Renders every declared field in declaration order, rejected ones
    /// included.
    pub fn render_form(&self, controller: &FormController) -> Result<Vec<Out>, RenderError> {
        let fields = controller.fields();
        let mut rendered = Vec::with_capacity(fields.len() + fields.rejected().len());
        let mut rejected = fields.rejected().iter().peekable();
        for (index, field) in fields.positioned() {
            while let Some(entry) = rejected.next_if(|entry| entry.index < index) {
                rendered.push(self.render_rejected(entry)?);
            }
            let state = controller.field_state(&field.name)?;
            rendered.push(self.render(field, &state)?);
        }
        for entry in rejected {
            rendered.push(self.render_rejected(entry)?);
        }
        Ok(rendered)
    }
}

impl FormController {
    pub fn field_state(&self, name: &str) -> FormResult<FieldState> {
        let field = self
            .fields
            .get(name)
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))?;
        let state = read_lock(&self.state, "reading field state")?;
        let meta = state
            .field_meta
            .get(name)
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))?;
        let visible = !field.disable_error && (meta.touched || state.submit_count > 0);
        let show_message = visible && !field.disable_error_message;

        Ok(FieldState {
            value: state.values.get(name).cloned().unwrap_or_default(),
            error: meta
                .errors
                .first()
                .filter(|_| show_message)
                .map(|error| error.message.clone()),
            invalid: visible && !meta.is_valid(),
            touched: meta.touched,
            dirty: meta.dirty,
            item_errors: if show_message {
                meta.item_errors
                    .iter()
                    .filter_map(|(index, errors)| {
                        errors.first().map(|error| (*index, error.message.clone()))
                    })
                    .collect()
            } else {
                BTreeMap::new()
            },
        })
    }

    /// The message a renderer should show for `name`, if any.
    pub fn field_error_for_display(&self, name: &str) -> FormResult<Option<String>> {
        Ok(self.field_state(name)?.error)
    }
}
