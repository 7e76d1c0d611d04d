mod array;
mod binding;
mod controller;
mod defaults;
mod descriptor;
mod fields;
mod record;
mod schema;
mod validation;
mod value;

#[cfg(test)]
mod tests;

pub use array::{
    add_item, can_add_item, can_remove_item, check_cardinality, count_valid_items, has_valid_items,
    item_hint, remove_item, update_item,
};
pub use binding::{FieldState, RenderError, RendererRegistry};
pub use calmform_derive::FormRecord;
pub use controller::{
    FieldMeta, FormController, FormError, FormId, FormOptions, FormResult, FormSnapshot,
    ResetHandler, RevalidateMode, SubmitHandler, SubmitOutcome, SubmitState, SubmitTicket,
    ValidationMode, ValidationTicket,
};
pub use defaults::{default_for_kind, default_value, derive_defaults};
pub use descriptor::{
    ArrayConfig, CheckboxConfig, DateBound, DateConfig, EmailConfig, FieldDescriptor, FieldKind,
    FieldKindTag, FileConfig, LabelPosition, MultiSelectConfig, NumberConfig, Pattern,
    SelectConfig, SelectOption, TextConfig, UrlConfig, parse_date_input,
};
pub use fields::{ConfigError, FieldList, RejectedField};
pub use record::{FormRecord, FromFieldValue, RecordError, record_field};
pub use schema::{FieldErrors, FieldOutcome, FieldSchema, FormReport, FormSchema, synthesize_schema};
pub use validation::{
    BoxedValidationFuture, CustomFault, CustomValidation, CustomVerdict, FieldError,
    FieldErrorKind,
};
pub use value::{FieldValue, FileRef, FormValues};
