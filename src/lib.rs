//! Declarative forms: build a validation schema and default values from a
//! list of field descriptors and drive them through a [`form::FormController`].

pub mod form;
pub mod prelude;

pub use form::{
    ConfigError, FieldDescriptor, FieldKind, FieldList, FieldValue, FormController, FormError,
    FormOptions, FormRecord, FormResult, FormValues, SubmitOutcome,
};
