pub use crate::form::{
    ArrayConfig, CheckboxConfig, CustomFault, CustomValidation, CustomVerdict, DateBound,
    DateConfig, FieldDescriptor, FieldError, FieldErrorKind, FieldKindTag, FieldList, FieldState,
    FieldValue, FileConfig, FileRef, FormController, FormError, FormOptions, FormRecord,
    FormResult, FormValues, MultiSelectConfig, NumberConfig, Pattern, RendererRegistry,
    RevalidateMode, SelectOption, SubmitOutcome, SubmitState, TextConfig, ValidationMode,
};
