use super::descriptor::{FieldDescriptor, FieldKind};
use super::fields::FieldList;
use super::value::{FieldValue, FormValues};

/// Initial value map for a form: one entry per accepted field, in field order.
pub fn derive_defaults(fields: &FieldList) -> FormValues {
    fields
        .iter()
        .map(|field| (field.name.clone(), default_value(field)))
        .collect()
}

pub fn default_value(field: &FieldDescriptor) -> FieldValue {
    default_for_kind(&field.kind, field.default_value.as_ref())
}

/// The "untouched" value of a kind. An explicit default always wins and is
/// trusted as-is; numbers and single files start as `Null`, never zero.
pub fn default_for_kind(kind: &FieldKind, explicit: Option<&FieldValue>) -> FieldValue {
    if let Some(value) = explicit {
        return value.clone();
    }
    match kind {
        FieldKind::Text(_)
        | FieldKind::Textarea(_)
        | FieldKind::Password(_)
        | FieldKind::Email(_)
        | FieldKind::Url(_)
        | FieldKind::Date(_)
        | FieldKind::Select(_)
        | FieldKind::SearchableSelect(_) => FieldValue::Text(String::new()),
        FieldKind::MultiSelect(_) => FieldValue::List(Vec::new()),
        FieldKind::Number(_) => FieldValue::Null,
        FieldKind::Checkbox(config) => config.unchecked(),
        FieldKind::File(config) if config.multiple => FieldValue::List(Vec::new()),
        FieldKind::File(_) => FieldValue::Null,
        FieldKind::Array(_) => FieldValue::List(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::descriptor::{ArrayConfig, CheckboxConfig, FileConfig, SelectOption};
    use crate::form::schema::synthesize_schema;

    fn sample_fields() -> FieldList {
        FieldList::new(vec![
            FieldDescriptor::text("name"),
            FieldDescriptor::number("age"),
            FieldDescriptor::multi_select("tags", [SelectOption::new("a", "A")]),
            FieldDescriptor::checkbox("newsletter"),
            FieldDescriptor::new("terms", CheckboxConfig::encoded("yes", "no")),
            FieldDescriptor::new("avatar", FileConfig::new()),
            FieldDescriptor::new("docs", FileConfig::new().multiple(true)),
            FieldDescriptor::array("links", ArrayConfig::new(FieldDescriptor::url("").kind)),
            FieldDescriptor::select("size", [SelectOption::new("m", "M")]).default_value("m"),
        ])
        .expect("fields")
    }

    #[test]
    fn each_kind_gets_its_empty_shape() {
        let defaults = derive_defaults(&sample_fields());
        assert_eq!(defaults["name"], FieldValue::text(""));
        assert_eq!(defaults["age"], FieldValue::Null);
        assert_eq!(defaults["tags"], FieldValue::List(Vec::new()));
        assert_eq!(defaults["newsletter"], FieldValue::Bool(false));
        assert_eq!(defaults["terms"], FieldValue::text("no"));
        assert_eq!(defaults["avatar"], FieldValue::Null);
        assert_eq!(defaults["docs"], FieldValue::List(Vec::new()));
        assert_eq!(defaults["links"], FieldValue::List(Vec::new()));
        assert_eq!(defaults["size"], FieldValue::text("m"));
    }

    #[test]
    fn defaults_and_schema_share_keys_in_order() {
        let fields = sample_fields();
        let defaults = derive_defaults(&fields);
        let schema = synthesize_schema(&fields);
        let names = fields.names().collect::<Vec<_>>();
        assert_eq!(defaults.keys().map(String::as_str).collect::<Vec<_>>(), names);
        assert_eq!(schema.keys().collect::<Vec<_>>(), names);
    }

    #[test]
    fn rejected_fields_have_no_default() {
        let fields = FieldList::new(vec![
            FieldDescriptor::text("ok"),
            FieldDescriptor::select("empty", Vec::<SelectOption>::new()),
        ])
        .expect("fields");
        assert_eq!(derive_defaults(&fields).len(), 1);
    }
}
