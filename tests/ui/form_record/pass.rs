use calmform::form::{FieldValue, FormRecord, FormValues, RecordError};

#[derive(Debug, PartialEq, calmform::form::FormRecord)]
struct Contact {
    #[form(rename = "email-address")]
    email: String,
    newsletter: bool,
    nickname: Option<String>,
}

fn main() {
    let mut values = FormValues::new();
    values.insert("email-address".to_owned(), FieldValue::text("a@calm.ui"));
    values.insert("newsletter".to_owned(), FieldValue::Bool(true));

    let contact = Contact::from_values(&values).expect("record converts");
    assert_eq!(
        contact,
        Contact {
            email: "a@calm.ui".to_owned(),
            newsletter: true,
            nickname: None,
        }
    );

    values.shift_remove("email-address");
    assert_eq!(
        Contact::from_values(&values),
        Err(RecordError::Missing("email-address".to_owned()))
    );
}
