use super::*;
use futures::executor::block_on;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn form(fields: Vec<FieldDescriptor>) -> FormController {
    FormController::new(FieldList::new(fields).expect("valid fields"), FormOptions::default())
}

fn form_with(fields: Vec<FieldDescriptor>, options: FormOptions) -> FormController {
    FormController::new(FieldList::new(fields).expect("valid fields"), options)
}

fn error_messages(controller: &FormController, name: &str) -> Vec<String> {
    controller
        .field_meta(name)
        .expect("field meta")
        .errors
        .into_iter()
        .map(|error| error.message)
        .collect()
}

fn age_field() -> FieldDescriptor {
    FieldDescriptor::new("age", NumberConfig::new().min(18).max(100)).required(true)
}

#[test]
fn number_field_reports_required_then_bounds_then_submits_number() {
    let submitted = Arc::new(AtomicUsize::new(0));
    let controller = {
        let submitted = submitted.clone();
        form(vec![age_field()]).on_submit(move |_values| {
            submitted.fetch_add(1, Ordering::SeqCst);
        })
    };

    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);
    assert_eq!(error_messages(&controller, "age"), vec!["age is required"]);

    controller.set_value("age", "15").expect("set age");
    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);
    assert_eq!(error_messages(&controller, "age"), vec!["age must be at least 18"]);
    assert_eq!(submitted.load(Ordering::SeqCst), 0);

    controller.set_value("age", "25").expect("set age");
    let SubmitOutcome::Submitted(values) = controller.submit_blocking().expect("submit") else {
        panic!("valid form must submit");
    };
    assert_eq!(values["age"], FieldValue::Number(Decimal::from(25)));
    assert_eq!(submitted.load(Ordering::SeqCst), 1);
    assert_eq!(
        controller.snapshot().expect("snapshot").submit_state,
        SubmitState::Succeeded
    );
}

#[test]
fn email_field_rejects_bad_format() {
    let controller = form(vec![FieldDescriptor::email("email").required(true)]);

    controller.set_value("email", "not-an-email").expect("set email");
    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);
    assert_eq!(
        controller.field_meta("email").expect("meta").errors[0].kind,
        FieldErrorKind::Format
    );

    controller.set_value("email", "a@b.com").expect("set email");
    let SubmitOutcome::Submitted(values) = controller.submit_blocking().expect("submit") else {
        panic!("valid email must submit");
    };
    assert_eq!(values["email"], FieldValue::text("a@b.com"));
}

#[test]
fn array_field_is_capped_and_rechecked_on_submit() {
    let controller = form(vec![FieldDescriptor::array(
        "items",
        ArrayConfig::new(TextConfig::new()).min_items(1).max_items(2),
    )]);

    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);
    assert_eq!(
        error_messages(&controller, "items"),
        vec!["items must have at least 1 items"]
    );

    assert!(controller.add_item("items").expect("add"));
    assert!(controller.add_item("items").expect("add"));
    assert!(!controller.can_add_item("items").expect("capacity"));
    assert!(!controller.add_item("items").expect("add at capacity"));
    assert_eq!(
        controller.get_value("items").expect("items"),
        FieldValue::list(["", ""])
    );

    assert!(controller.remove_item("items", 1).expect("remove"));
    assert!(!controller.remove_item("items", 0).expect("remove at floor"));
    assert!(controller.add_item("items").expect("add after remove"));

    controller.update_item("items", 0, "first").expect("update");
    controller.update_item("items", 1, "second").expect("update");
    let SubmitOutcome::Submitted(values) = controller.submit_blocking().expect("submit") else {
        panic!("filled array must submit");
    };
    assert_eq!(values["items"], FieldValue::list(["first", "second"]));
}

#[test]
fn externally_grown_array_reports_max_items() {
    let controller = form(vec![FieldDescriptor::array(
        "items",
        ArrayConfig::new(TextConfig::new()).max_items(1),
    )]);
    controller
        .set_value("items", FieldValue::list(["a", "b"]))
        .expect("set items");

    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);
    assert_eq!(
        controller.field_meta("items").expect("meta").errors[0].kind,
        FieldErrorKind::MaxItems
    );
}

#[test]
fn array_item_errors_are_reported_by_index() {
    let controller = form(vec![
        FieldDescriptor::array("contacts", ArrayConfig::new(EmailConfig::default())).label("Contacts"),
    ]);
    controller.add_item("contacts").expect("add");
    controller.add_item("contacts").expect("add");
    controller.update_item("contacts", 0, "ok@example.com").expect("update");
    controller.update_item("contacts", 1, "nope").expect("update");

    assert!(matches!(
        controller.update_item("contacts", 7, "x"),
        Err(FormError::ItemOutOfRange { index: 7, len: 2, .. })
    ));
    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);

    let meta = controller.field_meta("contacts").expect("meta");
    assert!(meta.errors.is_empty());
    assert_eq!(
        meta.item_errors.keys().copied().collect::<Vec<_>>(),
        vec![1]
    );
    assert_eq!(
        meta.item_errors[&1][0].message,
        "Contacts must be a valid email address"
    );
}

#[test]
fn checkbox_encoding_drives_required_check() {
    let controller = form(vec![
        FieldDescriptor::new("terms", CheckboxConfig::encoded("yes", "no")).required(true),
    ]);
    assert_eq!(controller.get_value("terms").expect("terms"), FieldValue::text("no"));
    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);
    assert_eq!(
        controller.field_meta("terms").expect("meta").errors[0].kind,
        FieldErrorKind::Required
    );

    assert_eq!(controller.toggle_checkbox("terms").expect("toggle"), FieldValue::text("yes"));
    let SubmitOutcome::Submitted(values) = controller.submit_blocking().expect("submit") else {
        panic!("checked box must submit");
    };
    assert_eq!(values["terms"], FieldValue::text("yes"));
}

#[test]
fn checkbox_toggle_alternates_between_encodings() {
    let controller = form(vec![FieldDescriptor::new(
        "plan",
        CheckboxConfig::encoded(1, 0),
    )]);
    let toggles = [(); 3].map(|_| controller.toggle_checkbox("plan").expect("toggle"));
    assert_eq!(
        toggles,
        [FieldValue::from(1), FieldValue::from(0), FieldValue::from(1)]
    );
    assert!(matches!(
        controller.toggle_checkbox("missing"),
        Err(FormError::UnknownField(_))
    ));
}

#[test]
fn untouched_required_fields_all_fail() {
    let controller = form(vec![
        FieldDescriptor::text("name").required(true),
        FieldDescriptor::number("age").required(true),
        FieldDescriptor::multi_select("tags", [SelectOption::new("a", "A")]).required(true),
        FieldDescriptor::checkbox("agree").required(true),
        FieldDescriptor::new("avatar", FileConfig::new()).required(true),
        FieldDescriptor::date("start").required(true),
        FieldDescriptor::text("prefilled").required(true).default_value("set"),
    ]);

    assert!(!block_on(controller.validate_form()).expect("validate"));
    let snapshot = controller.snapshot().expect("snapshot");
    let failing = snapshot
        .field_meta
        .iter()
        .filter(|(_, meta)| !meta.is_valid())
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(failing, vec!["name", "age", "tags", "agree", "avatar", "start"]);
    assert_eq!(snapshot.first_error.as_deref(), Some("name"));
}

#[test]
fn disabled_errors_never_block_submit() {
    let controller = form(vec![
        FieldDescriptor::new("age", NumberConfig::new().min(18))
            .required(true)
            .disable_error(true)
            .custom_validation(CustomValidation::sync(|_| Ok(false))),
    ]);
    controller.set_value("age", "not a number").expect("set");
    let SubmitOutcome::Submitted(values) = controller.submit_blocking().expect("submit") else {
        panic!("disabled field must not block submit");
    };
    assert_eq!(values["age"], FieldValue::text("not a number"));
}

#[test]
fn faulty_custom_validation_fails_only_its_field() {
    let controller = form(vec![
        FieldDescriptor::text("username")
            .custom_validation(CustomValidation::sync(|_| -> Result<bool, CustomFault> {
                panic!("lookup table missing")
            }))
            .custom_validation_message("Username could not be checked"),
        FieldDescriptor::text("nickname")
            .custom_validation(CustomValidation::future(|_| async {
                Err::<bool, CustomFault>("service unavailable".into())
            })),
        FieldDescriptor::email("email").required(true),
    ]);
    controller.set_value("email", "broken").expect("set");

    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);
    assert_eq!(
        error_messages(&controller, "username"),
        vec!["Username could not be checked"]
    );
    assert_eq!(error_messages(&controller, "nickname"), vec!["nickname is invalid"]);
    assert_eq!(
        controller.field_meta("email").expect("meta").errors[0].kind,
        FieldErrorKind::Format
    );
}

#[test]
fn text_verdicts_pass_only_when_empty() {
    let controller = form(vec![FieldDescriptor::text("code").custom_validation(
        CustomValidation::sync(|value: &FieldValue| {
            Ok::<_, CustomFault>(if value.as_text() == Some("42") { "" } else { "wrong code" })
        }),
    )]);
    controller.set_value("code", "7").expect("set");
    assert!(!block_on(controller.validate_form()).expect("validate"));
    controller.set_value("code", "42").expect("set");
    assert!(block_on(controller.validate_form()).expect("validate"));
}

#[test]
fn validation_mode_controls_when_errors_appear() {
    let fields = || vec![FieldDescriptor::text("name").required(true)];

    let on_change = form_with(
        fields(),
        FormOptions {
            validate_mode: ValidationMode::OnChange,
            ..FormOptions::default()
        },
    );
    on_change.set_value("name", "").expect("set");
    assert_eq!(error_messages(&on_change, "name"), vec!["name is required"]);

    let on_blur = form_with(
        fields(),
        FormOptions {
            validate_mode: ValidationMode::OnBlur,
            ..FormOptions::default()
        },
    );
    on_blur.set_value("name", "").expect("set");
    assert!(error_messages(&on_blur, "name").is_empty());
    on_blur.touch("name").expect("touch");
    assert_eq!(error_messages(&on_blur, "name"), vec!["name is required"]);

    let on_submit = form(fields());
    on_submit.set_value("name", "").expect("set");
    on_submit.touch("name").expect("touch");
    assert!(error_messages(&on_submit, "name").is_empty());
    assert_eq!(on_submit.submit_blocking().expect("submit"), SubmitOutcome::Invalid);

    on_submit.set_value("name", "Ada").expect("revalidates after submit");
    assert!(error_messages(&on_submit, "name").is_empty());
    on_submit.set_value("name", "").expect("revalidates after submit");
    assert_eq!(error_messages(&on_submit, "name"), vec!["name is required"]);
}

#[test]
fn first_error_only_truncates_field_errors() {
    let controller = form_with(
        vec![FieldDescriptor::new(
            "code",
            TextConfig::new()
                .max_length(2)
                .pattern(Pattern::new("^[0-9]+$").expect("pattern")),
        )],
        FormOptions {
            validate_mode: ValidationMode::OnChange,
            validate_first_error_only: true,
            ..FormOptions::default()
        },
    );
    controller.set_value("code", "abc").expect("set");
    assert_eq!(
        controller.field_meta("code").expect("meta").errors.len(),
        1
    );
}

#[test]
fn reset_restores_defaults_and_notifies_host() {
    let resets = Arc::new(AtomicUsize::new(0));
    let controller = {
        let resets = resets.clone();
        form(vec![
            FieldDescriptor::text("name").default_value("Ada"),
            age_field(),
        ])
        .on_reset(move || {
            resets.fetch_add(1, Ordering::SeqCst);
        })
    };

    controller.set_value("name", "Grace").expect("set");
    controller.touch("age").expect("touch");
    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);
    assert!(controller.snapshot().expect("snapshot").is_dirty);

    controller.reset().expect("reset");
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.values["name"], FieldValue::text("Ada"));
    assert_eq!(snapshot.values["age"], FieldValue::Null);
    assert!(!snapshot.is_dirty);
    assert!(snapshot.is_valid);
    assert_eq!(snapshot.submit_count, 0);
    assert_eq!(snapshot.submit_state, SubmitState::Idle);
    assert!(snapshot.field_meta.values().all(|meta| !meta.touched));
    assert_eq!(resets.load(Ordering::SeqCst), 1);
}

#[test]
fn dirty_flag_survives_reverting_the_value() {
    let controller = form(vec![FieldDescriptor::text("name")]);
    controller.set_value("name", "x").expect("set");
    controller.set_value("name", "").expect("set");
    assert!(controller.field_meta("name").expect("meta").dirty);
}

#[test]
fn manual_errors_can_be_set_and_cleared() {
    let controller = form(vec![FieldDescriptor::text("name"), FieldDescriptor::text("city")]);
    controller
        .set_error("city", FieldError::manual("City is not served"))
        .expect("set error");
    let snapshot = controller.snapshot().expect("snapshot");
    assert!(!snapshot.is_valid);
    assert_eq!(snapshot.first_error.as_deref(), Some("city"));

    controller.clear_field_errors("city").expect("clear");
    assert!(controller.snapshot().expect("snapshot").first_error.is_none());

    controller
        .set_error("name", FieldError::manual("Taken"))
        .expect("set error");
    controller.clear_errors().expect("clear all");
    assert!(controller.snapshot().expect("snapshot").is_valid);
    assert!(matches!(
        controller.set_error("ghost", FieldError::manual("x")),
        Err(FormError::UnknownField(_))
    ));
}

#[test]
fn wrong_kind_operations_are_rejected() {
    let controller = form(vec![FieldDescriptor::text("name")]);
    assert!(matches!(
        controller.add_item("name"),
        Err(FormError::WrongKind { expected: "array", .. })
    ));
    assert!(matches!(
        controller.toggle_checkbox("name"),
        Err(FormError::WrongKind { expected: "checkbox", .. })
    ));
    assert!(matches!(
        controller.set_value("ghost", "x"),
        Err(FormError::UnknownField(_))
    ));
}

#[test]
fn reset_supersedes_in_flight_submit() {
    let submitted = Arc::new(AtomicUsize::new(0));
    let controller = {
        let submitted = submitted.clone();
        form(vec![FieldDescriptor::text("name").custom_validation(
            CustomValidation::future(|_| async {
                thread::sleep(Duration::from_millis(80));
                Ok::<_, CustomFault>(true)
            }),
        )])
        .on_submit(move |_values| {
            submitted.fetch_add(1, Ordering::SeqCst);
        })
    };

    let pending = {
        let controller = controller.clone();
        thread::spawn(move || controller.submit_blocking().expect("submit"))
    };
    thread::sleep(Duration::from_millis(20));
    controller.reset().expect("reset");

    assert_eq!(pending.join().expect("submit thread"), SubmitOutcome::Superseded);
    assert_eq!(submitted.load(Ordering::SeqCst), 0);
    assert_eq!(
        controller.snapshot().expect("snapshot").submit_state,
        SubmitState::Idle
    );
}

#[test]
fn newer_submit_wins_over_slow_one() {
    let controller = form(vec![FieldDescriptor::text("name").custom_validation(
        CustomValidation::future(|value: FieldValue| async move {
            if value.as_text() == Some("slow") {
                thread::sleep(Duration::from_millis(80));
            }
            Ok::<_, CustomFault>(true)
        }),
    )]);
    controller.set_value("name", "slow").expect("set");

    let slow = {
        let controller = controller.clone();
        thread::spawn(move || controller.submit_blocking().expect("slow submit"))
    };
    thread::sleep(Duration::from_millis(20));
    controller.set_value("name", "fast").expect("set");
    let fast = controller.submit_blocking().expect("fast submit");

    assert!(matches!(fast, SubmitOutcome::Submitted(_)));
    assert_eq!(slow.join().expect("slow thread"), SubmitOutcome::Superseded);
    assert_eq!(
        controller.snapshot().expect("snapshot").submit_state,
        SubmitState::Succeeded
    );
}

#[test]
fn debounced_async_revalidation_keeps_latest_value() {
    let controller = form_with(
        vec![FieldDescriptor::email("email").custom_validation(CustomValidation::future(
            |value: FieldValue| async move {
                Ok::<_, CustomFault>(!value.as_text().is_some_and(|text| text.contains("bad")))
            },
        ))],
        FormOptions {
            validate_mode: ValidationMode::OnChange,
            revalidate_debounce: Duration::from_millis(30),
            ..FormOptions::default()
        },
    );

    let first = {
        let controller = controller.clone();
        thread::spawn(move || block_on(controller.set_value_async("email", "bad@example.com")))
    };
    thread::sleep(Duration::from_millis(5));
    block_on(controller.set_value_async("email", "good@example.com")).expect("second set");
    first.join().expect("first thread").expect("first set");

    let meta = controller.field_meta("email").expect("meta");
    assert!(meta.errors.is_empty());
    assert!(!meta.validating);
    assert_eq!(
        controller.get_value("email").expect("email"),
        FieldValue::text("good@example.com")
    );
}

#[test]
fn async_field_validation_runs_custom_predicate() {
    let controller = form(vec![FieldDescriptor::text("username").custom_validation(
        CustomValidation::future(|value: FieldValue| async move {
            Ok::<_, CustomFault>(value.as_text() != Some("admin"))
        }),
    )]);
    controller.set_value("username", "admin").expect("set");
    assert!(controller.validate_field("username").expect("sync skips custom"));
    assert!(!block_on(controller.validate_field_async("username")).expect("async runs custom"));
    assert_eq!(error_messages(&controller, "username"), vec!["username is invalid"]);
}

#[test]
fn sync_revalidation_keeps_failing_custom_result() {
    let controller = form(vec![FieldDescriptor::text("username").required(true).custom_validation(
        CustomValidation::sync(|value: &FieldValue| Ok::<_, CustomFault>(value.as_text() == Some("ok"))),
    )]);
    controller.set_value("username", "taken").expect("set");
    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);

    controller.set_value("username", "still-taken").expect("set");
    assert!(!controller.field_meta("username").expect("meta").is_valid());
    assert_eq!(error_messages(&controller, "username"), vec!["username is invalid"]);
    assert_eq!(
        controller.snapshot().expect("snapshot").first_error.as_deref(),
        Some("username")
    );

    controller.set_value("username", "").expect("set");
    assert_eq!(
        error_messages(&controller, "username"),
        vec!["username is required"]
    );

    block_on(controller.set_value_async("username", "ok")).expect("async set");
    assert!(controller.field_meta("username").expect("meta").is_valid());
    assert!(matches!(
        controller.submit_blocking().expect("submit"),
        SubmitOutcome::Submitted(_)
    ));
}

#[test]
fn panicking_submit_handler_fails_the_submit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let controller = {
        let calls = calls.clone();
        form(vec![FieldDescriptor::text("name")]).on_submit(move |_values| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("host callback bug");
            }
        })
    };

    assert_eq!(
        controller.submit_blocking(),
        Err(FormError::SubmitHandlerPanicked)
    );
    assert_eq!(
        controller.snapshot().expect("snapshot").submit_state,
        SubmitState::Failed
    );

    assert!(matches!(
        controller.submit_blocking().expect("second submit"),
        SubmitOutcome::Submitted(_)
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        controller.snapshot().expect("snapshot").submit_state,
        SubmitState::Succeeded
    );
}

#[test]
fn json_descriptors_drive_a_full_submit() {
    let fields = FieldList::from_json_str(
        r#"[
            { "name": "age", "type": "number", "required": true, "min": 18, "max": 100 },
            { "name": "email", "type": "email", "label": "Email" },
            { "name": "terms", "type": "checkbox", "checkedValue": "yes", "uncheckedValue": "no" },
            { "name": "tags", "type": "array", "itemType": "text", "itemConfig": { "maxlength": 5 }, "maxItems": 3 },
            { "name": "mystery", "type": "hologram" }
        ]"#,
    )
    .expect("descriptor list parses");
    assert_eq!(fields.rejected().len(), 1);

    let controller = FormController::new(fields, FormOptions::default());
    controller.set_value("age", "30").expect("set");
    controller.add_item("tags").expect("add");
    controller.update_item("tags", 0, "rust").expect("update");

    let SubmitOutcome::Submitted(values) = controller.submit_blocking().expect("submit") else {
        panic!("valid JSON form must submit");
    };
    assert_eq!(
        serde_json::to_value(&values).expect("values serialize"),
        json!({ "age": 30, "email": "", "terms": "no", "tags": ["rust"] })
    );
}

#[test]
fn out_of_range_json_number_is_a_type_error() {
    let controller = form(vec![age_field()]);
    controller.set_value("age", FieldValue::from(json!(1e300))).expect("set");

    assert_eq!(controller.submit_blocking().expect("submit"), SubmitOutcome::Invalid);
    assert_eq!(
        controller.field_meta("age").expect("meta").errors[0].kind,
        FieldErrorKind::Type
    );
}

#[derive(Debug, PartialEq, FormRecord)]
struct Signup {
    email: String,
    #[form(rename = "age")]
    years: i64,
    terms: String,
    tags: Vec<String>,
    avatar: Option<FileRef>,
}

#[test]
fn submitted_values_convert_into_records() {
    let controller = form(vec![
        FieldDescriptor::email("email").required(true),
        age_field(),
        FieldDescriptor::new("terms", CheckboxConfig::encoded("yes", "no")),
        FieldDescriptor::array("tags", ArrayConfig::new(TextConfig::new())),
        FieldDescriptor::file("avatar"),
    ]);
    controller.set_value("email", "a@b.com").expect("set");
    controller.set_value("age", "42").expect("set");
    controller.toggle_checkbox("terms").expect("toggle");

    let record = block_on(controller.submit_with(|values| async move { Signup::from_values(&values) }))
        .expect("submit")
        .expect("valid form submits")
        .expect("record converts");
    assert_eq!(
        record,
        Signup {
            email: "a@b.com".into(),
            years: 42,
            terms: "yes".into(),
            tags: Vec::new(),
            avatar: None,
        }
    );
}
