#![allow(dead_code)]

#[derive(calmform::form::FormRecord)]
struct Contact {
    #[form(skip)]
    email: String,
}

fn main() {}
