#![allow(dead_code)]

#[derive(calmform::form::FormRecord)]
enum Choice {
    Yes,
    No,
}

fn main() {}
