#![allow(dead_code)]

#[derive(calmform::form::FormRecord)]
struct Wrapper<T> {
    value: T,
}

fn main() {}
