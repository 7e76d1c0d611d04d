#![allow(dead_code)]

#[derive(calmform::form::FormRecord)]
struct Pair(String, u32);

fn main() {}
