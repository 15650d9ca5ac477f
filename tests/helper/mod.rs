#![allow(dead_code)]

mod manifest;
mod source;

pub use manifest::*;
pub use source::*;
