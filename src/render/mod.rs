//! Rendering of document models to output formats.

mod json;

pub use json::{to_json, JsonFormat};
