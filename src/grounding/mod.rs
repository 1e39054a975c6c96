//! Turning free-form model replies into `{text, bbox}` answers.

pub mod fallback;
pub mod marker;
pub mod parser;
pub mod types;
