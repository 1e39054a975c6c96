pub mod engine;
pub mod prompt;
