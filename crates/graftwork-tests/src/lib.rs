//! Shared fixtures for the integration tests of `graftwork`.

pub mod grammars;
pub mod recognizer;

pub use recognizer::Recognizer;
