//! Turning config file text into a [`ConfigMap`].
//!
//! A config file comes in one of two forms:
//!
//! - **Document form**: the trimmed text starts with `{` and is parsed as a
//!   JSON object.  Nothing of the original text is kept as surrounding text,
//!   so the first save rewrites the file as a lone autogenerated section.
//! - **Script form**: anything else.  The whole text is kept verbatim as the
//!   surrounding text and evaluated by the [`ScriptSandbox`], which reports
//!   values and profiles through [`ScriptHooks`].
//!
//! Serialization in the other direction lives in
//! [`crate::domain::autogen::render`].

use thiserror::Error;

use crate::domain::config_map::ConfigMap;

pub mod script;

pub use script::{PrintSink, ScriptHooks, ScriptSandbox};

/// Error type for decoding config file text.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The document-form text is not a JSON object.
    #[error("malformed config document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Evaluating the script-form text failed.
    #[error("config script failed: {0}")]
    Script(String),
}

/// The two encodings a config file can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileForm {
    Document,
    Script,
}

/// Classifies config file text by its first non-whitespace character.
pub fn detect(text: &str) -> FileForm {
    if text.trim_start().starts_with('{') {
        FileForm::Document
    } else {
        FileForm::Script
    }
}

/// Parses document-form text.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the text is not a JSON object.
pub fn decode_document(text: &str) -> Result<ConfigMap, CodecError> {
    Ok(serde_json::from_str(text)?)
}
