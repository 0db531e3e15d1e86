//! Error types for the Notary checkpoint chain.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("encode {kind}: {reason}")] Encode { kind: &'static str, reason: String },
    #[error("decode {kind}: {reason}")] Decode { kind: &'static str, reason: String },
    #[error("invalid hash length: {0}")] InvalidHashLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error("too many entries for one block: {0}")] TooManyEntries(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")] NotFound(String),
    #[error("decode: {0}")] Decode(String),
    #[error("encode: {0}")] Encode(String),
    #[error("batch state: {0}")] BatchState(String),
    #[error("backend: {0}")] Backend(String),
}

impl StoreError {
    /// Whether the error only signals an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Encode { .. } => Self::Encode(err.to_string()),
            _ => Self::Decode(err.to_string()),
        }
    }
}
