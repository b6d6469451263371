/// Error types for spec loading and value conversion
use std::fmt;
use thiserror::Error;

/// Conversion engine failures. Every variant names the function, argument,
/// entry or type that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("function not found: {function}")]
    FunctionNotFound { function: String },
    #[error("argument `{argument}` not found for function `{function}`")]
    ArgumentNotFound { argument: String, function: String },
    #[error("spec entry not found: {name}")]
    EntryNotFound { name: String },
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("value {value} out of range for {type_name}")]
    OutOfRange { value: String, type_name: String },
    #[error("conversion failed: {0}")]
    ConversionFailed(String),
    #[error("invalid value `{value}` for enum {name}")]
    InvalidEnumValue { name: String, value: String },
    #[error("xdr error: {0}")]
    Xdr(String),
}

impl SpecError {
    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        SpecError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn out_of_range(value: impl fmt::Display, type_name: impl Into<String>) -> Self {
        SpecError::OutOfRange {
            value: value.to_string(),
            type_name: type_name.into(),
        }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        SpecError::ConversionFailed(message.into())
    }
}

impl From<stellar_xdr::curr::Error> for SpecError {
    fn from(e: stellar_xdr::curr::Error) -> Self {
        SpecError::Xdr(e.to_string())
    }
}

/// Custom sections carried by a contract image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    EnvMeta,
    Spec,
    Meta,
}

impl Section {
    /// Literal marker that introduces the section in the image
    pub fn marker(&self) -> &'static [u8] {
        match self {
            Section::EnvMeta => b"contractenvmetav0",
            Section::Spec => b"contractspecv0",
            Section::Meta => b"contractmetav0",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::EnvMeta => write!(f, "environment meta"),
            Section::Spec => write!(f, "contract spec"),
            Section::Meta => write!(f, "contract meta"),
        }
    }
}

/// Scanner failures. A missing mandatory section and an undecodable
/// mandatory record are distinct.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("parse failed: {0} not found")]
    SectionMissing(Section),
    #[error("parse failed: invalid {section}: {reason}")]
    Decode { section: Section, reason: String },
}

/// Strkey (Stellar base32 address) failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrkeyError {
    #[error("invalid strkey: {0}")]
    Invalid(String),
    #[error("unsupported strkey prefix: {0}")]
    UnsupportedPrefix(char),
}
