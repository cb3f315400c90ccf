//! # Error Module - Unified *Interchange* Error Type
//!
//! Defines the single error type returned by every fallible operation in the crate.
//!
//! ## Features
//! - Covers layout validation (offsets, lengths, child counts), casting,
//!   capsule import, codec decode failures and I/O.
//! - Foreign errors raised by a third-party exporter are carried verbatim in
//!   [`InterchangeError::Foreign`] so callers can downcast to their own type.
//! - [`ErrorKind`] collapses the variants onto a small taxonomy for callers that
//!   only care about the category.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed error raised by code outside this crate.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Catch all error type for the crate.
#[derive(Debug, Error)]
pub enum InterchangeError {
    /// An operation required a specific type or shape and received another.
    #[error("Type mismatch{}: expected {expected}, found {found}", fmt_context(.context))]
    TypeMismatch {
        expected: String,
        found: String,
        context: Option<String>,
    },

    /// Number of fields does not match the number of children/columns.
    #[error("Field count mismatch: expected {expected}, found {found}")]
    FieldCountMismatch { expected: usize, found: usize },

    /// Column or child length disagrees with its siblings.
    #[error("Column length mismatch at column {col}: expected {expected}, found {found}")]
    ColumnLengthMismatch {
        col: usize,
        expected: usize,
        found: usize,
    },

    /// Offsets buffer is not monotonic or runs past its values.
    #[error("Invalid offsets: {0}")]
    InvalidOffsets(String),

    /// No conversion exists between the two types.
    #[error("Unsupported cast from {from} to {to}")]
    UnsupportedCast { from: String, to: String },

    /// Capsule or C struct is malformed, mistagged or already released.
    #[error("Import error: {0}")]
    ImportError(String),

    /// Error raised by a foreign exporter, passed through untouched.
    #[error(transparent)]
    Foreign(BoxError),

    /// Footer of a columnar file could not be parsed.
    #[error("Corrupt footer: {0}")]
    CorruptFooter(String),

    /// Declared schema disagrees with the data that follows it.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Operation is not available for this value or policy.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Schema document could not be parsed.
    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Compression codec failure or codec not enabled.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Underlying sink/source failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote store failure.
    #[error("Object store error: {0}")]
    ObjectStore(String),
}

fn fmt_context(context: &Option<String>) -> String {
    match context {
        Some(c) => format!(" in {c}"),
        None => String::new(),
    }
}

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    InvalidOffsets,
    UnsupportedCast,
    ImportError,
    ForeignError,
    CorruptFooter,
    SchemaMismatch,
    UnsupportedOperation,
    IoFailure,
}

impl InterchangeError {
    /// Shorthand for a [`InterchangeError::TypeMismatch`] without context.
    pub fn type_mismatch(expected: impl ToString, found: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
            context: None,
        }
    }

    /// Wraps an error raised outside the crate.
    pub fn foreign<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        let boxed: BoxError = err.into();
        // Already one of ours: keep its identity instead of nesting it.
        match boxed.downcast::<InterchangeError>() {
            Ok(own) => *own,
            Err(other) => Self::Foreign(other),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeMismatch { .. }
            | Self::FieldCountMismatch { .. }
            | Self::ColumnLengthMismatch { .. }
            | Self::IndexOutOfBounds { .. } => ErrorKind::TypeMismatch,
            Self::InvalidOffsets(_) => ErrorKind::InvalidOffsets,
            Self::UnsupportedCast { .. } => ErrorKind::UnsupportedCast,
            Self::ImportError(_) => ErrorKind::ImportError,
            Self::Foreign(_) => ErrorKind::ForeignError,
            Self::CorruptFooter(_) => ErrorKind::CorruptFooter,
            Self::SchemaMismatch(_) | Self::SchemaParse(_) => ErrorKind::SchemaMismatch,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::Compression(_) | Self::Io(_) | Self::ObjectStore(_) => ErrorKind::IoFailure,
        }
    }

    /// Returns the foreign error if this is one.
    pub fn into_foreign(self) -> std::result::Result<BoxError, Self> {
        match self {
            Self::Foreign(e) => Ok(e),
            other => Err(other),
        }
    }

    /// Borrows the foreign error as its concrete type.
    pub fn downcast_foreign<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Foreign(e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, InterchangeError>;
