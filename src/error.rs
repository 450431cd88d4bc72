//! Error types for the PDF engine.
//!
//! Every fallible operation in the crate returns [`Result`]. Variants carry
//! the offending object identity or page index where one is known, and
//! [`Error::kind`] collapses them into the coarse taxonomy reported to
//! callers of the engine facade.

use crate::object::ObjectRef;
use serde::Serialize;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while loading, transforming or writing a PDF.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Structurally invalid PDF
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// A page tree node revisits one of its ancestors
    #[error("Cyclic page tree: object {object} revisits an ancestor")]
    CyclicStructure {
        /// Node that closed the cycle
        object: ObjectRef,
    },

    /// Dangling reference in a position where it cannot be tolerated
    #[error("Broken reference {object}: {context}")]
    BrokenReference {
        /// Missing object
        object: ObjectRef,
        /// What needed it
        context: String,
    },

    /// Password did not match, or the document is still locked
    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Encryption scheme outside the Standard handler's revisions
    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Stream encoding error
    #[error("Stream encoding error: {0}")]
    Encode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation aborted through a cancellation token
    #[error("Operation cancelled after {completed} of {total} steps")]
    Cancelled {
        /// Steps finished before the abort
        completed: usize,
        /// Steps the operation planned
        total: usize,
    },

    /// Page index beyond the end of the document
    #[error("Page index {index} out of range (document has {count} pages)")]
    PageOutOfRange {
        /// Requested index (0-based)
        index: usize,
        /// Number of pages
        count: usize,
    },

    /// Malformed page selection
    #[error("Invalid page range: {0}")]
    InvalidPageRange(String),

    /// Rotation that is not a multiple of 90 degrees
    #[error("Invalid rotation: {0} degrees (must be a multiple of 90)")]
    InvalidRotation(i64),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Reference chain or nesting too deep
    #[error("Recursion limit exceeded (depth {0})")]
    RecursionLimitExceeded(u32),

    /// Configuration could not be read
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine handle that was never issued or is already closed
    #[error("Unknown document handle {0}")]
    UnknownHandle(u64),

    /// Feature needs a collaborator that was not supplied
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Error raised while processing a specific page
    #[error("Page {index}: {source}")]
    OnPage {
        /// Page index (0-based)
        index: usize,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },
}

/// Coarse error classification surfaced to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Unparseable header, trailer or object
    ParseError,
    /// Page tree cycle
    CyclicStructure,
    /// Required reference is missing
    BrokenReference,
    /// Wrong password or locked document
    InvalidPassword,
    /// Filter or encryption scheme not supported
    UnsupportedFilter,
    /// Read or write failure
    IoError,
    /// User abort
    Cancelled,
    /// Caller supplied invalid arguments
    Invalid,
    /// Anything else
    Other,
}

impl Error {
    /// Attach a page index to this error. Already-annotated errors are kept as is.
    pub fn on_page(self, index: usize) -> Self {
        match self {
            Error::OnPage { .. } => self,
            other => Error::OnPage {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Map the error onto the reported taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHeader(_)
            | Error::ParseError { .. }
            | Error::InvalidPdf(_)
            | Error::Decode(_)
            | Error::InvalidObjectType { .. }
            | Error::RecursionLimitExceeded(_) => ErrorKind::ParseError,
            Error::CyclicStructure { .. } => ErrorKind::CyclicStructure,
            Error::BrokenReference { .. } => ErrorKind::BrokenReference,
            Error::InvalidPassword(_) => ErrorKind::InvalidPassword,
            Error::UnsupportedFilter(_) | Error::UnsupportedEncryption(_) => {
                ErrorKind::UnsupportedFilter
            },
            Error::Io(_) => ErrorKind::IoError,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::PageOutOfRange { .. }
            | Error::InvalidPageRange(_)
            | Error::InvalidRotation(_)
            | Error::Config(_)
            | Error::UnknownHandle(_) => ErrorKind::Invalid,
            Error::Encode(_) | Error::Unsupported(_) => ErrorKind::Other,
            Error::OnPage { source, .. } => source.kind(),
        }
    }

    /// Offending object identity, if the error names one.
    pub fn object(&self) -> Option<ObjectRef> {
        match self {
            Error::CyclicStructure { object } | Error::BrokenReference { object, .. } => {
                Some(*object)
            },
            Error::OnPage { source, .. } => source.object(),
            _ => None,
        }
    }

    /// Page index the error occurred on, if known.
    pub fn page(&self) -> Option<usize> {
        match self {
            Error::OnPage { index, .. } => Some(*index),
            Error::PageOutOfRange { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Shorthand for a broken reference.
    pub(crate) fn broken(object: ObjectRef, context: impl Into<String>) -> Self {
        Error::BrokenReference {
            object,
            context: context.into(),
        }
    }

    /// Shorthand for a type mismatch.
    pub(crate) fn wrong_type(expected: &str, found: &str) -> Self {
        Error::InvalidObjectType {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error() {
        let err = Error::ParseError {
            offset: 1234,
            reason: "invalid token".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("invalid token"));
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_broken_reference_carries_object() {
        let err = Error::broken(ObjectRef::new(12, 0), "page contents");
        let msg = format!("{}", err);
        assert!(msg.contains("12 0 R"));
        assert!(msg.contains("page contents"));
        assert_eq!(err.object(), Some(ObjectRef::new(12, 0)));
        assert_eq!(err.kind(), ErrorKind::BrokenReference);
    }

    #[test]
    fn test_on_page_wraps_once() {
        let err = Error::UnsupportedFilter("JBIG2Decode".into()).on_page(3).on_page(7);
        assert_eq!(err.page(), Some(3));
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
        assert!(format!("{}", err).starts_with("Page 3:"));
    }

    #[test]
    fn test_cancelled_kind() {
        let err = Error::Cancelled {
            completed: 2,
            total: 10,
        };
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(format!("{}", err).contains("2 of 10"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(format!("{}", err).contains("IO error"));
    }

    #[test]
    fn test_invalid_rotation() {
        let err = Error::InvalidRotation(45);
        assert!(format!("{}", err).contains("45"));
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
