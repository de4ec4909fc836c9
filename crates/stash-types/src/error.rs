use std::fmt;

use thiserror::Error;

/// The closed set of canonical error kinds surfaced across the provider
/// boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    FieldMismatch,
    SizeLimitExceeded,
    TypeMismatch,
    Backend,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not-found"),
            Self::FieldMismatch => write!(f, "field-mismatch"),
            Self::SizeLimitExceeded => write!(f, "size-limit-exceeded"),
            Self::TypeMismatch => write!(f, "type-mismatch"),
            Self::Backend => write!(f, "backend"),
        }
    }
}

/// Canonical storage errors.
///
/// Backend-specific failures are translated into one of these exactly once,
/// at the provider boundary. Higher layers only ever add context via
/// [`StoreError::with_context`], which never changes the [`ErrorKind`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum StoreError {
    /// No record exists at the key or name.
    #[error("no such entity")]
    NotFound,

    /// The stored entity has a field the destination type does not.
    ///
    /// Non-fatal: the decoded value is still returned alongside this signal.
    #[error("field mismatch: stored entity has field {field:?} that the destination does not")]
    FieldMismatch { field: String },

    /// A payload exceeded the configured ceiling; rejected before any I/O.
    #[error("payload too large: {size} bytes exceeds the {limit} byte limit")]
    SizeLimitExceeded { size: usize, limit: usize },

    /// A read's destination type does not match what was written.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Opaque failure from the underlying service, including timeouts and
    /// cancellation.
    #[error("backend error: {message}{}", render_context(.context))]
    Backend { message: String, context: String },

    /// Another error with added context.
    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<StoreError>,
    },
}

fn render_context(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(" ({context})")
    }
}

impl StoreError {
    /// Build a backend error from a message and diagnostic context.
    pub fn backend(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            context: context.into(),
        }
    }

    /// The canonical kind of this error, looking through added context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::FieldMismatch { .. } => ErrorKind::FieldMismatch,
            Self::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            Self::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Returns `true` if this error is a kind of `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Shorthand for `is(ErrorKind::NotFound)`.
    pub fn is_not_found(&self) -> bool {
        self.is(ErrorKind::NotFound)
    }

    /// Wrap this error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all added context stripped.
    pub fn root(&self) -> &StoreError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_of_each_variant() {
        assert_eq!(StoreError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            StoreError::FieldMismatch { field: "x".into() }.kind(),
            ErrorKind::FieldMismatch
        );
        assert_eq!(
            StoreError::SizeLimitExceeded { size: 2, limit: 1 }.kind(),
            ErrorKind::SizeLimitExceeded
        );
        assert_eq!(
            StoreError::TypeMismatch("a vs b".into()).kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(StoreError::backend("boom", "").kind(), ErrorKind::Backend);
    }

    #[test]
    fn context_preserves_kind() {
        let err = StoreError::NotFound
            .with_context("reading shard 3 of blob x")
            .with_context("loading singleton x");
        assert!(err.is_not_found());
        assert_eq!(err.root(), &StoreError::NotFound);
        assert_eq!(
            err.to_string(),
            "loading singleton x: reading shard 3 of blob x: no such entity"
        );
    }

    #[test]
    fn backend_display_includes_context_when_present() {
        let bare = StoreError::backend("connection reset", "");
        assert_eq!(bare.to_string(), "backend error: connection reset");

        let with_ctx = StoreError::backend("connection reset", "get /Foo,\"a\"");
        assert_eq!(
            with_ctx.to_string(),
            "backend error: connection reset (get /Foo,\"a\")"
        );
    }

    #[test]
    fn is_predicate_rejects_other_kinds() {
        let err = StoreError::SizeLimitExceeded { size: 10, limit: 5 };
        assert!(err.is(ErrorKind::SizeLimitExceeded));
        assert!(!err.is(ErrorKind::NotFound));
        assert!(!err.is_not_found());
    }
}
