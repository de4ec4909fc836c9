use stash_types::{ErrorKind, StoreError, StoreResult};

/// A successful read that may carry a non-fatal warning.
///
/// Reads can partly succeed: a decoded entity may have dropped a stored
/// field ([`ErrorKind::FieldMismatch`]), and a multi-get may have left some
/// slots empty ([`ErrorKind::NotFound`]). The value is always usable; the
/// warning says what was lost.
#[derive(Clone, Debug, PartialEq)]
pub struct Fetched<T> {
    value: T,
    warning: Option<StoreError>,
}

impl<T> Fetched<T> {
    /// A clean result with no warning.
    pub fn new(value: T) -> Self {
        Self {
            value,
            warning: None,
        }
    }

    pub fn with_warning(value: T, warning: Option<StoreError>) -> Self {
        Self { value, warning }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn warning(&self) -> Option<&StoreError> {
        self.warning.as_ref()
    }

    /// The kind of the warning, if any.
    pub fn warning_kind(&self) -> Option<ErrorKind> {
        self.warning.as_ref().map(StoreError::kind)
    }

    /// Returns `true` if no warning was raised.
    pub fn is_clean(&self) -> bool {
        self.warning.is_none()
    }

    /// Drop any warning and keep the value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, Option<StoreError>) {
        (self.value, self.warning)
    }

    /// Promote the warning to an error.
    pub fn strict(self) -> StoreResult<T> {
        match self.warning {
            Some(warning) => Err(warning),
            None => Ok(self.value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: f(self.value),
            warning: self.warning,
        }
    }
}
