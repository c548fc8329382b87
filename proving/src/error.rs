use std::{
    any::Any,
    borrow::Cow,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::Duration,
};

use crate::Value;

/// The single error type for all proving operations.
///
/// Test bodies, listeners and assertion blocks return `proving::Result<T>`
/// (alias for `Result<T, proving::Error>`). Anything a body "throws" ends up
/// as one of these variants, including panics, which are caught at every
/// boundary where user code is invoked.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An arbitrary value raised by user code.
    #[error("{0}")]
    Thrown(Value),

    #[error("{name}: {message}")]
    Named {
        name: Cow<'static, str>,
        message: String,
    },

    #[error("{0}")]
    Panic(String),

    #[error("TypeError: test has no body to run")]
    MissingBody,

    #[error("Test timed out after {0:?}")]
    Timeout(Duration),

    #[error("SyntaxError: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("TypeError: Converting circular structure to JSON")]
    CyclicStructure,

    #[error("External error: {0}")]
    External(#[source] Arc<dyn std::error::Error + Send + Sync>),

    #[error("IO error: {0}")]
    IoError(#[source] Arc<std::io::Error>),
}

impl Error {
    /// Raise an arbitrary value, the way a body would `throw 'oops'`.
    pub fn raise(value: impl Into<Value>) -> Self {
        Error::Thrown(value.into())
    }

    /// A plain `Error: message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    pub fn named(name: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Error::Named {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::named("TypeError", message)
    }

    pub fn external(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::External(Arc::new(e))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(s) => (*s).to_string(),
                Err(_) => "Box<dyn Any>".to_string(),
            },
        };
        Error::Panic(message)
    }

    /// Short classification of the error, e.g. `TypeError` or `Panic`.
    pub fn name(&self) -> &str {
        match self {
            Error::Thrown(_) => "Thrown",
            Error::Named { name, .. } => name,
            Error::Panic(_) => "Panic",
            Error::MissingBody | Error::CyclicStructure => "TypeError",
            Error::Timeout(_) => "Timeout",
            Error::InvalidPattern(_) => "SyntaxError",
            Error::External(_) => "Error",
            Error::IoError(_) => "IoError",
        }
    }

    /// The raised value, if this error came from [`Error::raise`].
    pub fn thrown(&self) -> Option<&Value> {
        match self {
            Error::Thrown(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Panic(_))
    }
}

/// Runs user code, turning a panic into [`Error::Panic`].
pub(crate) fn capture<T>(f: impl FnOnce() -> crate::Result<T>) -> crate::Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(Error::from_panic(payload)))
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Thrown(a), Self::Thrown(b)) => a.strict_eq(b),
            (
                Self::Named {
                    name: n1,
                    message: m1,
                },
                Self::Named {
                    name: n2,
                    message: m2,
                },
            ) => n1 == n2 && m1 == m2,
            (Self::Panic(a), Self::Panic(b)) => a == b,
            (Self::MissingBody, Self::MissingBody) => true,
            (Self::Timeout(a), Self::Timeout(b)) => a == b,
            (Self::InvalidPattern(a), Self::InvalidPattern(b)) => a == b,
            (Self::CyclicStructure, Self::CyclicStructure) => true,
            (Self::External(a), Self::External(b)) => Arc::ptr_eq(a, b),
            (Self::IoError(a), Self::IoError(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(Arc::new(e))
    }
}
