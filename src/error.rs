//! Error types for the auto-import controller

use std::fmt;

use thiserror::Error;

/// Result type alias using the controller's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    /// Object does not exist. Absorbed at load time, never surfaced from a pass.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency failure, the object changed underneath the pass
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The import client could not be built from the bootstrap credential
    #[error("Unable to build import client: {0}")]
    Connectivity(String),

    /// Applying the import manifest to the remote cluster failed
    #[error("{0}")]
    Import(String),

    /// Configuration error (malformed retry counter, bad environment)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The pass was cancelled before it could finish
    #[error("Reconciliation cancelled")]
    Cancelled,

    /// Any other Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    /// Several independent failures collected during one pass
    #[error("{0}")]
    Aggregate(ErrorList),
}

/// Coarse classification of an [`Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Connectivity,
    Import,
    Config,
    Cancelled,
    Api,
    Aggregate,
}

impl ErrorKind {
    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Import => "import",
            ErrorKind::Config => "config",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Api => "api",
            ErrorKind::Aggregate => "aggregate",
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a connectivity error
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Error::Connectivity(msg.into())
    }

    /// Create an import error
    pub fn import(msg: impl Into<String>) -> Self {
        Error::Import(msg.into())
    }

    /// Classify a Kubernetes API error by its HTTP status
    pub fn from_kube(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(resp.message),
            kube::Error::Api(resp) if resp.code == 409 => Error::Conflict(resp.message),
            other => Error::Kube(other),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Connectivity(_) => ErrorKind::Connectivity,
            Error::Import(_) => ErrorKind::Import,
            Error::Config(_) => ErrorKind::Config,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Kube(_) => ErrorKind::Api,
            Error::Aggregate(_) => ErrorKind::Aggregate,
        }
    }

    /// Whether redelivering the same pass can succeed without manual intervention.
    ///
    /// An aggregate is retryable when any of its members is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Config(_) | Error::Cancelled => false,
            Error::Aggregate(list) => list.iter().any(Error::is_retryable),
            _ => true,
        }
    }

    /// Whether this error, or any member of an aggregate, has the given kind
    pub fn contains(&self, kind: ErrorKind) -> bool {
        match self {
            Error::Aggregate(list) => list.iter().any(|e| e.contains(kind)),
            other => other.kind() == kind,
        }
    }
}

/// A write against an object that is already gone has nothing left to do
pub fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::NotFound(_)) => Ok(()),
        other => other,
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Error::from_kube(err)
    }
}

/// Ordered list of discrete failures collected during one pass.
///
/// Failures are appended rather than short-circuited so that, for example,
/// a condition write failure never hides a credential deletion failure.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<Error>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    /// Record the error side of `result`, if any
    pub fn collect(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.push(e);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }

    /// Empty list is success, a single failure is returned as-is,
    /// several become [`Error::Aggregate`].
    pub fn into_result(mut self) -> Result<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(Error::Aggregate(self)),
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.0.as_slice() {
            return write!(f, "{}", only);
        }
        write!(f, "[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        write!(f, "]")
    }
}
