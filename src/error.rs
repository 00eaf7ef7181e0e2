// Copyright 2023 Remi Bernotavicius

/// Errors surfaced by the dish and ingredient operations.
#[derive(Debug)]
pub enum Error {
    /// Malformed or missing input, rejected before anything is written.
    Validation(String),
    NotFound(String),
    /// A uniqueness constraint the caller tripped, e.g. the same ingredient listed twice.
    Conflict(String),
    Store(diesel::result::Error),
    Pool(diesel::r2d2::PoolError),
    /// The blocking worker running the query went away.
    Task(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::NotFound(msg) => write!(f, "{msg}"),
            Self::Conflict(msg) => write!(f, "{msg}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Pool(e) => write!(f, "connection pool error: {e}"),
            Self::Task(msg) => write!(f, "worker error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Pool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        Self::Store(e)
    }
}

impl From<diesel::r2d2::PoolError> for Error {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Pool(e)
    }
}

impl Error {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Store(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
