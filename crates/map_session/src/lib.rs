use std::{error::Error, fmt};

use model::geometry::UnsupportedGeometryKind;

pub mod backend;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod feature_index;
pub mod interaction;
pub mod layers;
pub mod runtime;
pub mod session;
pub mod state;
pub mod stream;
pub mod viewport;

#[cfg(test)]
mod testing;

/// Failure of a request against the tracking backend.
#[derive(Debug)]
pub enum BackendError {
    NotFound,
    Rejected {
        status: u16,
        url: String,
        body: Option<String>,
    },
    Decode(Box<dyn Error + Send + Sync>),
    Other(Box<dyn Error + Send + Sync>),
}

impl BackendError {
    pub fn other<T: Error + Send + Sync + 'static>(why: T) -> Self {
        Self::Other(Box::new(why))
    }

    pub fn decode<T: Error + Send + Sync + 'static>(why: T) -> Self {
        Self::Decode(Box::new(why))
    }
}

impl Error for BackendError {}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Rejected { status, url, body } => match body {
                Some(body) if !body.is_empty() => {
                    write!(f, "request to {url} failed ({status}): {body}")
                }
                _ => write!(f, "request to {url} failed ({status})"),
            },
            Self::Decode(why) => write!(f, "malformed response: {why}"),
            Self::Other(why) => write!(f, "{why}"),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Everything that can go wrong in a map operation. None of these end the
/// session; the worst case is an unchanged map plus a message.
#[derive(Debug)]
pub enum MapError {
    /// Missing or malformed user input.
    Validation(String),
    /// The backend failed or could not be reached. Map state is preserved.
    Request(BackendError),
    /// The backend answered correctly but without data.
    EmptyResult(String),
    UnsupportedGeometryKind(UnsupportedGeometryKind),
    /// An operation was requested in a state that does not allow it.
    PreconditionViolation(String),
}

impl MapError {
    pub fn precondition<S: Into<String>>(message: S) -> Self {
        Self::PreconditionViolation(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }
}

impl Error for MapError {}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "{message}"),
            Self::Request(why) => write!(f, "Request failed: {why}"),
            Self::EmptyResult(message) => write!(f, "No data: {message}"),
            Self::UnsupportedGeometryKind(why) => write!(f, "{why}"),
            Self::PreconditionViolation(message) => write!(f, "Not possible: {message}"),
        }
    }
}

impl From<BackendError> for MapError {
    fn from(value: BackendError) -> Self {
        Self::Request(value)
    }
}

impl From<UnsupportedGeometryKind> for MapError {
    fn from(value: UnsupportedGeometryKind) -> Self {
        Self::UnsupportedGeometryKind(value)
    }
}

pub type MapResult<T> = Result<T, MapError>;
