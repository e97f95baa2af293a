//! Error types shared by the query builder, the TestRail client and the
//! Salesforce executor.

use crate::http::{HttpError, StatusError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A builder or config was used incorrectly.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// An operation was called before the state it depends on exists.
    #[error("precondition failed: {message}")]
    Precondition { message: String },

    /// The backend answered with a non-2xx status.
    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    /// No response was received.
    #[error("network error: {message}")]
    Network { message: String },

    /// A 2xx response whose body did not have the expected shape.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("io error: {message}")]
    Io { message: String },
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Error::Precondition {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Error::InvalidResponse {
            message: message.into(),
        }
    }

    /// Status code of a backend rejection, if this is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status(status, status_err) => {
                let body = match status_err {
                    StatusError::ClientError(msg) => msg,
                    StatusError::ServerError(msg) => msg,
                };
                Error::Backend { status, body }
            }
            HttpError::Io(message) => Error::Network { message },
            HttpError::Decode(message) => Error::InvalidResponse { message },
            HttpError::InvalidRequest(message) => Error::Configuration { message },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
        }
    }
}
