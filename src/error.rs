//! Error type shared by the session, the accessors and the cache.

use core::fmt;
use std::error::Error;

#[derive(Debug)]
pub enum TadoError {
    /// Login or refresh was rejected, or the token response was malformed.
    Auth(String),
    /// An authenticated call returned a non-2xx status.
    Api { status: u16, body: String },
    /// Connection, timeout or body read failure.
    Transport(String),
    Json(serde_json::Error),
    /// A typed response did not match the expected shape.
    Decode { path: String, message: String },
    /// A path lookup in a response found nothing.
    MissingField(String),
    Config(String),
}

impl TadoError {
    /// HTTP status of an `Api` error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TadoError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(http::StatusCode::UNAUTHORIZED.as_u16())
    }
}

impl fmt::Display for TadoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TadoError::Auth(s) => write!(f, "auth error: {}", s),
            TadoError::Api { status, body } => write!(f, "http {}: {}", status, body),
            TadoError::Transport(s) => write!(f, "transport error: {}", s),
            TadoError::Json(e) => write!(f, "json error: {}", e),
            TadoError::Decode { path, message } => write!(f, "decode error at {}: {}", path, message),
            TadoError::MissingField(p) => write!(f, "missing field: {}", p),
            TadoError::Config(s) => write!(f, "config error: {}", s),
        }
    }
}

impl Error for TadoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TadoError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TadoError {
    fn from(value: serde_json::Error) -> Self {
        TadoError::Json(value)
    }
}

impl From<ureq::Error> for TadoError {
    fn from(value: ureq::Error) -> Self {
        TadoError::Transport(value.to_string())
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for TadoError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        TadoError::Decode {
            path: value.path().to_string(),
            message: value.into_inner().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TadoError>;
