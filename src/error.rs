use std::fmt;
use std::io::Error as IoError;

/// Errors returned by [`crate::create_connection`].
#[derive(Debug)]
pub enum Error {
    /// The host could not be resolved to any address.
    Resolution(IoError),
    /// Every candidate endpoint failed to connect. Carries the last
    /// underlying OS error encountered across all attempts.
    Connect(IoError),
    /// The overall deadline elapsed before any attempt connected.
    Timeout,
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Connect(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Resolution(e) => write!(f, "failed to resolve host: {}", e),
            Error::Connect(e) => write!(f, "failed to connect: {}", e),
            Error::Timeout => write!(f, "timed out connecting"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Resolution(e) | Error::Connect(e) => Some(e),
            Error::Timeout => None,
        }
    }
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;
