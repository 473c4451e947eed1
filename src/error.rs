use serde_json::Value;
use std::error::Error as StdError;
use std::fmt::Display;
use std::io::Error as IoError;

/// Switchboard `Result` alias type.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Switchboard error type.
#[derive(Debug)]
pub enum Error {
    /// A `serde_json` crate error
    Json(serde_json::Error),
    /// A `std::io` module error
    Io(IoError),
    /// A TOML configuration parse error
    Toml(toml::de::Error),
    /// A json decoding error, with a description and the offending value
    Decode(&'static str, Value),
    /// A miscellaneous error, with a description
    ///
    /// Also the escape hatch for [`Directory`](crate::Directory) and
    /// [`MessageStore`](crate::MessageStore) implementations whose backing
    /// store can fail.
    Other(&'static str),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Error {
        Error::Toml(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match *self {
            Error::Json(ref inner) => inner.fmt(f),
            Error::Io(ref inner) => inner.fmt(f),
            Error::Toml(ref inner) => inner.fmt(f),
            Error::Decode(msg, ref value) => write!(f, "{}: {}", msg, value),
            Error::Other(msg) => f.write_str(msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::Json(ref inner) => Some(inner),
            Error::Io(ref inner) => Some(inner),
            Error::Toml(ref inner) => Some(inner),
            _ => None,
        }
    }
}
