use std::{error::Error, fmt, io};

/// Failures while talking to a replica over HTTP.
#[derive(Debug)]
pub enum ClientErr {
    /// The request never produced a response: refused, reset, timed out.
    Transport(reqwest::Error),
    /// The replica answered with a status this call does not accept.
    Status { code: u16, body: String },
    /// The body or a header could not be decoded.
    Decode(String),
}

impl ClientErr {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Status { code, .. } => matches!(code, 502..=504),
            Self::Decode(_) => false,
        }
    }
}

impl fmt::Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Status { code, body } => write!(f, "unexpected status {code}: {body}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientErr {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value)
        }
    }
}

/// Failures while reading or replacing the shared desired state record.
#[derive(Debug)]
pub enum StoreErr {
    Io(io::Error),
    Malformed(serde_json::Error),
}

impl fmt::Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "desired state io error: {e}"),
            Self::Malformed(e) => write!(f, "malformed desired state record: {e}"),
        }
    }
}

impl Error for StoreErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Malformed(e) => Some(e),
        }
    }
}

impl From<io::Error> for StoreErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value)
    }
}
