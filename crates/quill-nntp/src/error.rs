use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NntpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Unexpected response {0}: {1}")]
    UnexpectedResponse(u16, String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("cannot parse {what}: {text:?}")]
    Parse { what: &'static str, text: String },

    #[error("invalid {field} {value:?}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("TLS already active")]
    TlsAlreadyActive,

    #[error("capabilities not yet fetched")]
    CapabilitiesNotFetched,

    #[error("no such capability: {0}")]
    NoSuchCapability(String),
}

impl NntpError {
    /// Response code carried by a protocol mismatch, if any.
    pub fn response_code(&self) -> Option<u16> {
        match self {
            NntpError::UnexpectedResponse(code, _) => Some(*code),
            _ => None,
        }
    }
}

pub(crate) fn parse_number(field: &'static str, value: &str) -> Result<u64, NntpError> {
    value.parse::<u64>().map_err(|source| NntpError::InvalidNumber {
        field,
        value: value.to_string(),
        source,
    })
}
