//! Failure taxonomy shared by the transport, the protocol clients and the
//! export query.
//!
//! The public [`crate::query_exports`] never returns these: every failure is
//! logged and collapsed into an empty list. They remain observable through
//! [`crate::QueryOutcome`].

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while talking to a server.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The host could not be resolved or the TCP connection was not established.
    #[error("cannot connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// No reply arrived within the allowed time, retransmissions included.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The peer sent something that is not a valid reply to our call.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server understood the request and refused it.
    #[error("request denied: {0}")]
    MountDenied(String),

    /// The connection failed after it was established.
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
}

/// Discriminant of [`QueryError`], cheap to copy and compare.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connect,
    Timeout,
    Protocol,
    MountDenied,
    Io,
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Connect { .. } => ErrorKind::Connect,
            QueryError::Timeout(_) => ErrorKind::Timeout,
            QueryError::Protocol(_) => ErrorKind::Protocol,
            QueryError::MountDenied(_) => ErrorKind::MountDenied,
            QueryError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn connect(target: impl Into<String>, source: io::Error) -> Self {
        QueryError::Connect { target: target.into(), source }
    }

    /// XDR decode failures surface as `InvalidData`/`UnexpectedEof` I/O errors;
    /// on an in-memory record they always mean a malformed message.
    pub(crate) fn decode(context: &str, err: io::Error) -> Self {
        QueryError::Protocol(format!("{context}: {err}"))
    }

    /// Reported to calls still outstanding when their connection goes away.
    pub(crate) fn connection_closed() -> Self {
        QueryError::Io(io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }
}
