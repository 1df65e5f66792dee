//! Error types for ferrisconf.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::rpc::RpcErrors;

/// Main error type for ferrisconf operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Chunked or end-of-message framing errors
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Malformed XML or JSON payloads
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The device answered with one or more `rpc-error` elements.
    #[error("Device rejected {operation}:\n{errors}")]
    Rpc {
        operation: String,
        errors: RpcErrors,
    },

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Several connection candidates failed.
    #[error("Unable to establish any {kind} connection:\n{}", .messages.join("\n"))]
    Aggregate {
        kind: ErrorKind,
        messages: Vec<String>,
    },
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts (strict verification).
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts.
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// The server refused the `netconf` subsystem.
    #[error("Subsystem '{0}' request failed")]
    SubsystemFailed(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while de-framing the NETCONF byte stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Expected `\n#` at the start of a chunk header.
    #[error("expected LF HASH, got {0:?}")]
    BadHeader(String),

    /// Chunk size missing, zero-prefixed or not decimal.
    #[error("malformed chunk size in {0:?}")]
    BadChunkSize(String),

    /// Chunk size above 4294967295.
    #[error("chunk size {0} is larger than 4294967295")]
    ChunkTooLarge(u64),

    /// The end-of-chunks sequence was not `\n##\n`.
    #[error("expected end of chunks LF HASH HASH LF, got {0:?}")]
    BadEndMarker(String),

    /// Input fed after the message was complete or the decoder failed.
    #[error("decoder is no longer accepting input")]
    Finished,

    /// The stream ended before the message was complete.
    #[error("stream ended with {0} bytes of incomplete message")]
    Truncated(usize),

    /// A chunked message needs at least one chunk, so it cannot be empty.
    #[error("cannot frame an empty message")]
    EmptyMessage,
}

/// Errors raised while decoding XML or JSON documents.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Malformed XML
    #[error("XML error: {0}")]
    Xml(String),

    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload was not valid UTF-8
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// JSON document whose top level is not an object.
    #[error("expected a JSON object at the top level, found {0}")]
    JsonShape(&'static str),

    /// Document had no root element.
    #[error("document has no root element")]
    Empty,

    /// Expected one root element and found several.
    #[error("expected a single root element, found {0}")]
    MultipleRoots(usize),

    /// The root element was not the one expected.
    #[error("unexpected root element '{found}', expected '{expected}'")]
    UnexpectedRoot { expected: String, found: String },
}

impl From<quick_xml::Error> for ParseError {
    fn from(e: quick_xml::Error) -> Self {
        ParseError::Xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        ParseError::Xml(e.to_string())
    }
}

/// Session lifecycle errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No channel is open and reconnecting is not possible.
    #[error("Session not connected - call connect() first")]
    NotConnected,

    /// Invalid configuration in the session builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The session registry lock was poisoned.
    #[error("Failed to acquire session registry lock")]
    RegistryPoisoned,

    /// `connect_any` was called without candidates.
    #[error("No connection candidates were supplied")]
    NoCandidates,
}

/// Coarse classification of errors, used for retry decisions and for
/// ranking failures across connection candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Authentication,
    Protocol,
    Device,
    Config,
    Session,
}

impl ErrorKind {
    /// Significance when several candidates fail. A failed connection
    /// attempt outranks a candidate that could not even be configured.
    pub fn rank(self) -> u8 {
        match self {
            ErrorKind::Transport | ErrorKind::Authentication | ErrorKind::Protocol => 2,
            ErrorKind::Config => 1,
            ErrorKind::Device | ErrorKind::Session => 0,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Device => "device",
            ErrorKind::Config => "configuration",
            ErrorKind::Session => "session",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(TransportError::AuthenticationFailed { .. }) => {
                ErrorKind::Authentication
            }
            Error::Transport(_) => ErrorKind::Transport,
            Error::Framing(_) | Error::Parse(_) => ErrorKind::Protocol,
            Error::Rpc { .. } => ErrorKind::Device,
            Error::Session(SessionError::InvalidConfig { .. }) => ErrorKind::Config,
            Error::Session(_) => ErrorKind::Session,
            Error::Aggregate { kind, .. } => *kind,
        }
    }

    /// Whether the error means the channel went away underneath us, which
    /// is the only condition that earns a reconnect-and-retry.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Error::Transport(
                TransportError::Disconnected
                    | TransportError::Io(_)
                    | TransportError::Ssh(russh::Error::Disconnect)
                    | TransportError::Ssh(russh::Error::SendError)
                    | TransportError::Ssh(russh::Error::IO(_))
            )
        )
    }

    /// Collapse the failures of several connection candidates into one.
    ///
    /// The most significant kind wins. A single failure of that kind is
    /// returned untouched; several failures sharing a kind are reported
    /// under it; mixed causes fall back to a generic transport aggregate.
    pub fn aggregate(errors: Vec<Error>) -> Error {
        let Some(top) = errors.iter().map(|e| e.kind().rank()).max() else {
            return SessionError::NoCandidates.into();
        };

        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        let mut significant: Vec<Error> = errors
            .into_iter()
            .filter(|e| e.kind().rank() == top)
            .collect();

        if significant.len() == 1 {
            return significant.remove(0);
        }

        let first = significant[0].kind();
        let kind = if significant.iter().all(|e| e.kind() == first) {
            first
        } else if top == 2 {
            ErrorKind::Transport
        } else {
            first
        };

        Error::Aggregate { kind, messages }
    }
}

/// Result type alias using ferrisconf's Error.
pub type Result<T> = std::result::Result<T, Error>;
