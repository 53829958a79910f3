use thiserror::Error;

/// Fatal errors: whenever one of them is returned, the connection it comes
/// from must be dropped. Authentication rejections are not errors, see
/// [`crate::fail::AuthFail`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("dovecot-sasl: connection closed")]
    Closed,

    #[error("dovecot-sasl: i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dovecot-sasl: no line received before the deadline")]
    Timeout,

    #[error("dovecot-sasl: malformed line: {0}")]
    MalformedLine(String),

    #[error("dovecot-sasl: unexpected command: {0}")]
    UnexpectedCommand(String),

    #[error("dovecot-sasl: not enough params for {command}: {got}")]
    MissingParams { command: String, got: usize },

    #[error("dovecot-sasl: incompatible {peer} version: {major}.{minor}")]
    IncompatibleVersion {
        peer: &'static str,
        major: String,
        minor: String,
    },

    #[error("dovecot-sasl: handshake is missing {0}")]
    MissingHandshakeField(&'static str),

    #[error("dovecot-sasl: missing mechanism name")]
    MissingMechanismName,

    #[error("dovecot-sasl: request ID mismatch, sent {sent}, received {received}")]
    RequestIdMismatch { sent: String, received: String },

    #[error("dovecot-sasl: malformed request: {0}")]
    MalformedRequest(String),

    #[error("dovecot-sasl: malformed continuation data: {0}")]
    MalformedContinuation(#[from] base64::DecodeError),

    #[error("dovecot-sasl: unsupported mechanism: {0}")]
    UnsupportedMechanism(String),

    #[error("dovecot-sasl: mechanism error: {0}")]
    Mechanism(#[source] anyhow::Error),
}

impl Error {
    /// The peer went away cleanly, nothing worth reporting.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
