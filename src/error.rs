use std::fmt::Display;
use std::io;

/// A specialized error type for WAL roller operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RollerError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The log writer could not be closed during rotation.
    #[error("failed to close log writer: {0}")]
    CloseFailed(String),
    /// Connectivity to the storage layer was lost during rotation.
    #[error("connection error: {0}")]
    Connection(String),
    /// An error reported by a remote peer, wrapping the underlying cause.
    #[error("remote error: {0}")]
    Remote(#[source] Box<RollerError>),
    /// Configuration value was invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Invalid state transition or operation.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A generic error occurred.
    #[error("other error: {0}")]
    Other(String),
}

impl RollerError {
    /// Create a close-failure error from a displayable value.
    pub fn close_failed<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::CloseFailed(msg.to_string())
    }

    /// Create a connection error from a displayable value.
    pub fn connection<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Connection(msg.to_string())
    }

    /// Wrap an error as remote-reported.
    pub fn remote(cause: RollerError) -> Self {
        Self::Remote(Box::new(cause))
    }

    /// Create an invalid configuration error from a displayable value.
    pub fn invalid_config<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::InvalidConfig(msg.to_string())
    }

    /// Create an invalid state error from a displayable value.
    pub fn invalid_state<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::InvalidState(msg.to_string())
    }

    /// Create an opaque error from a displayable value.
    pub fn other<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Other(msg.to_string())
    }

    /// Strip any remote wrapping and return the underlying cause.
    pub fn root_cause(self) -> Self {
        let mut err = self;
        while let Self::Remote(inner) = err {
            err = *inner;
        }
        err
    }

    /// True when the error indicates lost connectivity to the storage layer.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Io(err) => is_connection_io_error(err),
            _ => false,
        }
    }
}

fn is_connection_io_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
    )
}

/// A Result type alias for WAL roller operations.
pub type RollerResult<T> = Result<T, RollerError>;
