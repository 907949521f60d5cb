//! Error types for the endpoint state machine.
//!
//! Endpoint commands fail fast on caller contract violations and leave the
//! endpoint untouched. Transport failures are not errors at this layer: they
//! arrive as [`TransportEvent::Fault`](crate::transport::TransportEvent::Fault)
//! and surface as a `Disconnected` event with a reason.

use std::io;

use thiserror::Error;

use crate::{endpoint::EndpointState, transport::Tag};

/// Errors returned by endpoint commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// Command issued after the endpoint reached a terminal state
    #[error("invalid state: cannot {operation} while {state:?}")]
    InvalidState {
        /// State when the command was issued
        state: EndpointState,
        /// Command that was attempted
        operation: &'static str,
    },

    /// A read was issued while another read was still outstanding
    #[error("read {outstanding} still outstanding, rejected read {rejected}")]
    ReadInFlight {
        /// Tag of the read that has not completed
        outstanding: Tag,
        /// Tag of the rejected read
        rejected: Tag,
    },

    /// A write was issued while another write was still outstanding
    #[error("write {outstanding} still outstanding, rejected write {rejected}")]
    WriteInFlight {
        /// Tag of the write that has not completed
        outstanding: Tag,
        /// Tag of the rejected write
        rejected: Tag,
    },

    /// A connect request was already recorded on this endpoint
    #[error("handshake request already recorded")]
    RequestAlreadySet,

    /// Underlying transport error, converted at an I/O boundary
    #[error("transport error: {message}")]
    Transport {
        /// Kind of the originating I/O error
        kind: io::ErrorKind,
        /// Message of the originating I/O error
        message: String,
    },
}

impl EndpointError {
    /// Returns true if this error is a caller contract violation.
    ///
    /// Caller errors never change endpoint state; retrying the same command
    /// after the outstanding operation completes is valid.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, EndpointError::Transport { .. })
    }
}

/// Boundary conversion for async I/O APIs.
impl From<EndpointError> for io::Error {
    fn from(err: EndpointError) -> Self {
        let kind = match &err {
            EndpointError::InvalidState { .. } => io::ErrorKind::NotConnected,
            EndpointError::ReadInFlight { .. } | EndpointError::WriteInFlight { .. } => {
                io::ErrorKind::WouldBlock
            },
            EndpointError::RequestAlreadySet => io::ErrorKind::AlreadyExists,
            EndpointError::Transport { kind, .. } => *kind,
        };
        io::Error::new(kind, err.to_string())
    }
}

impl From<io::Error> for EndpointError {
    fn from(err: io::Error) -> Self {
        EndpointError::Transport { kind: err.kind(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_violations_are_caller_errors() {
        assert!(
            EndpointError::InvalidState { state: EndpointState::Closed, operation: "open" }
                .is_caller_error()
        );
        assert!(EndpointError::ReadInFlight { outstanding: Tag(1), rejected: Tag(2) }.is_caller_error());
        assert!(EndpointError::WriteInFlight { outstanding: Tag(1), rejected: Tag(2) }.is_caller_error());
        assert!(EndpointError::RequestAlreadySet.is_caller_error());
        assert!(
            !EndpointError::Transport {
                kind: io::ErrorKind::ConnectionReset,
                message: "reset".to_string()
            }
            .is_caller_error()
        );
    }

    #[test]
    fn io_conversion_keeps_kind_and_message() {
        let err: io::Error =
            EndpointError::InvalidState { state: EndpointState::Invalid, operation: "send_data" }
                .into();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert_eq!(err.to_string(), "invalid state: cannot send_data while Invalid");

        let err: io::Error = EndpointError::ReadInFlight { outstanding: Tag(4), rejected: Tag(5) }.into();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(err.to_string(), "read #4 still outstanding, rejected read #5");
    }

    #[test]
    fn io_errors_become_transport_errors() {
        let err = EndpointError::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        assert_eq!(err, EndpointError::Transport {
            kind: io::ErrorKind::BrokenPipe,
            message: "pipe closed".to_string()
        });

        // Kind survives the trip back to io::Error
        let back: io::Error = err.into();
        assert_eq!(back.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(back.to_string(), "transport error: pipe closed");
    }
}
