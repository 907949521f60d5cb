//! Raw transport contract.
//!
//! A raw transport is an asynchronous, tag-correlated byte-stream socket. The
//! endpoint issues commands through [`RawTransport`]; the transport reports
//! completions later by handing [`TransportEvent`]s to
//! [`Endpoint::handle_transport_event`](crate::endpoint::Endpoint::handle_transport_event).
//!
//! # Contract
//!
//! - Commands never block and never return a result synchronously.
//! - At most one read and one write may be outstanding at a time. The
//!   endpoint enforces this before a command reaches the transport.
//! - Every accepted read or write eventually completes, or the connection
//!   dies and a [`TransportEvent::Disconnected`] / [`TransportEvent::Fault`]
//!   is delivered instead.
//! - Events for one transport are delivered in the order they happened, on
//!   the same serial context the commands are issued from.
//!
//! # Implementations
//!
//! - **`SocketTransport`** (tether-harness): Tokio task driving a byte stream
//!   (Turmoil TCP in simulation)
//! - **`RecordingTransport`** (tether-harness): test double that records
//!   every command

use std::fmt;

use bytes::Bytes;

/// Opaque correlation token supplied with a read or write command and echoed
/// back on its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u64);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of an endpoint, equal to the identity of the transport it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep-{}", self.0)
    }
}

/// Commands accepted by an asynchronous byte-stream socket.
pub trait RawTransport {
    /// Stable identity of the underlying connection.
    fn id(&self) -> EndpointId;

    /// Begin reading the next available chunk of data.
    ///
    /// Completion is reported as [`TransportEvent::ReadCompleted`] carrying
    /// the same `tag`.
    fn start_read(&mut self, tag: Tag);

    /// Begin writing `buffer`.
    ///
    /// Completion is reported as [`TransportEvent::WriteCompleted`] carrying
    /// the same `tag`.
    fn write(&mut self, buffer: Bytes, tag: Tag);

    /// Close gracefully: flush pending writes, then shut the stream down.
    fn disconnect(&mut self);

    /// Close immediately, discarding anything not yet written.
    fn force_disconnect(&mut self);
}

/// Completion notifications delivered by a raw transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Outbound connect finished. Never meaningful for the client-facing
    /// endpoint, which always wraps an already-connected socket.
    Connected,

    /// The connection is gone (graceful close, forced close, or peer hang-up)
    Disconnected,

    /// A read finished
    ReadCompleted {
        /// Bytes read
        buffer: Bytes,
        /// Tag of the originating read command
        tag: Tag,
    },

    /// A write finished
    WriteCompleted {
        /// Bytes written, if the transport kept them. Transports may drop
        /// the buffer to save memory.
        buffer: Option<Bytes>,
        /// Tag of the originating write command
        tag: Tag,
    },

    /// Unrecoverable transport failure
    Fault {
        /// Human-readable cause
        reason: String,
    },
}

impl TransportEvent {
    /// Short name used in logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::ReadCompleted { .. } => "read_completed",
            Self::WriteCompleted { .. } => "write_completed",
            Self::Fault { .. } => "fault",
        }
    }
}
