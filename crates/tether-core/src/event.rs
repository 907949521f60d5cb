//! Endpoint events and the event bus that delivers them.
//!
//! Every occurrence on an endpoint is published as one [`EndpointEvent`].
//! Delivery goes through an [`EventBus`] with two statically-typed
//! subscriber kinds:
//!
//! 1. **Relay subscriber** ([`EventSink`]): receives every event, in order.
//!    Usually the sending half of a channel drained by the tunnel
//!    orchestrator. The slot defaults to [`NoopSink`], which drops events.
//! 2. **Lifecycle subscriber** ([`EndpointListener`]): a non-owning handle to
//!    the orchestrator, called directly when the endpoint becomes
//!    disconnected.
//!
//! Dispatch is two-stage: the sink sees an event before the listener does,
//! so an orchestrator never receives the direct callback ahead of the
//! channel notification for the same occurrence.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use bytes::Bytes;
use tether_proto::{ConnectRequest, ConnectResponse};
use tokio::sync::mpsc;

use crate::transport::{EndpointId, Tag};

/// Events published by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// The endpoint was activated by the orchestrator
    Opened {
        /// Publishing endpoint
        endpoint: EndpointId,
    },

    /// A connect request was recorded on the endpoint
    RequestReceived {
        /// The recorded request
        request: ConnectRequest,
        /// Publishing endpoint
        endpoint: EndpointId,
    },

    /// The paired remote-facing endpoint produced a connect response
    ResponseReceived {
        /// The forwarded response
        response: ConnectResponse,
        /// Publishing endpoint
        endpoint: EndpointId,
    },

    /// The endpoint is ready for the orchestrator to start relaying bytes
    ReadyForForward {
        /// Publishing endpoint
        endpoint: EndpointId,
    },

    /// A read completed
    DataRead {
        /// Bytes read
        buffer: Bytes,
        /// Tag of the originating read
        tag: Tag,
        /// Publishing endpoint
        endpoint: EndpointId,
    },

    /// A write completed
    DataWritten {
        /// Bytes written, when the transport kept them
        buffer: Option<Bytes>,
        /// Tag of the originating write
        tag: Tag,
        /// Publishing endpoint
        endpoint: EndpointId,
    },

    /// Graceful close was requested; the transport has not confirmed yet
    DisconnectRequested {
        /// Publishing endpoint
        endpoint: EndpointId,
    },

    /// Forced close was requested; the transport has not confirmed yet
    ForceDisconnectRequested {
        /// Publishing endpoint
        endpoint: EndpointId,
    },

    /// The transport confirmed the connection is gone
    Disconnected {
        /// Publishing endpoint
        endpoint: EndpointId,
        /// Failure cause when the endpoint ended in a fault
        reason: Option<String>,
    },
}

impl EndpointEvent {
    /// Endpoint that published this event
    #[must_use]
    pub fn endpoint(&self) -> EndpointId {
        match self {
            Self::Opened { endpoint }
            | Self::RequestReceived { endpoint, .. }
            | Self::ResponseReceived { endpoint, .. }
            | Self::ReadyForForward { endpoint }
            | Self::DataRead { endpoint, .. }
            | Self::DataWritten { endpoint, .. }
            | Self::DisconnectRequested { endpoint }
            | Self::ForceDisconnectRequested { endpoint }
            | Self::Disconnected { endpoint, .. } => *endpoint,
        }
    }

    /// True for the single terminal event an endpoint ever publishes
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

/// Relay subscriber: receives every event an endpoint publishes.
pub trait EventSink {
    /// Deliver one event. Must not call back into the publishing endpoint.
    fn publish(&mut self, event: EndpointEvent);
}

/// Sink for endpoints with no observer. Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&mut self, _event: EndpointEvent) {}
}

/// Single-consumer channel sink.
///
/// A closed receiver means the orchestrator went away; events are dropped.
impl EventSink for mpsc::UnboundedSender<EndpointEvent> {
    fn publish(&mut self, event: EndpointEvent) {
        if let Err(mpsc::error::SendError(event)) = self.send(event) {
            tracing::trace!(endpoint = %event.endpoint(), "event receiver closed, dropping event");
        }
    }
}

/// Lifecycle subscriber: notified directly when an endpoint is disconnected.
///
/// Implementors are usually the tunnel orchestrator, which owns both
/// endpoints. Methods take `&self`; an orchestrator shared across endpoints
/// uses its own interior mutability.
pub trait EndpointListener: Send + Sync {
    /// The endpoint reached a terminal state. `reason` is set when the
    /// transport faulted.
    fn endpoint_disconnected(&self, endpoint: EndpointId, reason: Option<&str>);
}

/// Two-stage event dispatcher owned by one endpoint.
pub struct EventBus {
    sink: Box<dyn EventSink + Send>,
    listener: Option<Weak<dyn EndpointListener>>,
}

impl EventBus {
    /// Bus with an empty sink slot and no listener
    pub fn new() -> Self {
        Self { sink: Box::new(NoopSink), listener: None }
    }

    /// Bus publishing to `sink`
    pub fn with_sink(sink: impl EventSink + Send + 'static) -> Self {
        Self { sink: Box::new(sink), listener: None }
    }

    /// Bus publishing to a fresh unbounded channel, returning its receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EndpointEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sink(tx), rx)
    }

    /// Attach the lifecycle listener. Only a weak handle is kept.
    pub fn set_listener<L: EndpointListener + 'static>(&mut self, listener: &Arc<L>) {
        let weak: Weak<dyn EndpointListener> = Arc::downgrade(listener) as Weak<dyn EndpointListener>;
        self.listener = Some(weak);
    }

    /// Detach the lifecycle listener
    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    /// True if a listener is attached and still alive
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| l.strong_count() > 0)
    }

    /// Publish `event` to the sink, then notify the listener if the event is
    /// terminal.
    pub fn dispatch(&mut self, event: EndpointEvent) {
        let terminal = match &event {
            EndpointEvent::Disconnected { endpoint, reason } => Some((*endpoint, reason.clone())),
            _ => None,
        };

        self.sink.publish(event);

        if let Some((endpoint, reason)) = terminal {
            match self.listener.as_ref().and_then(Weak::upgrade) {
                Some(listener) => listener.endpoint_disconnected(endpoint, reason.as_deref()),
                None => tracing::trace!(endpoint = %endpoint, "no live listener for disconnect"),
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("has_listener", &self.has_listener()).finish()
    }
}
