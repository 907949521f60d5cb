//! Client-facing socket endpoint.
//!
//! This module implements the endpoint that terminates the client side of a
//! relayed TCP connection: it wraps one [`RawTransport`], owns the lifecycle
//! state, forwards read/write/teardown commands, and translates every
//! transport completion into one [`EndpointEvent`].
//!
//! # State Machine
//!
//! ```text
//!                 disconnect() /
//!                 force_disconnect()
//! ┌─────────────┐                  ┌───────────────┐  Disconnected  ┌────────┐
//! │ Established │─────────────────>│ Disconnecting │───────────────>│ Closed │
//! └─────────────┘                  └───────────────┘                └────────┘
//!        │  │                              │
//!        │  └──────── Disconnected (peer hang-up) ─────────────────────↑
//!        │                                 │
//!        │ Fault                           │ Fault
//!        ↓                                 ↓
//!   ┌─────────┐                       ┌─────────┐
//!   │ Invalid │                       │ Invalid │
//!   └─────────┘                       └─────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. **Established**: wraps an already-connected socket; all commands valid
//! 2. **Disconnecting**: teardown requested, waiting for the transport to
//!    confirm; I/O commands are still forwarded so pending data can drain
//! 3. **Closed**: the transport confirmed the connection is gone
//! 4. **Invalid**: the transport faulted; treated like Closed for relaying
//!
//! Closed and Invalid are terminal. Commands other than teardown fail with
//! [`EndpointError::InvalidState`]; teardown commands are no-ops.
//!
//! # I/O Discipline
//!
//! One read and one write may be outstanding. A second read (or write)
//! before the first completes is rejected with
//! [`EndpointError::ReadInFlight`] (or [`EndpointError::WriteInFlight`])
//! without reaching the transport or touching state. There is no buffering,
//! retry or backpressure here; that belongs to the orchestrator.

use bytes::Bytes;
use tether_proto::{ConnectRequest, ConnectResponse};

use crate::{
    error::EndpointError,
    event::{EndpointEvent, EndpointListener, EventBus},
    transport::{EndpointId, RawTransport, Tag, TransportEvent},
};

/// Endpoint lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointState {
    /// Connected and usable (initial state)
    Established,
    /// Teardown requested, transport has not confirmed yet
    Disconnecting,
    /// Transport confirmed disconnection
    Closed,
    /// Transport reported an unrecoverable fault
    Invalid,
}

impl EndpointState {
    /// True for Closed and Invalid
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Invalid)
    }

    /// True if `self -> next` is a forward transition
    #[must_use]
    pub fn can_transition_to(self, next: EndpointState) -> bool {
        matches!(
            (self, next),
            (Self::Established, Self::Disconnecting)
                | (Self::Established | Self::Disconnecting, Self::Closed)
                | (Self::Established | Self::Disconnecting, Self::Invalid)
        )
    }
}

/// Socket endpoint wrapping one raw transport.
///
/// All methods take `&mut self`: the endpoint must live on a single serial
/// execution context (one task, one actor, or one mutex), and both commands
/// and transport completions are delivered there.
#[derive(Debug)]
pub struct Endpoint<T: RawTransport> {
    /// Underlying connection. Never swapped.
    transport: T,
    /// Cached transport identity
    id: EndpointId,
    /// Current lifecycle state
    state: EndpointState,
    /// Connect request recorded before the remote adapter exists
    request: Option<ConnectRequest>,
    /// Tag of the read awaiting completion
    read_in_flight: Option<Tag>,
    /// Tag of the write awaiting completion
    write_in_flight: Option<Tag>,
    /// Event delivery
    bus: EventBus,
}

impl<T: RawTransport> Endpoint<T> {
    /// Wrap an established transport, publishing events on `bus`.
    pub fn new(transport: T, bus: EventBus) -> Self {
        let id = transport.id();
        Self {
            transport,
            id,
            state: EndpointState::Established,
            request: None,
            read_in_flight: None,
            write_in_flight: None,
            bus,
        }
    }

    /// Endpoint identity (the transport's identity)
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// True once the transport confirmed disconnection or faulted.
    ///
    /// Pure query; never drives a transition.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.state.is_terminal()
    }

    /// Connect request recorded on this endpoint, if any
    #[must_use]
    pub fn handshake_request(&self) -> Option<&ConnectRequest> {
        self.request.as_ref()
    }

    /// Tag of the outstanding read, if any
    #[must_use]
    pub fn outstanding_read(&self) -> Option<Tag> {
        self.read_in_flight
    }

    /// Tag of the outstanding write, if any
    #[must_use]
    pub fn outstanding_write(&self) -> Option<Tag> {
        self.write_in_flight
    }

    /// Read-only access to the wrapped transport
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Attach the lifecycle listener (weakly held)
    pub fn set_listener<L: EndpointListener + 'static>(&mut self, listener: &std::sync::Arc<L>) {
        self.bus.set_listener(listener);
    }

    /// Detach the lifecycle listener
    pub fn clear_listener(&mut self) {
        self.bus.clear_listener();
    }

    /// Activate the endpoint and announce it with [`EndpointEvent::Opened`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the endpoint is Closed or Invalid.
    pub fn open(&mut self) -> Result<(), EndpointError> {
        self.ensure_live("open")?;
        self.bus.dispatch(EndpointEvent::Opened { endpoint: self.id });
        Ok(())
    }

    /// Record the connect request parsed upstream and announce it with
    /// [`EndpointEvent::RequestReceived`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the endpoint is Closed or Invalid, and
    /// `RequestAlreadySet` if a request was already recorded.
    pub fn set_handshake_request(&mut self, request: ConnectRequest) -> Result<(), EndpointError> {
        self.ensure_live("set_handshake_request")?;

        if self.request.is_some() {
            tracing::warn!(endpoint = %self.id, "handshake request recorded twice");
            return Err(EndpointError::RequestAlreadySet);
        }

        self.request = Some(request.clone());
        self.bus.dispatch(EndpointEvent::RequestReceived { request, endpoint: self.id });
        Ok(())
    }

    /// Forward the remote-facing endpoint's connect response as
    /// [`EndpointEvent::ResponseReceived`]. The state does not change.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the endpoint is Closed or Invalid.
    pub fn forward_handshake_response(
        &mut self,
        response: ConnectResponse,
    ) -> Result<(), EndpointError> {
        self.ensure_live("forward_handshake_response")?;
        self.bus.dispatch(EndpointEvent::ResponseReceived { response, endpoint: self.id });
        Ok(())
    }

    /// Announce that the endpoint is ready for byte relaying with
    /// [`EndpointEvent::ReadyForForward`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the endpoint is Closed or Invalid.
    pub fn ready_to_forward(&mut self) -> Result<(), EndpointError> {
        self.ensure_live("ready_to_forward")?;
        self.bus.dispatch(EndpointEvent::ReadyForForward { endpoint: self.id });
        Ok(())
    }

    /// Forward a read command tagged with `tag`.
    ///
    /// Completion arrives later as [`EndpointEvent::DataRead`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` in a terminal state, or `ReadInFlight` if a read
    /// is already outstanding. Nothing reaches the transport in either case.
    pub fn start_reading(&mut self, tag: Tag) -> Result<(), EndpointError> {
        self.ensure_live("start_reading")?;

        if let Some(outstanding) = self.read_in_flight {
            tracing::warn!(endpoint = %self.id, %outstanding, rejected = %tag, "overlapping read");
            return Err(EndpointError::ReadInFlight { outstanding, rejected: tag });
        }

        self.read_in_flight = Some(tag);
        self.transport.start_read(tag);
        Ok(())
    }

    /// Forward a write command for `buffer` tagged with `tag`.
    ///
    /// Completion arrives later as [`EndpointEvent::DataWritten`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` in a terminal state, or `WriteInFlight` if a
    /// write is already outstanding. Nothing reaches the transport in either
    /// case.
    pub fn send_data(&mut self, buffer: Bytes, tag: Tag) -> Result<(), EndpointError> {
        self.ensure_live("send_data")?;

        if let Some(outstanding) = self.write_in_flight {
            tracing::warn!(endpoint = %self.id, %outstanding, rejected = %tag, "overlapping write");
            return Err(EndpointError::WriteInFlight { outstanding, rejected: tag });
        }

        self.write_in_flight = Some(tag);
        self.transport.write(buffer, tag);
        Ok(())
    }

    /// Request graceful teardown.
    ///
    /// From Established: moves to Disconnecting, forwards the close to the
    /// transport and publishes [`EndpointEvent::DisconnectRequested`] before
    /// the transport confirms anything. In any other state this is a no-op.
    pub fn disconnect(&mut self) {
        if self.state != EndpointState::Established {
            tracing::debug!(endpoint = %self.id, state = ?self.state, "disconnect absorbed");
            return;
        }

        self.transition(EndpointState::Disconnecting);
        self.transport.disconnect();
        self.bus.dispatch(EndpointEvent::DisconnectRequested { endpoint: self.id });
    }

    /// Request forced teardown.
    ///
    /// Same as [`disconnect`](Self::disconnect) but forwards a forced close
    /// and publishes [`EndpointEvent::ForceDisconnectRequested`]. Completion is
    /// reported exactly like the graceful path.
    pub fn force_disconnect(&mut self) {
        if self.state != EndpointState::Established {
            tracing::debug!(endpoint = %self.id, state = ?self.state, "force_disconnect absorbed");
            return;
        }

        self.transition(EndpointState::Disconnecting);
        self.transport.force_disconnect();
        self.bus.dispatch(EndpointEvent::ForceDisconnectRequested { endpoint: self.id });
    }

    /// Translate one transport completion into endpoint state and events.
    ///
    /// - `Connected` is accepted and ignored (this endpoint never dials out)
    /// - `ReadCompleted` / `WriteCompleted` clear the outstanding slot and
    ///   publish `DataRead` / `DataWritten`
    /// - `Disconnected` moves a live endpoint to Closed and publishes
    ///   `Disconnected`
    /// - `Fault` moves a live endpoint to Invalid and publishes `Disconnected`
    ///   with the fault reason
    ///
    /// A `Disconnected` or `Fault` arriving when the endpoint is already
    /// terminal is absorbed so exactly one terminal event is ever published.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                tracing::debug!(endpoint = %self.id, "connect completion ignored");
            },

            TransportEvent::ReadCompleted { buffer, tag } => {
                let outstanding = self.read_in_flight.take();
                if outstanding != Some(tag) && !self.state.is_terminal() {
                    tracing::warn!(
                        endpoint = %self.id,
                        completed = %tag,
                        outstanding = ?outstanding,
                        "read completion does not match outstanding read"
                    );
                }

                self.bus.dispatch(EndpointEvent::DataRead { buffer, tag, endpoint: self.id });
            },

            TransportEvent::WriteCompleted { buffer, tag } => {
                let outstanding = self.write_in_flight.take();
                if outstanding != Some(tag) && !self.state.is_terminal() {
                    tracing::warn!(
                        endpoint = %self.id,
                        completed = %tag,
                        outstanding = ?outstanding,
                        "write completion does not match outstanding write"
                    );
                }

                self.bus.dispatch(EndpointEvent::DataWritten { buffer, tag, endpoint: self.id });
            },

            TransportEvent::Disconnected => self.terminate(EndpointState::Closed, None),

            TransportEvent::Fault { reason } => {
                self.terminate(EndpointState::Invalid, Some(reason));
            },
        }
    }

    fn terminate(&mut self, to: EndpointState, reason: Option<String>) {
        if self.state.is_terminal() {
            tracing::debug!(
                endpoint = %self.id,
                state = ?self.state,
                reason = ?reason,
                "terminal notification absorbed"
            );
            return;
        }

        self.transition(to);

        // Disconnection cancels whatever was outstanding
        self.read_in_flight = None;
        self.write_in_flight = None;

        self.bus.dispatch(EndpointEvent::Disconnected { endpoint: self.id, reason });
    }

    fn transition(&mut self, to: EndpointState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "illegal transition {:?} -> {:?}",
            self.state,
            to
        );

        tracing::debug!(endpoint = %self.id, from = ?self.state, to = ?to, "state transition");
        self.state = to;
    }

    fn ensure_live(&self, operation: &'static str) -> Result<(), EndpointError> {
        if self.state.is_terminal() {
            return Err(EndpointError::InvalidState { state: self.state, operation });
        }
        Ok(())
    }
}
