//! Test-double transport that records commands.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tether_core::transport::{EndpointId, RawTransport, Tag};

/// One command observed by a [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `start_read(tag)`
    StartRead(Tag),
    /// `write(buffer, tag)`
    Write(Bytes, Tag),
    /// `disconnect()`
    Disconnect,
    /// `force_disconnect()`
    ForceDisconnect,
}

/// Shared view of the commands a [`RecordingTransport`] received.
///
/// Clones observe the same log, so a test can keep one while the endpoint
/// owns the transport.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl CallLog {
    /// Snapshot of all recorded calls, in order
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().clone()
    }

    /// Number of recorded `disconnect()` and `force_disconnect()` calls
    pub fn teardown_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|c| matches!(c, TransportCall::Disconnect | TransportCall::ForceDisconnect))
            .count()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, call: TransportCall) {
        self.lock().push(call);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TransportCall>> {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Transport that records every command and performs no I/O.
///
/// Completions are injected by the test through
/// `Endpoint::handle_transport_event`.
#[derive(Debug)]
pub struct RecordingTransport {
    id: EndpointId,
    log: CallLog,
}

impl RecordingTransport {
    /// New transport with identity `id` and its call log
    pub fn new(id: EndpointId) -> (Self, CallLog) {
        let log = CallLog::default();
        (Self { id, log: log.clone() }, log)
    }
}

impl RawTransport for RecordingTransport {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn start_read(&mut self, tag: Tag) {
        self.log.push(TransportCall::StartRead(tag));
    }

    fn write(&mut self, buffer: Bytes, tag: Tag) {
        self.log.push(TransportCall::Write(buffer, tag));
    }

    fn disconnect(&mut self) {
        self.log.push(TransportCall::Disconnect);
    }

    fn force_disconnect(&mut self) {
        self.log.push(TransportCall::ForceDisconnect);
    }
}
