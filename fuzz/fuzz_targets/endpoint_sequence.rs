//! Command/callback sequence fuzzer for the endpoint state machine
//!
//! Each input byte selects one step: an orchestrator command or a transport
//! callback (including callbacks the transport should never send, like a
//! completion with no outstanding operation). After every step the target
//! checks:
//! - State never moves backward
//! - `is_disconnected` is true only after a transport Disconnected/Fault
//! - Only one terminal event is ever published
//! - The transport sees at most one teardown request
//!
//! Any trailing bytes after a 0xFF marker are fed to the handshake decoders,
//! which must reject garbage without panicking.

#![no_main]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tether_core::{
    endpoint::{Endpoint, EndpointState},
    event::{EndpointEvent, EventBus, EventSink},
    transport::{EndpointId, RawTransport, Tag, TransportEvent},
};
use tether_proto::{ConnectRequest, ConnectResponse, Target};

#[derive(Default)]
struct Teardowns(usize);

impl RawTransport for Teardowns {
    fn id(&self) -> EndpointId {
        EndpointId(9)
    }

    fn start_read(&mut self, _tag: Tag) {}

    fn write(&mut self, _buffer: Bytes, _tag: Tag) {}

    fn disconnect(&mut self) {
        self.0 += 1;
    }

    fn force_disconnect(&mut self) {
        self.0 += 1;
    }
}

#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<EndpointEvent>>>);

impl EventSink for Collect {
    fn publish(&mut self, event: EndpointEvent) {
        self.0.lock().unwrap().push(event);
    }
}

fn rank(state: EndpointState) -> u8 {
    match state {
        EndpointState::Established => 0,
        EndpointState::Disconnecting => 1,
        EndpointState::Closed | EndpointState::Invalid => 2,
    }
}

fuzz_target!(|data: &[u8]| {
    let (steps, trailer) = match data.iter().position(|&b| b == 0xFF) {
        Some(split) => (&data[..split], &data[split + 1..]),
        None => (data, &[][..]),
    };

    let sink = Collect::default();
    let mut ep = Endpoint::new(Teardowns::default(), EventBus::with_sink(sink.clone()));
    let mut confirmed = false;

    for (i, &byte) in steps.iter().enumerate() {
        let before = ep.state();
        let tag = Tag(u64::from(byte >> 4));

        match byte % 12 {
            0 => {
                let _ = ep.open();
            },
            1 => {
                let _ = ep.start_reading(tag);
            },
            2 => {
                let _ = ep.send_data(Bytes::copy_from_slice(&steps[..i]), tag);
            },
            3 => ep.disconnect(),
            4 => ep.force_disconnect(),
            5 => {
                let _ = ep.ready_to_forward();
            },
            6 => {
                let _ = ep.forward_handshake_response(ConnectResponse::success(None));
            },
            7 => {
                let request = ConnectRequest::new(Target::Domain { host: "fuzz".into(), port: 1 });
                let _ = ep.set_handshake_request(request);
            },
            8 => ep.handle_transport_event(TransportEvent::ReadCompleted {
                buffer: Bytes::copy_from_slice(&steps[i..]),
                tag,
            }),
            9 => ep.handle_transport_event(TransportEvent::WriteCompleted { buffer: None, tag }),
            10 => {
                ep.handle_transport_event(TransportEvent::Disconnected);
                confirmed = true;
            },
            _ => {
                ep.handle_transport_event(TransportEvent::Fault { reason: "fuzz".into() });
                confirmed = true;
            },
        }

        assert!(rank(ep.state()) >= rank(before), "{before:?} -> {:?}", ep.state());
        assert_eq!(ep.is_disconnected(), confirmed);
        if ep.state().is_terminal() {
            assert_eq!(ep.outstanding_read(), None);
            assert_eq!(ep.outstanding_write(), None);
        }
    }

    let events = sink.0.lock().unwrap();
    assert!(events.iter().filter(|e| e.is_terminal()).count() <= 1);
    assert!(ep.transport().0 <= 1);

    let _ = ConnectRequest::decode(trailer);
    let _ = ConnectResponse::decode(trailer);
    if let Ok(text) = std::str::from_utf8(trailer) {
        let _ = Target::parse(text);
    }
});
