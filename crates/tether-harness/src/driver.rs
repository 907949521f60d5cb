//! Serial driver: feeds transport completions into an endpoint.
//!
//! The endpoint must see every command and every completion on one serial
//! context. These helpers are meant to be awaited from the task that owns
//! the endpoint, interleaved with the orchestrator's own commands.

use tether_core::{
    endpoint::Endpoint,
    transport::{RawTransport, TransportEvent},
};
use tokio::sync::mpsc;

/// Reason reported when a socket task disappears without a terminal event.
pub const TASK_EXITED: &str = "socket task exited";

/// Deliver `event` (or the loss of the completion channel) to `endpoint`.
///
/// Returns `false` once no further completions can arrive.
pub fn deliver<T: RawTransport>(endpoint: &mut Endpoint<T>, event: Option<TransportEvent>) -> bool {
    match event {
        Some(event) => {
            endpoint.handle_transport_event(event);
            true
        },
        None => {
            if !endpoint.is_disconnected() {
                tracing::warn!(endpoint = %endpoint.id(), "completion channel closed early");
                endpoint.handle_transport_event(TransportEvent::Fault {
                    reason: TASK_EXITED.to_string(),
                });
            }
            false
        },
    }
}

/// Wait for the next completion and deliver it.
///
/// Returns `false` once no further completions can arrive.
pub async fn step<T: RawTransport>(
    endpoint: &mut Endpoint<T>,
    completions: &mut mpsc::UnboundedReceiver<TransportEvent>,
) -> bool {
    let event = completions.recv().await;
    deliver(endpoint, event)
}

/// Deliver completions until the endpoint is disconnected.
pub async fn drive<T: RawTransport>(
    endpoint: &mut Endpoint<T>,
    completions: &mut mpsc::UnboundedReceiver<TransportEvent>,
) {
    while !endpoint.is_disconnected() && step(endpoint, completions).await {}
}
