//! # Tether Protocol: Handshake Messages
//!
//! A tether endpoint sits on the client-facing side of a relayed TCP
//! connection. Before any bytes are relayed, two values cross it exactly
//! once:
//!
//! - **[`ConnectRequest`]**: produced upstream (by whatever proxy dialect
//!   parsed the client's greeting) and recorded on the local endpoint.
//! - **[`ConnectResponse`]**: produced by the remote-facing adapter once the
//!   outbound connection succeeded or failed, and forwarded back through the
//!   local endpoint.
//!
//! The endpoint never inspects these fields. They live in their own crate so
//! the orchestrator, the dialect parsers and the test harness share one
//! definition.
//!
//! ## Encoding
//!
//! Messages are CBOR-encoded so optional fields can be added without breaking
//! older peers. Decoding enforces [`MAX_MESSAGE_SIZE`] before the CBOR parser
//! sees any input.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod handshake;

pub use errors::{ProtocolError, Result};
pub use handshake::{ConnectRequest, ConnectResponse, MAX_MESSAGE_SIZE, ResponseStatus, Target};
