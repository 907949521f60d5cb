//! Tether endpoint core logic
//!
//! This crate contains the client-facing socket endpoint of a relaying proxy
//! tunnel. It wraps one asynchronous byte-stream transport, owns the
//! connection's lifecycle state, and re-emits every transport completion as a
//! typed event for the tunnel orchestrator.
//!
//! # Architecture: "The Hollow Shell"
//!
//! The endpoint never performs I/O itself. Commands are forwarded to a
//! [`RawTransport`](transport::RawTransport) and completions come back as
//! [`TransportEvent`](transport::TransportEvent) values:
//!
//! ```text
//!  RawTransport ──TransportEvent──> Endpoint ──EndpointEvent──> EventBus
//!       ↑                              │                    ├─ EventSink (relay)
//!       └────── start_read / write ────┘                    └─ EndpointListener
//!               disconnect                                     (lifecycle)
//! ```
//!
//! ```text
//! ┌────────────────────────┐
//! │ tether-core            │
//! │ - Endpoint lifecycle   │
//! │ - Event translation    │
//! │ - Event bus            │
//! └────────────────────────┘
//!          ↓
//! ┌────────────────────────┐
//! │ tether-harness         │
//! │ - Recording transport  │
//! │ - Turmoil/Tokio socket │
//! │ - Serial driver task   │
//! └────────────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - No I/O in Core: never call `tokio::spawn` or touch a socket directly
//! - Serial Context: every command and every callback for one endpoint runs
//!   on one logical execution context; the endpoint takes `&mut self`
//!   everywhere and holds no locks
//! - One event per callback: transport completions are never coalesced or
//!   swallowed
//!
//! # Modules
//!
//! - [`endpoint`]: Endpoint state machine (lifecycle, I/O, teardown)
//! - [`event`]: Endpoint events, event sinks, and the two-stage event bus
//! - [`transport`]: Raw transport contract (commands and completions)
//! - [`error`]: Endpoint error types

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod endpoint;
pub mod error;
pub mod event;
pub mod transport;
