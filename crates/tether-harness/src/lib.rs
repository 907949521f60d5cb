//! Simulation harness for tether endpoint testing.
//!
//! This crate provides implementations of the core `RawTransport` trait for
//! tests:
//!
//! - [`RecordingTransport`]: records every command, never performs I/O
//! - [`SocketTransport`]: drives a real byte stream (Turmoil TCP in
//!   simulation, `tokio::io::duplex` in unit tests) from one Tokio task
//!
//! plus [`SimListener`] for accepting Turmoil connections and the
//! [`driver`] functions that feed transport completions into an endpoint on
//! one serial task.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
mod recording_transport;
mod sim_socket;

pub use recording_transport::{CallLog, RecordingTransport, TransportCall};
pub use sim_socket::{
    MIN_COMMAND_QUEUE_DEPTH, SimListener, SimSocket, SocketConfig, SocketTransport,
};
