//! Tokio-driven socket transport.
//!
//! [`SimSocket::spawn`] moves a byte stream into its own task and hands back
//! a [`SocketTransport`] (the command side) plus a receiver of
//! [`TransportEvent`]s (the completion side). The task:
//!
//! - performs at most one read at a time, only after a read command
//! - writes buffers in command order and reports each completion
//! - reports EOF as `Disconnected` and I/O errors as `Fault`
//! - exits after reporting a terminal event
//!
//! # Why Turmoil?
//!
//! The endpoint is pure logic, but the disconnect races it has to reconcile
//! only show up against a real stream. Turmoil's TCP gives those races
//! deterministically; `tokio::io::duplex` works too for in-process tests.

use std::{io, net::SocketAddr};

use bytes::Bytes;
use tether_core::{
    error::EndpointError,
    transport::{EndpointId, RawTransport, Tag, TransportEvent},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc::{self, error::TrySendError},
};
use turmoil::net::{TcpListener, TcpStream};

/// Smallest command queue that never rejects an endpoint command: one read,
/// one write and one teardown may be pending at once.
pub const MIN_COMMAND_QUEUE_DEPTH: usize = 3;

/// Socket task configuration
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Maximum bytes returned by a single read completion
    pub read_buffer_size: usize,
    /// Capacity of the command queue between endpoint and socket task.
    /// Raised to [`MIN_COMMAND_QUEUE_DEPTH`] if smaller.
    pub command_queue_depth: usize,
    /// Hand written buffers back in write completions instead of dropping
    /// them
    pub retain_written_buffers: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self { read_buffer_size: 16 * 1024, command_queue_depth: 64, retain_written_buffers: false }
    }
}

#[derive(Debug)]
enum SocketCommand {
    Read(Tag),
    Write(Bytes, Tag),
    Disconnect,
    ForceDisconnect,
}

/// Command side of a spawned socket task.
///
/// A command that finds the queue full is reported to the endpoint as a
/// `Fault` on the completion channel.
#[derive(Debug)]
pub struct SocketTransport {
    id: EndpointId,
    commands: mpsc::Sender<SocketCommand>,
    /// Completion channel, held weakly so it still closes when the task exits
    events: mpsc::WeakUnboundedSender<TransportEvent>,
}

impl SocketTransport {
    fn send(&self, command: SocketCommand) {
        match self.commands.try_send(command) {
            Ok(()) => {},
            Err(TrySendError::Full(command)) => {
                tracing::warn!(endpoint = %self.id, ?command, "command queue full");
                if let Some(events) = self.events.upgrade() {
                    let reason = format!("command queue full, dropped {command:?}");
                    let _ = events.send(TransportEvent::Fault { reason });
                }
            },
            // Task already reported its terminal event (or died, which the
            // driver sees as a closed completion channel)
            Err(TrySendError::Closed(command)) => {
                tracing::debug!(endpoint = %self.id, ?command, "socket task gone");
            },
        }
    }
}

impl RawTransport for SocketTransport {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn start_read(&mut self, tag: Tag) {
        self.send(SocketCommand::Read(tag));
    }

    fn write(&mut self, buffer: Bytes, tag: Tag) {
        self.send(SocketCommand::Write(buffer, tag));
    }

    fn disconnect(&mut self) {
        self.send(SocketCommand::Disconnect);
    }

    fn force_disconnect(&mut self) {
        self.send(SocketCommand::ForceDisconnect);
    }
}

/// Spawns socket tasks.
pub struct SimSocket;

impl SimSocket {
    /// Move `stream` into a new task and return its command and completion
    /// sides.
    ///
    /// Must be called from within a Tokio runtime (a Turmoil host counts).
    pub fn spawn<S>(
        stream: S,
        id: EndpointId,
        config: SocketConfig,
    ) -> (SocketTransport, mpsc::UnboundedReceiver<TransportEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let depth = config.command_queue_depth.max(MIN_COMMAND_QUEUE_DEPTH);
        let (command_tx, command_rx) = mpsc::channel(depth);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let transport = SocketTransport { id, commands: command_tx, events: event_tx.downgrade() };
        tokio::spawn(run_socket(stream, id, config, command_rx, event_tx));

        (transport, event_rx)
    }

    /// Dial `address` over Turmoil TCP and spawn a socket task for it.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Transport`] carrying the I/O error kind if the
    /// remote host is unknown, unreachable, or refuses the connection.
    pub async fn connect(
        address: &str,
        id: EndpointId,
        config: SocketConfig,
    ) -> Result<(SocketTransport, mpsc::UnboundedReceiver<TransportEvent>), EndpointError> {
        let stream = TcpStream::connect(address).await.map_err(|e| {
            tracing::debug!(endpoint = %id, address, error = %e, "dial failed");
            EndpointError::from(e)
        })?;
        Ok(Self::spawn(stream, id, config))
    }
}

async fn run_socket<S>(
    stream: S,
    id: EndpointId,
    config: SocketConfig,
    mut commands: mpsc::Receiver<SocketCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];
    let mut pending_read: Option<Tag> = None;

    let terminal = loop {
        tokio::select! {
            command = commands.recv() => {
                // Transport handle dropped: the endpoint is gone, nobody to tell
                let Some(command) = command else { break None };

                match command {
                    SocketCommand::Read(tag) => pending_read = Some(tag),

                    SocketCommand::Write(buffer, tag) => {
                        if let Err(e) = write_buffer(&mut writer, &buffer).await {
                            break Some(TransportEvent::Fault { reason: e.to_string() });
                        }

                        let buffer = config.retain_written_buffers.then_some(buffer);
                        if events.send(TransportEvent::WriteCompleted { buffer, tag }).is_err() {
                            break None;
                        }
                    },

                    SocketCommand::Disconnect => {
                        if let Err(e) = writer.shutdown().await {
                            tracing::debug!(endpoint = %id, error = %e, "shutdown after graceful close");
                        }
                        break Some(TransportEvent::Disconnected);
                    },

                    SocketCommand::ForceDisconnect => break Some(TransportEvent::Disconnected),
                }
            },

            result = reader.read(&mut buf), if pending_read.is_some() => {
                match result {
                    Ok(0) => break Some(TransportEvent::Disconnected),
                    Ok(n) => {
                        if let Some(tag) = pending_read.take() {
                            let buffer = Bytes::copy_from_slice(&buf[..n]);
                            if events.send(TransportEvent::ReadCompleted { buffer, tag }).is_err() {
                                break None;
                            }
                        }
                    },
                    Err(e) => break Some(TransportEvent::Fault { reason: e.to_string() }),
                }
            },
        }
    };

    if let Some(event) = terminal {
        tracing::debug!(endpoint = %id, event = event.kind(), "socket task finished");
        let _ = events.send(event);
    }
}

async fn write_buffer<W: AsyncWrite + Unpin>(writer: &mut W, buffer: &[u8]) -> io::Result<()> {
    writer.write_all(buffer).await?;
    writer.flush().await
}

/// Turmoil TCP listener that hands out socket transports with sequential
/// endpoint identities.
pub struct SimListener {
    listener: TcpListener,
    config: SocketConfig,
    next_id: u64,
}

impl SimListener {
    /// Listen on `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns error if the port is taken or `address` does not parse.
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener, config: SocketConfig::default(), next_id: 1 })
    }

    /// Use `config` for every accepted socket
    #[must_use]
    pub fn with_config(mut self, config: SocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept one connection and spawn its socket task.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Transport`] if the listener fails.
    pub async fn accept(
        &mut self,
    ) -> Result<(SocketTransport, mpsc::UnboundedReceiver<TransportEvent>, SocketAddr), EndpointError>
    {
        let (stream, peer) = self.listener.accept().await?;

        let id = EndpointId(self.next_id);
        self.next_id += 1;

        tracing::debug!(endpoint = %id, %peer, "accepted connection");

        let (transport, events) = SimSocket::spawn(stream, id, self.config.clone());
        Ok((transport, events, peer))
    }
}
