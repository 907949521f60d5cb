//! Two endpoints relaying a tunnel over the simulated network.
//!
//! A minimal orchestrator runs on the "proxy" host: it accepts a client,
//! reads a length-prefixed connect request, dials the target and then
//! relays bytes in both directions, driven purely by endpoint events.
//!
//! Tests:
//! - Echo through the tunnel, client closes first
//! - Upstream closes first, client observes EOF after the last bytes
//! - Refused target yields a failure response and a closed tunnel

use std::{
    error::Error,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use tether_core::{
    endpoint::{Endpoint, EndpointState},
    error::EndpointError,
    event::{EndpointEvent, EventBus},
    transport::{EndpointId, Tag, TransportEvent},
};
use tether_harness::{
    SimListener, SimSocket, SocketConfig, SocketTransport,
    driver::{deliver, drive, step},
};
use tether_proto::{ConnectRequest, ConnectResponse, ResponseStatus, Target};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use turmoil::net::{TcpListener, TcpStream};

type TestResult = Result<(), Box<dyn Error>>;

const PROXY_ADDR: &str = "proxy:1080";
const REMOTE_ID: EndpointId = EndpointId(100);

/// What the proxy saw, for the client to assert on.
#[derive(Debug, Clone, PartialEq)]
struct TunnelReport {
    local: EndpointState,
    remote: Option<EndpointState>,
    local_terminal_events: usize,
    remote_terminal_events: usize,
}

type SharedReport = Arc<Mutex<Option<TunnelReport>>>;

/// One side of the tunnel: endpoint, its completions and its events.
struct Side {
    endpoint: Endpoint<SocketTransport>,
    completions: mpsc::UnboundedReceiver<TransportEvent>,
    events: mpsc::UnboundedReceiver<EndpointEvent>,
    terminal_events: usize,
}

impl Side {
    fn new(
        transport: SocketTransport,
        completions: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        let (bus, events) = EventBus::channel();
        Self { endpoint: Endpoint::new(transport, bus), completions, events, terminal_events: 0 }
    }

    /// Read until one `u16`-length-prefixed frame is buffered.
    async fn read_frame(&mut self) -> Result<Bytes, Box<dyn Error>> {
        let mut buf = BytesMut::new();
        let mut tag = 0;

        loop {
            if buf.len() >= 2 {
                let len = usize::from(u16::from_be_bytes([buf[0], buf[1]]));
                if buf.len() >= 2 + len {
                    let mut frame = buf.split_to(2 + len);
                    return Ok(frame.split_off(2).freeze());
                }
            }

            self.endpoint.start_reading(Tag(tag))?;
            tag += 1;

            step(&mut self.endpoint, &mut self.completions).await;
            if self.endpoint.is_disconnected() {
                return Err("client left during handshake".into());
            }

            while let Ok(event) = self.events.try_recv() {
                if let EndpointEvent::DataRead { buffer, .. } = event {
                    buf.extend_from_slice(&buffer);
                }
            }
        }
    }

    /// Write one frame and wait for its completion.
    async fn write_frame(&mut self, frame: Bytes) -> std::io::Result<()> {
        self.endpoint.send_data(frame, Tag(0))?;
        step(&mut self.endpoint, &mut self.completions).await;

        while self.events.try_recv().is_ok() {}
        Ok(())
    }

    /// Apply this side's pending events to `other`.
    fn relay_to(&mut self, other: &mut Side, next_tag: &mut u64) -> TestResult {
        while let Ok(event) = self.events.try_recv() {
            match event {
                EndpointEvent::DataRead { buffer, tag, .. } => {
                    if !other.endpoint.is_disconnected() {
                        other.endpoint.send_data(buffer, tag)?;
                    }
                },
                // Bytes from `other` reached our peer: read more from `other`
                EndpointEvent::DataWritten { .. } => {
                    if !other.endpoint.is_disconnected() {
                        *next_tag += 1;
                        other.endpoint.start_reading(Tag(*next_tag))?;
                    }
                },
                EndpointEvent::DisconnectRequested { .. }
                | EndpointEvent::ForceDisconnectRequested { .. } => other.endpoint.disconnect(),
                EndpointEvent::Disconnected { .. } => {
                    self.terminal_events += 1;
                    other.endpoint.disconnect();
                },
                _ => {},
            }
        }
        Ok(())
    }
}

fn frame(encode: impl FnOnce(&mut BytesMut) -> tether_proto::Result<()>) -> Bytes {
    let mut body = BytesMut::new();
    encode(&mut body).unwrap();

    let mut framed = BytesMut::with_capacity(2 + body.len());
    framed.put_u16(u16::try_from(body.len()).unwrap());
    framed.put_slice(&body);
    framed.freeze()
}

async fn read_client_frame<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<Vec<u8>> {
    let len = stream.read_u16().await?;
    let mut body = vec![0u8; usize::from(len)];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

async fn write_client_frame<S: AsyncWrite + Unpin>(stream: &mut S, body: Bytes) -> std::io::Result<()> {
    stream.write_all(&body).await?;
    stream.flush().await
}

/// Accept one client and run its tunnel to completion.
async fn run_proxy(report: SharedReport) -> TestResult {
    let mut listener = SimListener::bind("0.0.0.0:1080").await?;
    let (transport, completions, _peer) = listener.accept().await?;

    let mut local = Side::new(transport, completions);
    local.endpoint.open()?;

    let request = ConnectRequest::decode(&local.read_frame().await?)?;
    local.endpoint.set_handshake_request(request.clone())?;

    let target = request.target.to_string();
    let mut remote = match SimSocket::connect(&target, REMOTE_ID, SocketConfig::default()).await {
        Ok((transport, completions)) => Side::new(transport, completions),
        Err(e) => {
            let status = match e {
                EndpointError::Transport { kind: std::io::ErrorKind::ConnectionRefused, .. } => {
                    ResponseStatus::ConnectionRefused
                },
                _ => ResponseStatus::GeneralFailure,
            };
            let response = ConnectResponse::failure(status);
            local.endpoint.forward_handshake_response(response.clone())?;
            local.write_frame(frame(|dst| response.encode(dst))).await?;

            local.endpoint.disconnect();
            drive(&mut local.endpoint, &mut local.completions).await;
            while let Ok(event) = local.events.try_recv() {
                if event.is_terminal() {
                    local.terminal_events += 1;
                }
            }

            *report.lock().unwrap() = Some(TunnelReport {
                local: local.endpoint.state(),
                remote: None,
                local_terminal_events: local.terminal_events,
                remote_terminal_events: 0,
            });
            return Ok(());
        },
    };
    remote.endpoint.open()?;

    let response = ConnectResponse::success(None);
    local.endpoint.forward_handshake_response(response.clone())?;
    local.write_frame(frame(|dst| response.encode(dst))).await?;

    local.endpoint.ready_to_forward()?;
    remote.endpoint.ready_to_forward()?;
    while local.events.try_recv().is_ok() {}
    while remote.events.try_recv().is_ok() {}

    let mut next_tag = 1;
    local.endpoint.start_reading(Tag(next_tag))?;
    remote.endpoint.start_reading(Tag(next_tag))?;

    while !(local.endpoint.is_disconnected() && remote.endpoint.is_disconnected()) {
        tokio::select! {
            event = local.completions.recv(), if !local.endpoint.is_disconnected() => {
                deliver(&mut local.endpoint, event);
            },
            event = remote.completions.recv(), if !remote.endpoint.is_disconnected() => {
                deliver(&mut remote.endpoint, event);
            },
        }

        local.relay_to(&mut remote, &mut next_tag)?;
        remote.relay_to(&mut local, &mut next_tag)?;
    }

    *report.lock().unwrap() = Some(TunnelReport {
        local: local.endpoint.state(),
        remote: Some(remote.endpoint.state()),
        local_terminal_events: local.terminal_events,
        remote_terminal_events: remote.terminal_events,
    });

    Ok(())
}

async fn wait_for_report(report: &SharedReport) -> TunnelReport {
    loop {
        if let Some(found) = report.lock().unwrap().clone() {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn connect_through_proxy(target: &str) -> Result<(TcpStream, ConnectResponse), Box<dyn Error>> {
    let mut stream = TcpStream::connect(PROXY_ADDR).await?;

    let request = ConnectRequest::new(Target::parse(target)?);
    write_client_frame(&mut stream, frame(|dst| request.encode(dst))).await?;

    let response = ConnectResponse::decode(&read_client_frame(&mut stream).await?)?;
    Ok((stream, response))
}

fn proxy_host(sim: &mut turmoil::Sim<'_>, report: &SharedReport) {
    let report = Arc::clone(report);
    sim.host("proxy", move || run_proxy(Arc::clone(&report)));
}

#[test]
fn echo_through_tunnel_then_client_closes() {
    let mut sim = turmoil::Builder::new().build();
    let report = SharedReport::default();

    sim.host("upstream", || async {
        let listener = TcpListener::bind("0.0.0.0:7000").await?;
        let (mut stream, _) = listener.accept().await?;

        let mut buf = [0u8; 256];
        while let Ok(n @ 1..) = stream.read(&mut buf).await {
            if stream.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
        Ok(())
    });
    proxy_host(&mut sim, &report);

    let observed = Arc::clone(&report);
    sim.client("app", async move {
        let (mut stream, response) = connect_through_proxy("upstream:7000").await?;
        assert!(response.is_success());

        stream.write_all(b"hello tunnel").await?;
        let mut echoed = [0u8; 12];
        stream.read_exact(&mut echoed).await?;
        assert_eq!(&echoed, b"hello tunnel");

        drop(stream);

        let report = wait_for_report(&observed).await;
        assert_eq!(report.local, EndpointState::Closed);
        assert!(matches!(
            report.remote,
            Some(EndpointState::Closed | EndpointState::Invalid)
        ));
        assert_eq!(report.local_terminal_events, 1);
        assert_eq!(report.remote_terminal_events, 1);

        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn upstream_close_reaches_client_after_data() {
    let mut sim = turmoil::Builder::new().build();
    let report = SharedReport::default();

    sim.host("upstream", || async {
        let listener = TcpListener::bind("0.0.0.0:7000").await?;
        let (mut stream, _) = listener.accept().await?;

        stream.write_all(b"banner, then goodbye").await?;
        Ok(())
    });
    proxy_host(&mut sim, &report);

    let observed = Arc::clone(&report);
    sim.client("app", async move {
        let (mut stream, response) = connect_through_proxy("upstream:7000").await?;
        assert!(response.is_success());

        let mut received = Vec::new();
        stream.read_to_end(&mut received).await?;
        assert_eq!(received, b"banner, then goodbye");

        let report = wait_for_report(&observed).await;
        assert_eq!(report.remote, Some(EndpointState::Closed));
        assert_eq!(report.local, EndpointState::Closed);
        assert_eq!(report.remote_terminal_events, 1);
        assert_eq!(report.local_terminal_events, 1);

        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn refused_target_gets_failure_response() {
    let mut sim = turmoil::Builder::new().build();
    let report = SharedReport::default();

    // Registered host with nothing listening on the requested port
    sim.host("upstream", || async {
        std::future::pending::<()>().await;
        Ok(())
    });
    proxy_host(&mut sim, &report);

    let observed = Arc::clone(&report);
    sim.client("app", async move {
        let (mut stream, response) = connect_through_proxy("upstream:9").await?;
        assert!(!response.is_success());
        assert_eq!(response.status, ResponseStatus::ConnectionRefused);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await?;
        assert!(rest.is_empty());

        let report = wait_for_report(&observed).await;
        assert_eq!(report, TunnelReport {
            local: EndpointState::Closed,
            remote: None,
            local_terminal_events: 1,
            remote_terminal_events: 0,
        });

        Ok(())
    });

    sim.run().expect("simulation failed");
}
