//! Connect request / connect response values.

use std::{fmt, net::SocketAddr};

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Maximum encoded size of a single handshake message (64 KiB)
///
/// Handshakes carry an address and a handful of flags; anything larger is a
/// broken or hostile peer.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Destination the client asked the proxy to reach.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Literal socket address (IPv4 or IPv6)
    Addr(SocketAddr),
    /// Domain name to be resolved by the remote-facing adapter
    Domain {
        /// Host name, without port
        host: String,
        /// Destination port
        port: u16,
    },
}

impl Target {
    /// Parse `host:port`, `a.b.c.d:port` or `[v6]:port`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidTarget`] if the port is missing or not a
    /// number, or if the host part is empty.
    pub fn parse(input: &str) -> Result<Self> {
        if let Ok(addr) = input.parse::<SocketAddr>() {
            return Ok(Self::Addr(addr));
        }

        let Some((host, port)) = input.rsplit_once(':') else {
            return Err(ProtocolError::InvalidTarget(format!("missing port in {input:?}")));
        };

        if host.is_empty() || host.starts_with('[') {
            return Err(ProtocolError::InvalidTarget(format!("invalid host in {input:?}")));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| ProtocolError::InvalidTarget(format!("invalid port in {input:?}: {e}")))?;

        Ok(Self::Domain { host: host.to_string(), port })
    }

    /// Destination port
    #[must_use]
    pub fn port(&self) -> u16 {
        match self {
            Self::Addr(addr) => addr.port(),
            Self::Domain { port, .. } => *port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addr(addr) => write!(f, "{addr}"),
            Self::Domain { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

/// Connect request recorded on the client-facing endpoint.
///
/// # Security
///
/// - **Debug Redaction**: `credentials` never shows up in logs; the `Debug`
///   impl prints only its length.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Where the client wants to go
    pub target: Target,
    /// Dialect-specific credentials (proxy auth), if any
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub credentials: Option<Vec<u8>>,
}

impl ConnectRequest {
    /// Request without credentials
    pub fn new(target: Target) -> Self {
        Self { target, credentials: None }
    }

    /// Encode as CBOR into `dst`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CborEncode`] if serialization fails.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        encode_cbor(self, dst)
    }

    /// Decode from CBOR bytes
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooLarge`] before parsing if `bytes`
    /// exceeds [`MAX_MESSAGE_SIZE`], or [`ProtocolError::CborDecode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("target", &self.target)
            .field(
                "credentials",
                &self.credentials.as_ref().map(|c| format!("<redacted {} bytes>", c.len())),
            )
            .finish()
    }
}

/// Outcome of the remote-facing adapter's connection attempt.
///
/// Codes follow the SOCKS5 reply field so dialect adapters can map them
/// without a lookup table. On the wire the status is its code.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ResponseStatus {
    /// Connection established
    Success = 0x00,
    /// Unspecified failure
    GeneralFailure = 0x01,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused by the destination
    ConnectionRefused = 0x05,
}

impl ResponseStatus {
    /// Wire code of this status
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<ResponseStatus> for u8 {
    fn from(status: ResponseStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for ResponseStatus {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Success),
            0x01 => Ok(Self::GeneralFailure),
            0x03 => Ok(Self::NetworkUnreachable),
            0x04 => Ok(Self::HostUnreachable),
            0x05 => Ok(Self::ConnectionRefused),
            other => Err(ProtocolError::CborDecode(format!("unknown status code {other:#04x}"))),
        }
    }
}

/// Connect response forwarded through the client-facing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    /// Outcome of the outbound connection attempt
    pub status: ResponseStatus,
    /// Local address the remote-facing adapter bound, when known
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bound: Option<SocketAddr>,
}

impl ConnectResponse {
    /// Successful response
    pub fn success(bound: Option<SocketAddr>) -> Self {
        Self { status: ResponseStatus::Success, bound }
    }

    /// Failed response with the given status
    pub fn failure(status: ResponseStatus) -> Self {
        Self { status, bound: None }
    }

    /// True if the outbound connection was established
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Encode as CBOR into `dst`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CborEncode`] if serialization fails.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        encode_cbor(self, dst)
    }

    /// Decode from CBOR bytes
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooLarge`] before parsing if `bytes`
    /// exceeds [`MAX_MESSAGE_SIZE`], or [`ProtocolError::CborDecode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_cbor(bytes)
    }
}

fn encode_cbor<T: Serialize>(value: &T, dst: &mut impl BufMut) -> Result<()> {
    ciborium::ser::into_writer(value, dst.writer())
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
}

fn decode_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: bytes.len(), max: MAX_MESSAGE_SIZE });
    }

    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
