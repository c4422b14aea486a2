//! Client parameters.
//!
//! A [`ClientConfig`] starts from defaults and is adjusted with chained
//! `with_*` calls:
//!
//! ```text
//! let config = ClientConfig::new("10.0.0.1", 100003, 3)
//!     .with_protocol(Protocol::Tcp)
//!     .with_timeout(Duration::from_secs(5));
//! ```

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::lookup_host;

use crate::protocol::xdr::datagram::DEFAULT_BUFFER_SIZE;
use crate::protocol::xdr::portmap::{self, IPPROTO_TCP, IPPROTO_UDP};

use super::auth::{AuthNone, Authenticator};
use super::error::RpcError;

/// Total time a call may take by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound of a single socket write on stream transports.
pub const DEFAULT_TRANSMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport a client speaks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

impl Protocol {
    /// IP protocol number, as registered with the portmapper.
    pub fn ipproto(self) -> u32 {
        match self {
            Protocol::Udp => IPPROTO_UDP,
            Protocol::Tcp => IPPROTO_TCP,
        }
    }
}

impl TryFrom<u32> for Protocol {
    type Error = RpcError;

    fn try_from(ipproto: u32) -> Result<Self, Self::Error> {
        match ipproto {
            IPPROTO_UDP => Ok(Protocol::Udp),
            IPPROTO_TCP => Ok(Protocol::Tcp),
            other => Err(RpcError::UnknownProtocol(other)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "udp"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// How the wait between UDP retransmissions evolves.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RetransmissionMode {
    /// Every retransmission waits the same time.
    #[default]
    Fixed,
    /// The wait doubles after each retransmission.
    Exponential,
}

/// Everything needed to build a client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub host: String,
    /// 0 asks the portmapper on `host`.
    pub port: u16,
    /// Where the portmapper of `host` listens.
    pub portmapper_port: u16,
    pub program: u32,
    pub version: u32,
    pub protocol: Protocol,
    /// Total time a call may take. Zero turns calls into one-way calls.
    pub timeout: Duration,
    /// Wait before a UDP call is sent again. Zero turns calls into one-way calls.
    pub retransmission_timeout: Duration,
    pub retransmission_mode: RetransmissionMode,
    /// Size of the send and receive buffers, at least 1024 bytes.
    pub buffer_size: usize,
    /// Bound of the TCP connect, `None` leaves it to the system.
    pub connect_timeout: Option<Duration>,
    pub transmission_timeout: Duration,
    pub auth: Box<dyn Authenticator>,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, program: u32, version: u32) -> Self {
        Self {
            host: host.into(),
            port: 0,
            portmapper_port: portmap::PORT,
            program,
            version,
            protocol: Protocol::default(),
            timeout: DEFAULT_TIMEOUT,
            retransmission_timeout: DEFAULT_TIMEOUT,
            retransmission_mode: RetransmissionMode::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: None,
            transmission_timeout: DEFAULT_TRANSMISSION_TIMEOUT,
            auth: Box::new(AuthNone),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_portmapper_port(mut self, port: u16) -> Self {
        self.portmapper_port = port;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retransmission_timeout(mut self, timeout: Duration) -> Self {
        self.retransmission_timeout = timeout;
        self
    }

    pub fn with_retransmission_mode(mut self, mode: RetransmissionMode) -> Self {
        self.retransmission_mode = mode;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_transmission_timeout(mut self, timeout: Duration) -> Self {
        self.transmission_timeout = timeout;
        self
    }

    /// Credentials the client starts with. Each client works on its own copy.
    pub fn with_auth<A: Authenticator + 'static>(mut self, auth: A) -> Self {
        self.auth = Box::new(auth);
        self
    }

    /// First socket address `host` and `port` resolve to.
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        lookup_host((self.host.as_str(), self.port)).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", self.host))
        })
    }
}
