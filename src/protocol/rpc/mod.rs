//! RPC (Remote Procedure Call) client as specified in RFC 1831.
//!
//! A call names a program, a version of it and one of its procedures. It
//! carries XDR-encoded arguments and gets XDR-encoded results back. This
//! module supplies everything between the caller and the socket:
//!
//! 1. Call and reply headers ([`CallMessage`], [`ReplyMessage`])
//! 2. Authentication (AUTH_NONE, AUTH_UNIX with AUTH_SHORT shorthand)
//! 3. A UDP client with retransmission and broadcast calls
//! 4. A TCP client with record marking and call batching
//! 5. A transport independent [`Client`] that can find its server's port
//!    through the portmapper
//!
//! Arguments and results are anything implementing the XDR
//! [`Serialize`](crate::xdr::Serialize) and
//! [`Deserialize`](crate::xdr::Deserialize) traits.

mod auth;
mod client;
mod config;
mod error;
mod message;
mod retransmit;
mod tcp;
mod udp;

pub use auth::{AuthNone, AuthUnix, Authenticator};
pub use client::{Client, RpcClient};
pub use config::{
    ClientConfig, Protocol, RetransmissionMode, DEFAULT_TIMEOUT, DEFAULT_TRANSMISSION_TIMEOUT,
};
pub use error::{AuthError, Result, RpcError};
pub use message::{CallMessage, ReplyBody, ReplyMessage};
pub use retransmit::RetransmitSchedule;
pub use tcp::TcpClient;
pub use udp::UdpClient;
