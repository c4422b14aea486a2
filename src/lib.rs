//! ONC/RPC Mamont: an asynchronous ONC/RPC client.
//!
//! ONC/RPC is the remote procedure call protocol under NFS, MOUNT, NLM and
//! other services of the Sun lineage. This crate calls procedures of such
//! programs from Tokio code:
//!
//! - [`xdr`] encodes and decodes arguments and results (RFC 1832). Own types
//!   get the traits through the `SerializeStruct!`/`DeserializeStruct!`
//!   macros or by hand.
//! - [`rpc`] holds the clients (RFC 1831). [`rpc::UdpClient`] retransmits
//!   on a fixed or doubling interval and can broadcast. [`rpc::TcpClient`]
//!   uses record marking and can batch calls. AUTH_NONE and AUTH_UNIX with
//!   the AUTH_SHORT shorthand are built in.
//! - [`portmap`] talks to the portmapper (RFC 1833) to look up, register
//!   and list program ports.
//!
//! [`rpc::Client::connect`] ties it together: it takes a
//! [`rpc::ClientConfig`], asks the portmapper for the port when none is
//! configured and returns a client for the chosen transport.
//!
//! ```text
//! let config = ClientConfig::new("fileserver", 100003, 3).with_protocol(Protocol::Tcp);
//! let mut client = Client::connect(&config).await?;
//! client.call(0, &Void, &mut Void).await?;
//! ```

pub mod portmap;
pub mod protocol;

pub use protocol::{rpc, xdr};
