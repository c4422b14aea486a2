//! Protocol module implements the ONC/RPC client stack.
//!
//! This module contains two main components:
//!
//! - `xdr`: External Data Representation (XDR) for serialization and deserialization
//!   of data structures according to RFC 1832, plus the codecs binding it to
//!   datagram and stream transports.
//!
//! - `rpc`: Remote Procedure Call (RPC) protocol implementation for calling
//!   remote programs over UDP and TCP as defined in RFC 1831.

pub mod rpc;
pub mod xdr;
