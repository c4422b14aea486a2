//! Failures a remote procedure call can end with.
//!
//! Every public call returns either its decoded result or exactly one
//! [`RpcError`]. The XDR layer reports through [`std::io::Error`]; the
//! helpers at the bottom of this module translate those at the client
//! boundary.

use std::io;

use thiserror::Error;

use crate::protocol::xdr::rpc::auth_stat;
use crate::protocol::xdr::XdrError;

/// Result alias used by the client layer.
pub type Result<T> = std::result::Result<T, RpcError>;

#[derive(Debug, Error)]
pub enum RpcError {
    /// A value could not be encoded into the call.
    #[error("XDR encode failure: {0}")]
    EncodeFailure(String),
    /// A value in the reply could not be decoded.
    #[error("XDR decode failure: {0}")]
    DecodeFailure(String),
    /// The reply ended before the value being decoded did.
    #[error("XDR buffer underflow")]
    BufferUnderflow,
    /// The call does not fit into the send buffer.
    #[error("XDR buffer overflow")]
    BufferOverflow,
    #[error("failed to send call: {0}")]
    TransportSendFailure(#[source] io::Error),
    #[error("failed to receive reply: {0}")]
    TransportReceiveFailure(#[source] io::Error),
    #[error("RPC call timed out")]
    Timeout,
    /// The server does not speak RPC version 2.
    #[error("RPC version mismatch, server supports {low}..={high}")]
    VersionMismatch { low: u32, high: u32 },
    #[error("authentication failed: {0:?}")]
    AuthenticationFailed(auth_stat),
    /// The server verifier has a flavor the authenticator does not know.
    #[error("invalid authentication response")]
    AuthenticationInvalidResponse,
    #[error("program unavailable")]
    ProgramUnavailable,
    #[error("program version mismatch, server supports {low}..={high}")]
    ProgramVersionMismatch { low: u32, high: u32 },
    #[error("procedure unavailable")]
    ProcedureUnavailable,
    /// The server could not decode the call arguments (GARBAGE_ARGS).
    #[error("server could not decode arguments")]
    ServerDecodeFailure,
    #[error("server system error")]
    ServerSystemError,
    /// A message arrived that is not a reply.
    #[error("unexpected message type {0}")]
    WrongMessageType(u32),
    #[error("portmapper failure: {0}")]
    PortmapperFailure(#[source] Box<RpcError>),
    /// The portmapper knows no port for the requested program.
    #[error("program not registered")]
    ProgramNotRegistered,
    #[error("unknown transport protocol {0}")]
    UnknownProtocol(u32),
}

impl RpcError {
    /// Wraps any failure as a portmapper failure, keeping the cause.
    pub fn portmapper(self) -> RpcError {
        match self {
            RpcError::PortmapperFailure(_) => self,
            other => RpcError::PortmapperFailure(Box::new(other)),
        }
    }
}

/// Translates an error raised while encoding a call.
pub fn encode_error(err: io::Error) -> RpcError {
    match XdrError::from_io(&err) {
        Some(XdrError::BufferOverflow) => RpcError::BufferOverflow,
        Some(XdrError::BufferUnderflow) => RpcError::BufferUnderflow,
        None => match authentication_error(&err) {
            Some(auth) => auth,
            None => RpcError::EncodeFailure(err.to_string()),
        },
    }
}

/// Translates an error raised while decoding a reply.
pub fn decode_error(err: io::Error) -> RpcError {
    match XdrError::from_io(&err) {
        Some(XdrError::BufferUnderflow) => RpcError::BufferUnderflow,
        Some(XdrError::BufferOverflow) => RpcError::BufferOverflow,
        None => match authentication_error(&err) {
            Some(auth) => auth,
            None => RpcError::DecodeFailure(err.to_string()),
        },
    }
}

/// Authenticators report through `io::Error` like the rest of the codec.
/// The typed failure travels as its payload.
fn authentication_error(err: &io::Error) -> Option<RpcError> {
    match err.get_ref()?.downcast_ref::<AuthError>()? {
        AuthError::Failed(stat) => Some(RpcError::AuthenticationFailed(*stat)),
        AuthError::InvalidResponse => Some(RpcError::AuthenticationInvalidResponse),
    }
}

/// Authentication failures raised inside the codec.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authentication failed: {0:?}")]
    Failed(auth_stat),
    #[error("invalid authentication response")]
    InvalidResponse,
}

impl From<AuthError> for io::Error {
    fn from(err: AuthError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_keep_their_kind() {
        let overflow: io::Error = XdrError::BufferOverflow.into();
        assert!(matches!(encode_error(overflow), RpcError::BufferOverflow));

        let underflow: io::Error = XdrError::BufferUnderflow.into();
        assert!(matches!(decode_error(underflow), RpcError::BufferUnderflow));

        let garbage = io::Error::new(io::ErrorKind::InvalidData, "Invalid enum value");
        assert!(matches!(decode_error(garbage), RpcError::DecodeFailure(_)));
    }

    #[test]
    fn authentication_errors_survive_io() {
        let err: io::Error = AuthError::Failed(auth_stat::AUTH_FAILED).into();
        assert!(matches!(encode_error(err), RpcError::AuthenticationFailed(auth_stat::AUTH_FAILED)));

        let err: io::Error = AuthError::InvalidResponse.into();
        assert!(matches!(decode_error(err), RpcError::AuthenticationInvalidResponse));
    }

    #[test]
    fn portmapper_wrapping_is_idempotent() {
        let err = RpcError::Timeout.portmapper().portmapper();
        match err {
            RpcError::PortmapperFailure(inner) => assert!(matches!(*inner, RpcError::Timeout)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
