//! Call and reply headers as the client writes and reads them.
//!
//! The wire vocabulary lives in [`crate::protocol::xdr::rpc`]. The headers here
//! differ from it in one respect: credentials and verifiers are never
//! materialized, the [`Authenticator`] of the client writes and checks them in
//! place.

use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::xdr::rpc::{accept_body, msg_type, rejected_reply, RPC_VERSION};
use crate::protocol::xdr::{deserialize, Serialize};

use super::auth::Authenticator;
use super::error::{decode_error, encode_error, Result, RpcError};

/// Starting point of a client's xid sequence, derived from the clock so
/// that consecutive clients are unlikely to reuse each other's ids.
pub(crate) fn initial_xid() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() as u32).rotate_left(20) ^ d.subsec_nanos())
        .unwrap_or(0)
}

/// Header of an outgoing call, up to and including the verifier.
/// Procedure arguments follow it directly.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallMessage {
    pub xid: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
}

impl CallMessage {
    pub fn new(xid: u32, program: u32, version: u32, procedure: u32) -> Self {
        Self { xid, program, version, procedure }
    }

    /// Writes `xid, CALL, 2, prog, vers, proc` and the authenticator's
    /// credential and verifier.
    pub fn encode<W: Write>(&self, dest: &mut W, auth: &dyn Authenticator) -> Result<()> {
        self.encode_header(dest).map_err(encode_error)?;
        auth.encode_credential_and_verifier(dest).map_err(encode_error)
    }

    fn encode_header<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.xid.serialize(dest)?;
        msg_type::CALL.serialize(dest)?;
        RPC_VERSION.serialize(dest)?;
        self.program.serialize(dest)?;
        self.version.serialize(dest)?;
        self.procedure.serialize(dest)
    }
}

/// Outcome part of a reply header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplyBody {
    /// The server ran the call; results follow on `SUCCESS`.
    Accepted(accept_body),
    Denied(rejected_reply),
}

/// Header of an incoming reply. On a successful reply the procedure results
/// follow it directly.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReplyMessage {
    pub xid: u32,
    pub body: ReplyBody,
}

impl ReplyMessage {
    /// Reads a reply header, handing the server verifier to `auth`.
    ///
    /// A message that is not a reply fails with
    /// [`RpcError::WrongMessageType`].
    pub fn decode<R: Read>(src: &mut R, auth: &mut dyn Authenticator) -> Result<ReplyMessage> {
        let xid = deserialize::<u32>(src).map_err(decode_error)?;
        let message_type = deserialize::<u32>(src).map_err(decode_error)?;
        if message_type != msg_type::REPLY as u32 {
            return Err(RpcError::WrongMessageType(message_type));
        }
        let body = match deserialize::<u32>(src).map_err(decode_error)? {
            0 => {
                auth.decode_verifier(src).map_err(decode_error)?;
                ReplyBody::Accepted(deserialize(src).map_err(decode_error)?)
            }
            1 => ReplyBody::Denied(deserialize(src).map_err(decode_error)?),
            stat => return Err(RpcError::DecodeFailure(format!("invalid reply status {stat}"))),
        };
        Ok(ReplyMessage { xid, body })
    }

    /// True iff the call was accepted and ran successfully.
    pub fn successfully_accepted(&self) -> bool {
        matches!(self.body, ReplyBody::Accepted(accept_body::SUCCESS))
    }

    /// True for a denial the authenticator may be able to fix.
    pub fn is_auth_error(&self) -> bool {
        matches!(self.body, ReplyBody::Denied(rejected_reply::AUTH_ERROR(_)))
    }

    /// The error an unsuccessful reply stands for, `None` on success.
    pub fn to_error(&self) -> Option<RpcError> {
        let err = match self.body {
            ReplyBody::Accepted(accept_body::SUCCESS) => return None,
            ReplyBody::Accepted(accept_body::PROG_UNAVAIL) => RpcError::ProgramUnavailable,
            ReplyBody::Accepted(accept_body::PROG_MISMATCH(info)) => {
                RpcError::ProgramVersionMismatch { low: info.low, high: info.high }
            }
            ReplyBody::Accepted(accept_body::PROC_UNAVAIL) => RpcError::ProcedureUnavailable,
            ReplyBody::Accepted(accept_body::GARBAGE_ARGS) => RpcError::ServerDecodeFailure,
            ReplyBody::Accepted(accept_body::SYSTEM_ERR) => RpcError::ServerSystemError,
            ReplyBody::Denied(rejected_reply::RPC_MISMATCH(info)) => {
                RpcError::VersionMismatch { low: info.low, high: info.high }
            }
            ReplyBody::Denied(rejected_reply::AUTH_ERROR(stat)) => {
                RpcError::AuthenticationFailed(stat)
            }
        };
        Some(err)
    }
}
