//! RPC version 2 message types (RFC 1831, section 8).
//!
//! Names follow the RFC. A message is an xid plus a union: a call with its
//! program, version, procedure, credential and verifier, or a reply that
//! was either accepted (verifier plus outcome) or denied (version or
//! authentication problem). Procedure arguments and results are not part of
//! these types; they follow the header on the wire.
//!
//! The client writes and reads headers through
//! [`crate::protocol::rpc::CallMessage`] and
//! [`crate::protocol::rpc::ReplyMessage`], which leave credentials to the
//! authenticator. The complete model here is what the peer sees, and is
//! what test servers use to answer calls.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::*;

pub const RPC_VERSION: u32 = 2;
/// Largest body of a credential or verifier.
pub const MAX_AUTH_BYTES: usize = 400;
/// Largest machine name in an AUTH_UNIX credential.
pub const MAX_MACHINE_NAME: usize = 255;
/// Most supplementary groups an AUTH_UNIX credential can list.
pub const MAX_GROUPS: usize = 16;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum msg_type {
    #[default]
    CALL = 0,
    REPLY = 1,
}
impl SerializeEnum for msg_type {}
impl DeserializeEnum for msg_type {}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum reply_stat {
    #[default]
    MSG_ACCEPTED = 0,
    MSG_DENIED = 1,
}
impl SerializeEnum for reply_stat {}
impl DeserializeEnum for reply_stat {}

/// Outcome of a call the server accepted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum accept_stat {
    #[default]
    SUCCESS = 0,
    PROG_UNAVAIL = 1,
    PROG_MISMATCH = 2,
    PROC_UNAVAIL = 3,
    GARBAGE_ARGS = 4,
    SYSTEM_ERR = 5,
}
impl SerializeEnum for accept_stat {}
impl DeserializeEnum for accept_stat {}

/// Why the server refused a call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum reject_stat {
    #[default]
    RPC_MISMATCH = 0,
    AUTH_ERROR = 1,
}
impl SerializeEnum for reject_stat {}
impl DeserializeEnum for reject_stat {}

/// Why authentication failed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum auth_stat {
    AUTH_OK = 0,
    /// Bad credential (seal broken).
    #[default]
    AUTH_BADCRED = 1,
    /// The client must begin a new session.
    AUTH_REJECTEDCRED = 2,
    /// Bad verifier (seal broken).
    AUTH_BADVERF = 3,
    /// Verifier expired or replayed.
    AUTH_REJECTEDVERF = 4,
    /// Rejected for security reasons.
    AUTH_TOOWEAK = 5,
    /// Bogus response verifier.
    AUTH_INVALIDRESP = 6,
    AUTH_FAILED = 7,
}
impl SerializeEnum for auth_stat {}
impl DeserializeEnum for auth_stat {}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum auth_flavor {
    #[default]
    AUTH_NONE = 0,
    AUTH_UNIX = 1,
    /// Server-issued token standing in for an earlier credential.
    AUTH_SHORT = 2,
    AUTH_DES = 3,
}
impl SerializeEnum for auth_flavor {}
impl DeserializeEnum for auth_flavor {}

/// Body of an AUTH_UNIX credential.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct auth_unix {
    /// Arbitrary id chosen by the caller, by convention seconds since the epoch.
    pub stamp: u32,
    pub machinename: Vec<u8>,
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
}
DeserializeStruct!(auth_unix, stamp, machinename, uid, gid, gids);
SerializeStruct!(auth_unix, stamp, machinename, uid, gid, gids);

/// A credential or verifier: a flavor and at most [`MAX_AUTH_BYTES`] of body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct opaque_auth {
    pub flavor: auth_flavor,
    pub body: Vec<u8>,
}
SerializeStruct!(opaque_auth, flavor, body);

impl Deserialize for opaque_auth {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.flavor.deserialize(src)?;
        self.body.deserialize(src)?;
        if self.body.len() > MAX_AUTH_BYTES {
            return Err(invalid_data(&format!(
                "opaque_auth body of {} bytes exceeds {MAX_AUTH_BYTES}",
                self.body.len()
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct rpc_msg {
    /// Matches a reply to its call.
    pub xid: u32,
    pub body: rpc_body,
}
DeserializeStruct!(rpc_msg, xid, body);
SerializeStruct!(rpc_msg, xid, body);

impl rpc_msg {
    /// An accepted reply with an AUTH_NONE verifier.
    pub fn accepted(xid: u32, reply_data: accept_body) -> rpc_msg {
        let reply = accepted_reply { verf: opaque_auth::default(), reply_data };
        rpc_msg { xid, body: rpc_body::REPLY(reply_body::MSG_ACCEPTED(reply)) }
    }

    pub fn denied(xid: u32, reason: rejected_reply) -> rpc_msg {
        rpc_msg { xid, body: rpc_body::REPLY(reply_body::MSG_DENIED(reason)) }
    }

    /// A successful reply. Procedure results go right after it.
    pub fn success(xid: u32) -> rpc_msg {
        rpc_msg::accepted(xid, accept_body::SUCCESS)
    }
}

/// Union over [`msg_type`].
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum rpc_body {
    CALL(call_body),
    REPLY(reply_body),
}

impl Default for rpc_body {
    fn default() -> rpc_body {
        rpc_body::CALL(call_body::default())
    }
}

impl Serialize for rpc_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rpc_body::CALL(call) => {
                msg_type::CALL.serialize(dest)?;
                call.serialize(dest)
            }
            rpc_body::REPLY(reply) => {
                msg_type::REPLY.serialize(dest)?;
                reply.serialize(dest)
            }
        }
    }
}

impl Deserialize for rpc_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match deserialize::<msg_type>(src)? {
            msg_type::CALL => rpc_body::CALL(deserialize(src)?),
            msg_type::REPLY => rpc_body::REPLY(deserialize(src)?),
        };
        Ok(())
    }
}

/// Everything of a call up to the procedure arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct call_body {
    /// Always [`RPC_VERSION`].
    pub rpcvers: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: opaque_auth,
    pub verf: opaque_auth,
}
DeserializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);
SerializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);

impl Default for call_body {
    fn default() -> call_body {
        call_body {
            rpcvers: RPC_VERSION,
            prog: 0,
            vers: 0,
            proc: 0,
            cred: opaque_auth::default(),
            verf: opaque_auth::default(),
        }
    }
}

/// Union over [`reply_stat`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum reply_body {
    MSG_ACCEPTED(accepted_reply),
    MSG_DENIED(rejected_reply),
}

impl Default for reply_body {
    fn default() -> reply_body {
        reply_body::MSG_ACCEPTED(accepted_reply::default())
    }
}

impl Serialize for reply_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            reply_body::MSG_ACCEPTED(accepted) => {
                reply_stat::MSG_ACCEPTED.serialize(dest)?;
                accepted.serialize(dest)
            }
            reply_body::MSG_DENIED(rejected) => {
                reply_stat::MSG_DENIED.serialize(dest)?;
                rejected.serialize(dest)
            }
        }
    }
}

impl Deserialize for reply_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match deserialize::<reply_stat>(src)? {
            reply_stat::MSG_ACCEPTED => reply_body::MSG_ACCEPTED(deserialize(src)?),
            reply_stat::MSG_DENIED => reply_body::MSG_DENIED(deserialize(src)?),
        };
        Ok(())
    }
}

/// Lowest and highest version the server supports.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct mismatch_info {
    pub low: u32,
    pub high: u32,
}
DeserializeStruct!(mismatch_info, low, high);
SerializeStruct!(mismatch_info, low, high);

/// An accepted call may still have failed, see [`accept_body`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct accepted_reply {
    pub verf: opaque_auth,
    pub reply_data: accept_body,
}
DeserializeStruct!(accepted_reply, verf, reply_data);
SerializeStruct!(accepted_reply, verf, reply_data);

/// Union over [`accept_stat`].
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum accept_body {
    /// Procedure results follow.
    #[default]
    SUCCESS,
    PROG_UNAVAIL,
    PROG_MISMATCH(mismatch_info),
    PROC_UNAVAIL,
    /// The server could not decode the arguments.
    GARBAGE_ARGS,
    SYSTEM_ERR,
}

impl accept_body {
    pub fn stat(&self) -> accept_stat {
        match self {
            accept_body::SUCCESS => accept_stat::SUCCESS,
            accept_body::PROG_UNAVAIL => accept_stat::PROG_UNAVAIL,
            accept_body::PROG_MISMATCH(_) => accept_stat::PROG_MISMATCH,
            accept_body::PROC_UNAVAIL => accept_stat::PROC_UNAVAIL,
            accept_body::GARBAGE_ARGS => accept_stat::GARBAGE_ARGS,
            accept_body::SYSTEM_ERR => accept_stat::SYSTEM_ERR,
        }
    }
}

impl Serialize for accept_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.stat().serialize(dest)?;
        match self {
            accept_body::PROG_MISMATCH(info) => info.serialize(dest),
            _ => Ok(()),
        }
    }
}

impl Deserialize for accept_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match deserialize::<accept_stat>(src)? {
            accept_stat::SUCCESS => accept_body::SUCCESS,
            accept_stat::PROG_UNAVAIL => accept_body::PROG_UNAVAIL,
            accept_stat::PROG_MISMATCH => accept_body::PROG_MISMATCH(deserialize(src)?),
            accept_stat::PROC_UNAVAIL => accept_body::PROC_UNAVAIL,
            accept_stat::GARBAGE_ARGS => accept_body::GARBAGE_ARGS,
            accept_stat::SYSTEM_ERR => accept_body::SYSTEM_ERR,
        };
        Ok(())
    }
}

/// Union over [`reject_stat`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum rejected_reply {
    /// The server speaks only the RPC versions in the range.
    RPC_MISMATCH(mismatch_info),
    AUTH_ERROR(auth_stat),
}

impl Default for rejected_reply {
    fn default() -> rejected_reply {
        rejected_reply::AUTH_ERROR(auth_stat::default())
    }
}

impl Serialize for rejected_reply {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rejected_reply::RPC_MISMATCH(info) => {
                reject_stat::RPC_MISMATCH.serialize(dest)?;
                info.serialize(dest)
            }
            rejected_reply::AUTH_ERROR(stat) => {
                reject_stat::AUTH_ERROR.serialize(dest)?;
                stat.serialize(dest)
            }
        }
    }
}

impl Deserialize for rejected_reply {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match deserialize::<reject_stat>(src)? {
            reject_stat::RPC_MISMATCH => rejected_reply::RPC_MISMATCH(deserialize(src)?),
            reject_stat::AUTH_ERROR => rejected_reply::AUTH_ERROR(deserialize(src)?),
        };
        Ok(())
    }
}
