//! PORTMAP program 100000 version 2 (RFC 1833, section 3).
//!
//! Every host running RPC services has a portmapper listening on port 111.
//! Servers register the port of each program, version and transport with
//! it, and clients ask it where to send their calls.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::*;

pub const PROGRAM: u32 = 100000;
pub const VERSION: u32 = 2;
/// Where the portmapper listens, over both UDP and TCP.
pub const PORT: u16 = 111;

/// `prot` value of TCP registrations.
pub const IPPROTO_TCP: u32 = 6;
/// `prot` value of UDP registrations.
pub const IPPROTO_UDP: u32 = 17;

/// One registration. The same program and version may be registered once
/// per transport. `port` is zero in queries and in UNSET arguments.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct mapping {
    pub prog: u32,
    pub vers: u32,
    /// [`IPPROTO_UDP`] or [`IPPROTO_TCP`].
    pub prot: u32,
    pub port: u32,
}
DeserializeStruct!(mapping, prog, vers, prot, port);
SerializeStruct!(mapping, prog, vers, prot, port);

/// Result of PMAPPROC_DUMP.
///
/// The XDR type is a linked list: each entry comes after a TRUE
/// "value follows" flag and FALSE ends the list. It is read in a loop into
/// a vector, however long the list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct pmaplist(pub Vec<mapping>);

impl Serialize for pmaplist {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.iter().try_for_each(|entry| {
            true.serialize(dest)?;
            entry.serialize(dest)
        })?;
        false.serialize(dest)
    }
}

impl Deserialize for pmaplist {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.clear();
        while deserialize::<bool>(src)? {
            self.0.push(deserialize(src)?);
        }
        Ok(())
    }
}

/// Arguments of PMAPPROC_CALLIT.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct call_args {
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    /// Arguments of the forwarded call, already encoded.
    pub args: Vec<u8>,
}
DeserializeStruct!(call_args, prog, vers, proc, args);
SerializeStruct!(call_args, prog, vers, proc, args);

/// Results of PMAPPROC_CALLIT.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct call_result {
    /// Port of the program that ran the forwarded call.
    pub port: u32,
    /// Encoded results of the forwarded call.
    pub res: Vec<u8>,
}
DeserializeStruct!(call_result, port, res);
SerializeStruct!(call_result, port, res);

#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum PortmapProcedure {
    PMAPPROC_NULL = 0,
    PMAPPROC_SET = 1,
    PMAPPROC_UNSET = 2,
    PMAPPROC_GETPORT = 3,
    PMAPPROC_DUMP = 4,
    PMAPPROC_CALLIT = 5,
}
impl SerializeEnum for PortmapProcedure {}
impl DeserializeEnum for PortmapProcedure {}

impl From<PortmapProcedure> for u32 {
    fn from(procedure: PortmapProcedure) -> u32 {
        procedure as u32
    }
}
