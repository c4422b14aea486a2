//! Authentication flavors a client can attach to its calls.
//!
//! An [`Authenticator`] writes the credential and verifier of every call and
//! checks the verifier of every reply. Only AUTH_NONE and AUTH_UNIX (with the
//! AUTH_SHORT shorthand a server may hand out in exchange) are provided.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use num_traits::FromPrimitive;
use tracing::{debug, trace};

use super::error::AuthError;
use crate::protocol::xdr::rpc::{
    auth_flavor, auth_stat, auth_unix, MAX_AUTH_BYTES, MAX_GROUPS, MAX_MACHINE_NAME,
};
use crate::protocol::xdr::{deserialize, padding_len, Serialize};

/// Credential strategy used by a client.
///
/// Failures travel as [`io::Error`] carrying an [`AuthError`], the client
/// turns them into the matching [`super::RpcError`].
pub trait Authenticator: fmt::Debug + Send + Sync {
    /// Writes the credential followed by the verifier of a call.
    fn encode_credential_and_verifier(&self, dest: &mut dyn Write) -> io::Result<()>;

    /// Reads and checks the verifier of an accepted reply.
    fn decode_verifier(&mut self, src: &mut dyn Read) -> io::Result<()>;

    /// Called after the server rejected the credential.
    ///
    /// Returns `true` when the authenticator changed its state so that one
    /// more attempt makes sense.
    fn can_refresh(&mut self) -> bool;

    fn box_clone(&self) -> Box<dyn Authenticator>;
}

impl Clone for Box<dyn Authenticator> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// AUTH_NONE: empty credential and verifier.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthNone;

impl Authenticator for AuthNone {
    fn encode_credential_and_verifier(&self, mut dest: &mut dyn Write) -> io::Result<()> {
        write_none(&mut dest)?;
        write_none(&mut dest)
    }

    fn decode_verifier(&mut self, mut src: &mut dyn Read) -> io::Result<()> {
        let flavor = deserialize::<u32>(&mut src)?;
        let length = deserialize::<u32>(&mut src)?;
        if flavor != auth_flavor::AUTH_NONE as u32 || length != 0 {
            return Err(AuthError::Failed(auth_stat::AUTH_FAILED).into());
        }
        Ok(())
    }

    fn can_refresh(&mut self) -> bool {
        false
    }

    fn box_clone(&self) -> Box<dyn Authenticator> {
        Box::new(*self)
    }
}

/// AUTH_UNIX credentials of the calling user.
///
/// When a server answers with an AUTH_SHORT verifier, the token it carries
/// replaces the full credential in subsequent calls. If the server later
/// rejects the token, [`Authenticator::can_refresh`] drops it and the full
/// credential is sent again with a fresh stamp.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthUnix {
    credential: auth_unix,
    shorthand: Option<Vec<u8>>,
}

impl AuthUnix {
    pub fn new(machine_name: &str, uid: u32, gid: u32, gids: &[u32]) -> Self {
        Self {
            credential: auth_unix {
                stamp: epoch_seconds(),
                machinename: machine_name.as_bytes().to_vec(),
                uid,
                gid,
                gids: gids.to_vec(),
            },
            shorthand: None,
        }
    }

    pub fn stamp(&self) -> u32 {
        self.credential.stamp
    }

    pub fn set_stamp(&mut self, stamp: u32) {
        self.credential.stamp = stamp;
    }

    pub fn machine_name(&self) -> &[u8] {
        &self.credential.machinename
    }

    pub fn set_machine_name(&mut self, machine_name: &str) {
        self.credential.machinename = machine_name.as_bytes().to_vec();
    }

    pub fn uid(&self) -> u32 {
        self.credential.uid
    }

    pub fn set_uid(&mut self, uid: u32) {
        self.credential.uid = uid;
    }

    pub fn gid(&self) -> u32 {
        self.credential.gid
    }

    pub fn set_gid(&mut self, gid: u32) {
        self.credential.gid = gid;
    }

    pub fn gids(&self) -> &[u32] {
        &self.credential.gids
    }

    pub fn set_gids(&mut self, gids: &[u32]) {
        self.credential.gids = gids.to_vec();
    }

    /// Shorthand token issued by the server, if one is held.
    pub fn shorthand(&self) -> Option<&[u8]> {
        self.shorthand.as_deref()
    }

    /// Byte length of the encoded AUTH_UNIX body.
    fn body_length(&self) -> usize {
        let name = self.credential.machinename.len();
        4 + 4 + name + padding_len(name) + 4 + 4 + 4 + self.credential.gids.len() * 4
    }
}

impl fmt::Debug for AuthUnix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthUnix")
            .field("stamp", &self.credential.stamp)
            .field("machinename", &String::from_utf8_lossy(&self.credential.machinename))
            .field("uid", &self.credential.uid)
            .field("gid", &self.credential.gid)
            .field("gids", &self.credential.gids)
            .field("shorthand", &self.shorthand.as_ref().map(Vec::len))
            .finish()
    }
}

impl Authenticator for AuthUnix {
    fn encode_credential_and_verifier(&self, mut dest: &mut dyn Write) -> io::Result<()> {
        match &self.shorthand {
            Some(token) => {
                auth_flavor::AUTH_SHORT.serialize(&mut dest)?;
                token.serialize(&mut dest)?;
            }
            None => {
                let length = self.body_length();
                if self.credential.gids.len() > MAX_GROUPS
                    || self.credential.machinename.len() > MAX_MACHINE_NAME
                    || length > MAX_AUTH_BYTES
                {
                    return Err(AuthError::Failed(auth_stat::AUTH_FAILED).into());
                }
                auth_flavor::AUTH_UNIX.serialize(&mut dest)?;
                (length as u32).serialize(&mut dest)?;
                self.credential.serialize(&mut dest)?;
            }
        }
        write_none(&mut dest)
    }

    fn decode_verifier(&mut self, mut src: &mut dyn Read) -> io::Result<()> {
        let flavor = deserialize::<u32>(&mut src)?;
        match auth_flavor::from_u32(flavor) {
            Some(auth_flavor::AUTH_NONE) => {
                if deserialize::<u32>(&mut src)? != 0 {
                    return Err(AuthError::Failed(auth_stat::AUTH_FAILED).into());
                }
            }
            Some(auth_flavor::AUTH_SHORT) => {
                let token = deserialize::<Vec<u8>>(&mut src)?;
                if token.len() > MAX_AUTH_BYTES {
                    return Err(AuthError::Failed(auth_stat::AUTH_FAILED).into());
                }
                trace!("Received AUTH_SHORT token of {} bytes", token.len());
                self.shorthand = Some(token);
            }
            _ => return Err(AuthError::InvalidResponse.into()),
        }
        Ok(())
    }

    fn can_refresh(&mut self) -> bool {
        if self.shorthand.take().is_none() {
            return false;
        }
        self.credential.stamp = epoch_seconds();
        debug!("Dropped AUTH_SHORT token, falling back to AUTH_UNIX");
        true
    }

    fn box_clone(&self) -> Box<dyn Authenticator> {
        Box::new(self.clone())
    }
}

fn write_none(dest: &mut impl Write) -> io::Result<()> {
    auth_flavor::AUTH_NONE.serialize(dest)?;
    0_u32.serialize(dest)
}

fn epoch_seconds() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(auth: &dyn Authenticator) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        auth.encode_credential_and_verifier(&mut out)?;
        Ok(out)
    }

    #[test]
    fn none_is_two_empty_opaque_auths() {
        assert_eq!(encode(&AuthNone).unwrap(), vec![0; 16]);
    }

    #[test]
    fn unix_body_length_matches_encoding() {
        let mut auth = AuthUnix::new("host1", 1000, 100, &[4, 24]);
        auth.set_stamp(7);
        let bytes = encode(&auth).unwrap();
        let declared = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        // flavor, length, body, then the AUTH_NONE verifier
        assert_eq!(bytes.len(), 8 + declared + 8);
        assert_eq!(declared, 4 + 4 + 8 + 4 + 4 + 4 + 8);
    }

    #[test]
    fn unix_refresh_needs_a_token() {
        let mut auth = AuthUnix::new("host1", 0, 0, &[]);
        assert!(!auth.can_refresh());

        let verifier = [0, 0, 0, 2, 0, 0, 0, 4, 1, 2, 3, 4];
        auth.decode_verifier(&mut &verifier[..]).unwrap();
        assert_eq!(auth.shorthand(), Some(&[1, 2, 3, 4][..]));
        assert!(auth.can_refresh());
        assert!(auth.shorthand().is_none());
        assert!(!auth.can_refresh());
    }
}
