//! RPC client over UDP.
//!
//! UDP gives no delivery guarantee, so the client retransmits a call until a
//! reply arrives or the total timeout expires, see [`RetransmitSchedule`].
//! Retransmissions reuse the xid of the call, so whichever copy the server
//! answers completes it. Datagrams from other hosts, with another xid, or that
//! are not replies are dropped and the wait goes on.

use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use crate::protocol::xdr::datagram::{DatagramDecoder, DatagramEncoder};
use crate::protocol::xdr::{deserialize, Deserialize, Serialize};

use super::auth::Authenticator;
use super::config::{ClientConfig, RetransmissionMode};
use super::error::{decode_error, encode_error, Result, RpcError};
use super::message::{initial_xid, CallMessage, ReplyMessage};
use super::retransmit::RetransmitSchedule;

/// Steps of a single call.
#[derive(Debug)]
enum CallState {
    /// Pick an xid and start the clock.
    Start,
    Send(CallMessage, RetransmitSchedule),
    AwaitReply(CallMessage, RetransmitSchedule),
    Retransmit(CallMessage, RetransmitSchedule),
    /// The authenticator changed its credential, run the call once more.
    Refresh,
    TimedOut,
}

/// What a wait for the reply ended with.
enum Awaited {
    Reply(ReplyMessage),
    Expired,
}

#[derive(Debug)]
pub struct UdpClient {
    socket: UdpSocket,
    peer: SocketAddr,
    program: u32,
    version: u32,
    timeout: Duration,
    retransmission_timeout: Duration,
    retransmission_mode: RetransmissionMode,
    auth: Box<dyn Authenticator>,
    encoder: DatagramEncoder,
    decoder: DatagramDecoder,
    xid: u32,
}

impl UdpClient {
    /// Binds an ephemeral local port for talking to `config.host:config.port`.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let peer = config.resolve().await.map_err(RpcError::TransportSendFailure)?;
        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await.map_err(RpcError::TransportSendFailure)?;
        debug!(
            "UDP client for program {} version {} at {} bound to {:?}",
            config.program,
            config.version,
            peer,
            socket.local_addr()
        );
        Ok(Self {
            socket,
            peer,
            program: config.program,
            version: config.version,
            timeout: config.timeout,
            retransmission_timeout: config.retransmission_timeout,
            retransmission_mode: config.retransmission_mode,
            auth: config.auth.clone(),
            encoder: DatagramEncoder::new(config.buffer_size),
            decoder: DatagramDecoder::new(config.buffer_size),
            xid: initial_xid(),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(RpcError::TransportReceiveFailure)
    }

    pub fn program(&self) -> u32 {
        self.program
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn retransmission_timeout(&self) -> Duration {
        self.retransmission_timeout
    }

    pub fn set_retransmission_timeout(&mut self, timeout: Duration) {
        self.retransmission_timeout = timeout;
    }

    pub fn retransmission_mode(&self) -> RetransmissionMode {
        self.retransmission_mode
    }

    pub fn set_retransmission_mode(&mut self, mode: RetransmissionMode) {
        self.retransmission_mode = mode;
    }

    pub fn auth(&self) -> &dyn Authenticator {
        self.auth.as_ref()
    }

    pub fn set_auth(&mut self, auth: Box<dyn Authenticator>) {
        self.auth = auth;
    }

    /// Calls `procedure` of the configured program version.
    pub async fn call<A, R>(&mut self, procedure: u32, args: &A, result: &mut R) -> Result<()>
    where
        A: Serialize + ?Sized,
        R: Deserialize,
    {
        let version = self.version;
        self.call_version(procedure, version, args, result).await
    }

    /// Calls `procedure` of another version of the program.
    ///
    /// With a zero total or retransmission timeout the call is one-way: it
    /// returns as soon as the datagram is sent and `result` is left untouched.
    pub async fn call_version<A, R>(
        &mut self,
        procedure: u32,
        version: u32,
        args: &A,
        result: &mut R,
    ) -> Result<()>
    where
        A: Serialize + ?Sized,
        R: Deserialize,
    {
        let one_way = self.timeout.is_zero() || self.retransmission_timeout.is_zero();
        let mut refreshed = false;
        let mut state = CallState::Start;
        loop {
            state = match state {
                CallState::Start => {
                    let call = CallMessage::new(self.next_xid(), self.program, version, procedure);
                    debug!(
                        "Calling program {} version {} procedure {}, xid: {}",
                        call.program, call.version, call.procedure, call.xid
                    );
                    let schedule = RetransmitSchedule::new(
                        Instant::now(),
                        self.timeout,
                        self.retransmission_timeout,
                        self.retransmission_mode,
                    );
                    CallState::Send(call, schedule)
                }
                CallState::Send(call, schedule) => {
                    self.send_call(&call, args, self.peer).await?;
                    if one_way {
                        return Ok(());
                    }
                    CallState::AwaitReply(call, schedule)
                }
                CallState::AwaitReply(call, mut schedule) => {
                    match self.await_reply(call.xid, &schedule).await? {
                        Awaited::Reply(reply) => match reply.to_error() {
                            None => {
                                let decoded = result.deserialize(&mut self.decoder);
                                self.decoder.end_decoding();
                                return decoded.map_err(decode_error);
                            }
                            Some(err) => {
                                self.decoder.end_decoding();
                                if reply.is_auth_error() && !refreshed && self.auth.can_refresh() {
                                    refreshed = true;
                                    CallState::Refresh
                                } else {
                                    return Err(err);
                                }
                            }
                        },
                        Awaited::Expired => {
                            schedule.backoff();
                            if schedule.expired(Instant::now()) {
                                CallState::TimedOut
                            } else {
                                CallState::Retransmit(call, schedule)
                            }
                        }
                    }
                }
                CallState::Retransmit(call, schedule) => {
                    debug!(
                        "Retransmitting xid: {}, next wait {:?}",
                        call.xid,
                        schedule.resend_timeout()
                    );
                    CallState::Send(call, schedule)
                }
                CallState::Refresh => {
                    warn!("Credential rejected by {}, retrying with refreshed credential", self.peer);
                    CallState::Start
                }
                CallState::TimedOut => {
                    debug!("Call to {} timed out", self.peer);
                    return Err(RpcError::Timeout);
                }
            };
        }
    }

    /// Sends a call once to `self.peer`, usually a broadcast address, and
    /// collects replies until the total timeout.
    ///
    /// `on_reply` runs once for every distinct responder whose reply was
    /// accepted and decodes as `R`. Replies that are rejected or do not decode
    /// are skipped.
    pub async fn broadcast_call<A, R, F>(
        &mut self,
        procedure: u32,
        args: &A,
        mut on_reply: F,
    ) -> Result<()>
    where
        A: Serialize + ?Sized,
        R: Deserialize + Default,
        F: FnMut(SocketAddr, R),
    {
        let call = CallMessage::new(self.next_xid(), self.program, self.version, procedure);
        debug!("Broadcasting procedure {} to {}, xid: {}", procedure, self.peer, call.xid);
        self.socket.set_broadcast(true).map_err(RpcError::TransportSendFailure)?;
        let sent = self.send_call(&call, args, self.peer).await;
        let collected = match sent {
            Ok(()) => self.collect_replies(call.xid, &mut on_reply).await,
            Err(err) => Err(err),
        };
        self.socket.set_broadcast(false).map_err(RpcError::TransportSendFailure)?;
        collected
    }

    async fn collect_replies<R, F>(&mut self, xid: u32, on_reply: &mut F) -> Result<()>
    where
        R: Deserialize + Default,
        F: FnMut(SocketAddr, R),
    {
        let deadline = Instant::now() + self.timeout;
        let mut responders = HashSet::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            let received = time::timeout(remaining, self.socket.recv_from(self.decoder.receive_buffer())).await;
            let (len, source) = match received {
                Err(_) => return Ok(()),
                Ok(received) => received.map_err(RpcError::TransportReceiveFailure)?,
            };
            self.decoder.begin_decoding(len);
            if self.decoder.peek_u32() != Some(xid) {
                trace!("Dropping unrelated datagram from {}", source);
                self.decoder.end_decoding();
                continue;
            }
            let reply = match ReplyMessage::decode(&mut self.decoder, self.auth.as_mut()) {
                Ok(reply) => reply,
                Err(err) => {
                    warn!("Skipping bad broadcast reply from {}: {}", source, err);
                    self.decoder.end_decoding();
                    continue;
                }
            };
            if let Some(err) = reply.to_error() {
                debug!("Skipping broadcast reply from {}: {}", source, err);
                self.decoder.end_decoding();
                continue;
            }
            let decoded = deserialize::<R>(&mut self.decoder);
            self.decoder.end_decoding();
            match decoded {
                Ok(result) => {
                    if responders.insert(source) {
                        on_reply(source, result);
                    } else {
                        trace!("Duplicate broadcast reply from {}", source);
                    }
                }
                Err(err) => warn!("Skipping undecodable broadcast reply from {}: {}", source, err),
            }
        }
    }

    fn next_xid(&mut self) -> u32 {
        self.xid = self.xid.wrapping_add(1);
        self.xid
    }

    async fn send_call<A>(&mut self, call: &CallMessage, args: &A, to: SocketAddr) -> Result<()>
    where
        A: Serialize + ?Sized,
    {
        self.encoder.begin_encoding();
        call.encode(&mut self.encoder, self.auth.as_ref())?;
        args.serialize(&mut self.encoder).map_err(encode_error)?;
        let datagram = self.encoder.end_encoding();
        let sent = self.socket.send_to(datagram, to).await.map_err(RpcError::TransportSendFailure)?;
        trace!("Sent {} bytes to {}, xid: {}", sent, to, call.xid);
        Ok(())
    }

    /// Waits for the reply to `xid` until the current retransmission
    /// timeout runs out. On success the decoder is left positioned at the
    /// procedure results.
    async fn await_reply(&mut self, xid: u32, schedule: &RetransmitSchedule) -> Result<Awaited> {
        loop {
            let wait = schedule.wait_time(Instant::now());
            let received = time::timeout(wait, self.socket.recv_from(self.decoder.receive_buffer())).await;
            let (len, source) = match received {
                Err(_) => return Ok(Awaited::Expired),
                Ok(received) => received.map_err(RpcError::TransportReceiveFailure)?,
            };
            if source.ip() != self.peer.ip() {
                warn!("Dropping datagram from {}, expected {}", source, self.peer);
                continue;
            }
            self.decoder.begin_decoding(len);
            match self.decoder.peek_u32() {
                Some(reply_xid) if reply_xid == xid => {}
                other => {
                    debug!("Dropping reply with xid {:?}, expected {}", other, xid);
                    self.decoder.end_decoding();
                    continue;
                }
            }
            match ReplyMessage::decode(&mut self.decoder, self.auth.as_mut()) {
                Ok(reply) => return Ok(Awaited::Reply(reply)),
                Err(RpcError::WrongMessageType(message_type)) => {
                    warn!("Dropping message of type {} with xid {}", message_type, xid);
                    self.decoder.end_decoding();
                }
                Err(err) => {
                    self.decoder.end_decoding();
                    return Err(err);
                }
            }
        }
    }
}
