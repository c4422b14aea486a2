//! RPC client over a byte stream, normally TCP.
//!
//! Calls are sent as record-marked records. The stream is reliable, so
//! there is no retransmission: any read or write failure ends the call at
//! once. Calls can be batched, see [`TcpClient::batch_call`].

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, trace, warn};

use crate::protocol::xdr::record::{RecordDecoder, RecordEncoder};
use crate::protocol::xdr::{Deserialize, Serialize};

use super::auth::Authenticator;
use super::config::ClientConfig;
use super::error::{decode_error, encode_error, Result, RpcError};
use super::message::{initial_xid, CallMessage, ReplyMessage};

#[derive(Debug)]
pub struct TcpClient<S = TcpStream> {
    stream: S,
    peer: Option<SocketAddr>,
    program: u32,
    version: u32,
    timeout: Duration,
    transmission_timeout: Duration,
    auth: Box<dyn Authenticator>,
    encoder: RecordEncoder,
    decoder: RecordDecoder,
    xid: u32,
    /// Set once a failed read or write may have left the stream inside a
    /// record. Every later call fails without touching the stream.
    broken: bool,
}

impl TcpClient<TcpStream> {
    /// Connects to `config.host:config.port`, bounded by
    /// `config.connect_timeout` when one is set.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let address = config.resolve().await.map_err(RpcError::TransportSendFailure)?;
        let connecting = TcpStream::connect(address);
        let stream = match config.connect_timeout {
            Some(limit) => time::timeout(limit, connecting).await.map_err(|_| {
                RpcError::TransportSendFailure(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {address} timed out"),
                ))
            })?,
            None => connecting.await,
        }
        .map_err(RpcError::TransportSendFailure)?;
        stream.set_nodelay(true).map_err(RpcError::TransportSendFailure)?;
        debug!(
            "TCP client for program {} version {} connected to {}",
            config.program, config.version, address
        );
        let mut client = Self::from_stream(stream, config);
        client.peer = Some(address);
        Ok(client)
    }
}

impl<S> TcpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already connected stream. Host and port of `config` are not used.
    pub fn from_stream(stream: S, config: &ClientConfig) -> Self {
        Self {
            stream,
            peer: None,
            program: config.program,
            version: config.version,
            timeout: config.timeout,
            transmission_timeout: config.transmission_timeout,
            auth: config.auth.clone(),
            encoder: RecordEncoder::new(config.buffer_size),
            decoder: RecordDecoder::new(),
            xid: initial_xid(),
            broken: false,
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
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

    /// Zero turns [`TcpClient::call`] into a batched call without reply.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn transmission_timeout(&self) -> Duration {
        self.transmission_timeout
    }

    pub fn set_transmission_timeout(&mut self, timeout: Duration) {
        self.transmission_timeout = timeout;
    }

    pub fn auth(&self) -> &dyn Authenticator {
        self.auth.as_ref()
    }

    pub fn set_auth(&mut self, auth: Box<dyn Authenticator>) {
        self.auth = auth;
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
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

    /// Calls `procedure` of another version of the program and waits for
    /// its reply. Replies to earlier calls still in the stream are skipped.
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
        self.ensure_in_sync()?;
        let mut refreshed = false;
        loop {
            let call = CallMessage::new(self.next_xid(), self.program, version, procedure);
            debug!(
                "Calling program {} version {} procedure {}, xid: {}",
                call.program, call.version, call.procedure, call.xid
            );
            self.encode_call(&call, args)?;
            if self.timeout.is_zero() {
                if self.encoder.end_encoding(false) {
                    self.write_pending().await?;
                }
                return Ok(());
            }
            self.encoder.end_encoding(true);
            self.write_pending().await?;

            let timeout = self.timeout;
            let reply = match time::timeout(timeout, self.read_reply(call.xid)).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(err)) => {
                    if matches!(err, RpcError::TransportReceiveFailure(_)) {
                        self.broken = true;
                    }
                    return Err(err);
                }
                Err(_) => {
                    debug!("Call xid: {} timed out after {:?}", call.xid, timeout);
                    self.broken = true;
                    return Err(RpcError::Timeout);
                }
            };
            match reply.to_error() {
                None => {
                    let decoded = result.deserialize(&mut self.decoder);
                    self.decoder.end_decoding();
                    return decoded.map_err(decode_error);
                }
                Some(err) => {
                    self.decoder.end_decoding();
                    if reply.is_auth_error() && !refreshed && self.auth.can_refresh() {
                        warn!("Credential rejected, retrying with refreshed credential");
                        refreshed = true;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Queues a call that expects no reply.
    ///
    /// Queued calls go out together in a single write once `flush` is true
    /// or the queue is full.
    pub async fn batch_call<A>(&mut self, procedure: u32, args: &A, flush: bool) -> Result<()>
    where
        A: Serialize + ?Sized,
    {
        self.ensure_in_sync()?;
        let call = CallMessage::new(self.next_xid(), self.program, self.version, procedure);
        trace!("Batching procedure {}, xid: {}, flush: {}", procedure, call.xid, flush);
        self.encode_call(&call, args)?;
        if self.encoder.end_encoding(flush) {
            self.write_pending().await?;
        }
        Ok(())
    }

    /// Whether an earlier failure left the stream out of sync.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn ensure_in_sync(&self) -> Result<()> {
        if self.broken {
            return Err(RpcError::TransportReceiveFailure(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stream left inside a record by an earlier failure",
            )));
        }
        Ok(())
    }

    fn next_xid(&mut self) -> u32 {
        self.xid = self.xid.wrapping_add(1);
        self.xid
    }

    fn encode_call<A>(&mut self, call: &CallMessage, args: &A) -> Result<()>
    where
        A: Serialize + ?Sized,
    {
        self.encoder.begin_encoding();
        let encoded = call
            .encode(&mut self.encoder, self.auth.as_ref())
            .and_then(|()| args.serialize(&mut self.encoder).map_err(encode_error));
        if encoded.is_err() {
            self.encoder.abort_encoding();
        }
        encoded
    }

    /// Writes every queued record in one go.
    async fn write_pending(&mut self) -> Result<()> {
        let limit = self.transmission_timeout;
        let Self { stream, encoder, broken, .. } = self;
        let pending = encoder.pending();
        trace!("Writing {} queued bytes", pending.len());
        let written = time::timeout(limit, async {
            stream.write_all(pending).await?;
            stream.flush().await
        })
        .await;
        encoder.clear();
        let written = match written {
            Ok(written) => written,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write did not finish within {limit:?}"),
            )),
        };
        written.map_err(|err| {
            *broken = true;
            RpcError::TransportSendFailure(err)
        })
    }

    /// Reads records until the reply to `xid` shows up. On success the
    /// decoder is left positioned at the procedure results.
    async fn read_reply(&mut self, xid: u32) -> Result<ReplyMessage> {
        loop {
            self.decoder
                .begin_decoding(&mut self.stream)
                .await
                .map_err(RpcError::TransportReceiveFailure)?;
            match self.decoder.peek_u32() {
                Some(reply_xid) if reply_xid == xid => {}
                other => {
                    debug!("Skipping stale reply with xid {:?}, expected {}", other, xid);
                    self.decoder.end_decoding();
                    continue;
                }
            }
            match ReplyMessage::decode(&mut self.decoder, self.auth.as_mut()) {
                Ok(reply) => return Ok(reply),
                Err(RpcError::WrongMessageType(message_type)) => {
                    warn!("Skipping message of type {} with xid {}", message_type, xid);
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
