#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use num_traits::FromPrimitive;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use oncrpc_mamont::rpc::ClientConfig;
use oncrpc_mamont::xdr::portmap::{
    call_args, call_result, mapping, pmaplist, PortmapProcedure, IPPROTO_UDP,
};
use oncrpc_mamont::xdr::record::{fragment_header, read_fragment};
use oncrpc_mamont::xdr::rpc::{accept_body, call_body, rpc_body, rpc_msg};
use oncrpc_mamont::xdr::{deserialize, Deserialize, Serialize, Void};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A call as a server sees it: the header plus the raw argument bytes.
#[derive(Debug)]
pub struct ReceivedCall {
    pub xid: u32,
    pub call: call_body,
    pub args: Vec<u8>,
}

impl ReceivedCall {
    pub fn parse(message: &[u8]) -> ReceivedCall {
        let mut cursor = Cursor::new(message);
        let msg = deserialize::<rpc_msg>(&mut cursor).expect("cannot decode call");
        let rpc_body::CALL(call) = msg.body else {
            panic!("expected a call, got {:?}", msg.body);
        };
        let args = message[cursor.position() as usize..].to_vec();
        ReceivedCall { xid: msg.xid, call, args }
    }

    pub fn args<T: Deserialize + Default>(&self) -> T {
        deserialize::<T>(&mut &self.args[..]).expect("cannot decode arguments")
    }
}

/// Reply header followed by procedure results.
pub fn reply_bytes<T: Serialize + ?Sized>(msg: &rpc_msg, results: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    msg.serialize(&mut buf).expect("cannot encode reply");
    results.serialize(&mut buf).expect("cannot encode results");
    buf
}

pub fn success<T: Serialize + ?Sized>(xid: u32, results: &T) -> Vec<u8> {
    reply_bytes(&rpc_msg::success(xid), results)
}

/// Reads one record-marked record from the server end of a stream.
pub async fn read_record<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<Vec<u8>> {
    let mut record = Vec::new();
    while !read_fragment(stream, &mut record).await? {}
    Ok(record)
}

/// Writes `record` as a single last fragment.
pub async fn write_record<S: AsyncWrite + Unpin>(stream: &mut S, record: &[u8]) {
    stream
        .write_all(&fragment_header(record.len(), true).to_be_bytes())
        .await
        .expect("write fragment header");
    stream.write_all(record).await.expect("write fragment body");
}

pub async fn bind_udp(ip: &str) -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind((ip, 0)).await.expect("bind udp socket");
    let addr = socket.local_addr().expect("local addr");
    (socket, addr)
}

/// Client configuration pointing at a loopback server.
pub fn loopback_config(port: u16, program: u32, version: u32) -> ClientConfig {
    ClientConfig::new("127.0.0.1", program, version)
        .with_port(port)
        .with_timeout(Duration::from_secs(2))
        .with_retransmission_timeout(Duration::from_millis(500))
}

/// Counts the writes issued on a stream.
pub struct CountingStream<S> {
    inner: S,
    writes: Arc<AtomicUsize>,
}

impl<S> CountingStream<S> {
    pub fn new(inner: S) -> (Self, Arc<AtomicUsize>) {
        let writes = Arc::new(AtomicUsize::new(0));
        (CountingStream { inner, writes: writes.clone() }, writes)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CountingStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CountingStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write(cx, buf);
        if polled.is_ready() {
            this.writes.fetch_add(1, Ordering::SeqCst);
        }
        polled
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// A portmapper over UDP backed by an in-memory table.
pub struct FakeRegistrar {
    pub addr: SocketAddr,
    pub table: Arc<Mutex<Vec<mapping>>>,
    task: JoinHandle<()>,
}

impl FakeRegistrar {
    pub async fn start(entries: Vec<mapping>) -> FakeRegistrar {
        let (socket, addr) = bind_udp("127.0.0.1").await;
        let table = Arc::new(Mutex::new(entries));
        let shared = table.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0_u8; 8192];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let call = ReceivedCall::parse(&buf[..len]);
                let response = handle_portmap(&call, &shared);
                let _ = socket.send_to(&response, peer).await;
            }
        });
        FakeRegistrar { addr, table, task }
    }

    /// Configuration for a client whose portmapper is this registrar.
    pub fn config(&self, program: u32, version: u32) -> ClientConfig {
        ClientConfig::new("127.0.0.1", program, version)
            .with_portmapper_port(self.addr.port())
            .with_timeout(Duration::from_secs(2))
            .with_retransmission_timeout(Duration::from_millis(500))
    }

    pub fn entries(&self) -> Vec<mapping> {
        self.table.lock().expect("table lock").clone()
    }
}

impl Drop for FakeRegistrar {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn handle_portmap(call: &ReceivedCall, table: &Mutex<Vec<mapping>>) -> Vec<u8> {
    let xid = call.xid;
    let mut table = table.lock().expect("table lock");
    match PortmapProcedure::from_u32(call.call.proc) {
        Some(PortmapProcedure::PMAPPROC_NULL) => success(xid, &Void),
        Some(PortmapProcedure::PMAPPROC_SET) => {
            let entry = call.args::<mapping>();
            let known = table
                .iter()
                .any(|e| e.prog == entry.prog && e.vers == entry.vers && e.prot == entry.prot);
            if !known {
                table.push(entry);
            }
            success(xid, &!known)
        }
        Some(PortmapProcedure::PMAPPROC_UNSET) => {
            let entry = call.args::<mapping>();
            let before = table.len();
            table.retain(|e| !(e.prog == entry.prog && e.vers == entry.vers));
            success(xid, &(table.len() != before))
        }
        Some(PortmapProcedure::PMAPPROC_GETPORT) => {
            let query = call.args::<mapping>();
            let port = table
                .iter()
                .find(|e| e.prog == query.prog && e.vers == query.vers && e.prot == query.prot)
                .map_or(0, |e| e.port);
            success(xid, &port)
        }
        Some(PortmapProcedure::PMAPPROC_DUMP) => success(xid, &pmaplist(table.clone())),
        Some(PortmapProcedure::PMAPPROC_CALLIT) => {
            // Echoes the arguments back as results of the forwarded call.
            let forwarded = call.args::<call_args>();
            let port = table
                .iter()
                .find(|e| {
                    e.prog == forwarded.prog && e.vers == forwarded.vers && e.prot == IPPROTO_UDP
                })
                .map_or(0, |e| e.port);
            success(xid, &call_result { port, res: forwarded.args })
        }
        None => reply_bytes(&rpc_msg::accepted(xid, accept_body::PROC_UNAVAIL), &Void),
    }
}
