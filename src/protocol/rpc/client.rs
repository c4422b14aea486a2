//! Transport independent calling surface.
//!
//! [`RpcClient`] is what code built on top of RPC programs against.
//! [`Client`] picks the transport from a [`ClientConfig`] and, when no port
//! is configured, asks the portmapper of the target host for it first.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::portmap::PortmapClient;
use crate::protocol::xdr::{Deserialize, Serialize};

use super::auth::Authenticator;
use super::config::{ClientConfig, Protocol};
use super::error::Result;
use super::tcp::TcpClient;
use super::udp::UdpClient;

#[async_trait]
pub trait RpcClient: Send {
    /// Calls `procedure` of the given version of the program and decodes its
    /// results into `result`.
    async fn call_version<A, R>(
        &mut self,
        procedure: u32,
        version: u32,
        args: &A,
        result: &mut R,
    ) -> Result<()>
    where
        A: Serialize + Sync + ?Sized,
        R: Deserialize + Send;

    /// Calls `procedure` of the version the client was created for.
    async fn call<A, R>(&mut self, procedure: u32, args: &A, result: &mut R) -> Result<()>
    where
        A: Serialize + Sync + ?Sized,
        R: Deserialize + Send,
    {
        let version = self.version();
        self.call_version(procedure, version, args, result).await
    }

    fn set_auth(&mut self, auth: Box<dyn Authenticator>);

    /// Total time a call may take. Zero makes calls one-way.
    fn set_timeout(&mut self, timeout: Duration);

    fn program(&self) -> u32;

    fn version(&self) -> u32;

    /// Address of the server, when known.
    fn peer(&self) -> Option<SocketAddr>;
}

#[async_trait]
impl RpcClient for UdpClient {
    async fn call_version<A, R>(
        &mut self,
        procedure: u32,
        version: u32,
        args: &A,
        result: &mut R,
    ) -> Result<()>
    where
        A: Serialize + Sync + ?Sized,
        R: Deserialize + Send,
    {
        UdpClient::call_version(self, procedure, version, args, result).await
    }

    fn set_auth(&mut self, auth: Box<dyn Authenticator>) {
        UdpClient::set_auth(self, auth)
    }

    fn set_timeout(&mut self, timeout: Duration) {
        UdpClient::set_timeout(self, timeout)
    }

    fn program(&self) -> u32 {
        UdpClient::program(self)
    }

    fn version(&self) -> u32 {
        UdpClient::version(self)
    }

    fn peer(&self) -> Option<SocketAddr> {
        Some(UdpClient::peer(self))
    }
}

#[async_trait]
impl<S> RpcClient for TcpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn call_version<A, R>(
        &mut self,
        procedure: u32,
        version: u32,
        args: &A,
        result: &mut R,
    ) -> Result<()>
    where
        A: Serialize + Sync + ?Sized,
        R: Deserialize + Send,
    {
        TcpClient::call_version(self, procedure, version, args, result).await
    }

    fn set_auth(&mut self, auth: Box<dyn Authenticator>) {
        TcpClient::set_auth(self, auth)
    }

    fn set_timeout(&mut self, timeout: Duration) {
        TcpClient::set_timeout(self, timeout)
    }

    fn program(&self) -> u32 {
        TcpClient::program(self)
    }

    fn version(&self) -> u32 {
        TcpClient::version(self)
    }

    fn peer(&self) -> Option<SocketAddr> {
        TcpClient::peer(self)
    }
}

/// A client over whichever transport the configuration asked for.
#[derive(Debug)]
pub enum Client {
    Udp(UdpClient),
    Tcp(TcpClient<TcpStream>),
}

impl Client {
    /// Creates a client for `config`. A zero `config.port` is looked up with
    /// the portmapper on `config.host`, for the configured protocol and with
    /// the configured timeouts.
    pub async fn connect(config: &ClientConfig) -> Result<Client> {
        if config.port != 0 {
            return Client::connect_direct(config).await;
        }
        let mut portmap = PortmapClient::with_config(config).await?;
        let port = portmap
            .get_port(config.program, config.version, config.protocol.ipproto())
            .await?;
        debug!(
            "Portmapper on {} maps program {} version {} to {} port {}",
            config.host, config.program, config.version, config.protocol, port
        );
        Client::connect_direct(&config.clone().with_port(port)).await
    }

    /// Creates a client for `config` as is, without asking the portmapper.
    pub async fn connect_direct(config: &ClientConfig) -> Result<Client> {
        match config.protocol {
            Protocol::Udp => UdpClient::connect(config).await.map(Client::Udp),
            Protocol::Tcp => TcpClient::connect(config).await.map(Client::Tcp),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Client::Udp(_) => Protocol::Udp,
            Client::Tcp(_) => Protocol::Tcp,
        }
    }
}

#[async_trait]
impl RpcClient for Client {
    async fn call_version<A, R>(
        &mut self,
        procedure: u32,
        version: u32,
        args: &A,
        result: &mut R,
    ) -> Result<()>
    where
        A: Serialize + Sync + ?Sized,
        R: Deserialize + Send,
    {
        match self {
            Client::Udp(client) => client.call_version(procedure, version, args, result).await,
            Client::Tcp(client) => client.call_version(procedure, version, args, result).await,
        }
    }

    fn set_auth(&mut self, auth: Box<dyn Authenticator>) {
        match self {
            Client::Udp(client) => client.set_auth(auth),
            Client::Tcp(client) => client.set_auth(auth),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        match self {
            Client::Udp(client) => client.set_timeout(timeout),
            Client::Tcp(client) => client.set_timeout(timeout),
        }
    }

    fn program(&self) -> u32 {
        match self {
            Client::Udp(client) => client.program(),
            Client::Tcp(client) => client.program(),
        }
    }

    fn version(&self) -> u32 {
        match self {
            Client::Udp(client) => client.version(),
            Client::Tcp(client) => client.version(),
        }
    }

    fn peer(&self) -> Option<SocketAddr> {
        match self {
            Client::Udp(client) => Some(client.peer()),
            Client::Tcp(client) => client.peer(),
        }
    }
}
