//! Client of the portmapper (RFC 1833, program 100000 version 2).
//!
//! The portmapper of a host knows on which port each locally registered
//! RPC program listens. Every failure of a call to it is reported as
//! [`RpcError::PortmapperFailure`], except a lookup for an unknown program,
//! which is [`RpcError::ProgramNotRegistered`].

use tracing::debug;

use crate::protocol::rpc::{
    AuthNone, Client, ClientConfig, Protocol, Result, RpcClient, RpcError, TcpClient, UdpClient,
};
use crate::protocol::xdr::portmap::{
    call_args, call_result, mapping, pmaplist, PortmapProcedure, PROGRAM, VERSION,
};
use crate::protocol::xdr::{Deserialize, Serialize, Void};

#[derive(Debug)]
pub struct PortmapClient {
    client: Client,
}

impl PortmapClient {
    /// Talks to the portmapper of `host` over `protocol`, with default timeouts.
    pub async fn connect(host: &str, protocol: Protocol) -> Result<Self> {
        let config = ClientConfig::new(host, PROGRAM, VERSION).with_protocol(protocol);
        Self::with_config(&config).await
    }

    /// Talks to the portmapper of `config.host` at `config.portmapper_port`.
    ///
    /// Protocol, timeouts and buffer size come from `config`. Program,
    /// version and credentials are those of the portmapper.
    pub async fn with_config(config: &ClientConfig) -> Result<Self> {
        let config = ClientConfig {
            program: PROGRAM,
            version: VERSION,
            port: config.portmapper_port,
            ..config.clone()
        }
        .with_auth(AuthNone);
        let client = match config.protocol {
            Protocol::Udp => UdpClient::connect(&config).await.map(Client::Udp),
            Protocol::Tcp => TcpClient::connect(&config).await.map(Client::Tcp),
        }
        .map_err(RpcError::portmapper)?;
        Ok(Self { client })
    }

    /// The underlying client, for tuning timeouts.
    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Port `program`/`version` listens on for the IP protocol `protocol`
    /// (IPPROTO_UDP or IPPROTO_TCP).
    pub async fn get_port(&mut self, program: u32, version: u32, protocol: u32) -> Result<u16> {
        let args = mapping { prog: program, vers: version, prot: protocol, port: 0 };
        let mut port = 0_u32;
        self.call(PortmapProcedure::PMAPPROC_GETPORT, &args, &mut port).await?;
        debug!("GETPORT {} {} {} -> {}", program, version, protocol, port);
        if port == 0 {
            return Err(RpcError::ProgramNotRegistered);
        }
        u16::try_from(port)
            .map_err(|_| RpcError::DecodeFailure(format!("port {port} out of range")).portmapper())
    }

    /// Registers a program. Returns whether the portmapper accepted it.
    pub async fn set_port(
        &mut self,
        program: u32,
        version: u32,
        protocol: u32,
        port: u16,
    ) -> Result<bool> {
        let args = mapping { prog: program, vers: version, prot: protocol, port: u32::from(port) };
        let mut done = false;
        self.call(PortmapProcedure::PMAPPROC_SET, &args, &mut done).await?;
        Ok(done)
    }

    /// Removes every registration of `program`/`version`, whatever the protocol.
    pub async fn unset_port(&mut self, program: u32, version: u32) -> Result<bool> {
        let args = mapping { prog: program, vers: version, prot: 0, port: 0 };
        let mut done = false;
        self.call(PortmapProcedure::PMAPPROC_UNSET, &args, &mut done).await?;
        Ok(done)
    }

    /// Every registration the portmapper knows.
    pub async fn list_servers(&mut self) -> Result<Vec<mapping>> {
        let mut list = pmaplist::default();
        self.call(PortmapProcedure::PMAPPROC_DUMP, &Void, &mut list).await?;
        Ok(list.0)
    }

    /// Checks that the portmapper answers at all.
    pub async fn ping(&mut self) -> Result<()> {
        self.call(PortmapProcedure::PMAPPROC_NULL, &Void, &mut Void).await
    }

    /// Has the portmapper call `procedure` of a registered UDP program on the
    /// caller's behalf. `args` are the encoded procedure arguments; the
    /// port of the program and its encoded results come back.
    pub async fn call_it(
        &mut self,
        program: u32,
        version: u32,
        procedure: u32,
        args: &[u8],
    ) -> Result<(u32, Vec<u8>)> {
        let args = call_args { prog: program, vers: version, proc: procedure, args: args.to_vec() };
        let mut result = call_result::default();
        self.call(PortmapProcedure::PMAPPROC_CALLIT, &args, &mut result).await?;
        Ok((result.port, result.res))
    }

    async fn call<A, R>(&mut self, procedure: PortmapProcedure, args: &A, result: &mut R) -> Result<()>
    where
        A: Serialize + Sync + ?Sized,
        R: Deserialize + Send,
    {
        self.client.call(procedure.into(), args, result).await.map_err(RpcError::portmapper)
    }
}
