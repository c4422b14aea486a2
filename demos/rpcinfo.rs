//! Minimal `rpcinfo`: lists the programs registered with a host's
//! portmapper, or checks that one program answers its NULL procedure.

use std::time::Duration;

use anyhow::{bail, Context};
use oncrpc_mamont::portmap::PortmapClient;
use oncrpc_mamont::rpc::{Client, ClientConfig, Protocol, RpcClient};
use oncrpc_mamont::xdr::portmap::{IPPROTO_TCP, IPPROTO_UDP};
use oncrpc_mamont::xdr::Void;

const USAGE: &str = "Usage: rpcinfo [--tcp] [--timeout SECONDS] <HOST> [PROGRAM VERSION]\n\
                     \n\
                     Without PROGRAM, lists the portmapper registrations of HOST.\n\
                     With PROGRAM and VERSION, calls procedure 0 of that program.\n\
                     \n\
                     Options:\n\
                       --tcp                 Talk TCP instead of UDP\n\
                       --timeout SECONDS     Total time per call (default: 5)\n\
                       -h, --help            Show this help and exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let mut protocol = Protocol::Udp;
    let mut timeout = Duration::from_secs(5);
    let mut positional = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tcp" => protocol = Protocol::Tcp,
            "--timeout" => {
                let seconds = args.next().context("--timeout needs a value")?;
                timeout = Duration::from_secs(seconds.parse().context("bad --timeout")?);
            }
            "--help" | "-h" => {
                eprintln!("{USAGE}");
                return Ok(());
            }
            _ if arg.starts_with('-') => {
                eprintln!("Unknown flag: {arg}");
                eprintln!("Run with --help for usage.");
                std::process::exit(2);
            }
            _ => positional.push(arg),
        }
    }

    match positional.as_slice() {
        [host] => dump(host, protocol, timeout).await,
        [host, program, version] => {
            let program = program.parse().context("bad PROGRAM")?;
            let version = version.parse().context("bad VERSION")?;
            ping(host, protocol, timeout, program, version).await
        }
        _ => bail!("{USAGE}"),
    }
}

async fn dump(host: &str, protocol: Protocol, timeout: Duration) -> anyhow::Result<()> {
    let config = ClientConfig::new(host, 0, 0)
        .with_protocol(protocol)
        .with_timeout(timeout)
        .with_retransmission_timeout(Duration::from_secs(1));
    let mut portmap = PortmapClient::with_config(&config).await?;
    portmap.ping().await.context("portmapper does not answer")?;

    println!("{:>10} {:>5} {:>6} {:>6}", "program", "vers", "proto", "port");
    for entry in portmap.list_servers().await? {
        let proto = match entry.prot {
            IPPROTO_TCP => "tcp".to_string(),
            IPPROTO_UDP => "udp".to_string(),
            other => other.to_string(),
        };
        println!("{:>10} {:>5} {:>6} {:>6}", entry.prog, entry.vers, proto, entry.port);
    }
    Ok(())
}

async fn ping(
    host: &str,
    protocol: Protocol,
    timeout: Duration,
    program: u32,
    version: u32,
) -> anyhow::Result<()> {
    let config = ClientConfig::new(host, program, version)
        .with_protocol(protocol)
        .with_timeout(timeout)
        .with_retransmission_timeout(Duration::from_secs(1));
    let mut client = Client::connect(&config).await?;
    client.call(0, &Void, &mut Void).await?;
    println!("program {program} version {version} ready and waiting");
    Ok(())
}
