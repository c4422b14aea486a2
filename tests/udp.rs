use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout, Instant};

use oncrpc_mamont::rpc::{
    AuthNone, AuthUnix, CallMessage, RetransmissionMode, RpcError, UdpClient,
};
use oncrpc_mamont::xdr::rpc::{
    accept_body, accepted_reply, auth_flavor, auth_stat, mismatch_info, opaque_auth,
    rejected_reply, reply_body, rpc_body, rpc_msg,
};
use oncrpc_mamont::xdr::Void;

mod support;

use support::{bind_udp, init_logging, loopback_config, reply_bytes, success, ReceivedCall};

const PROGRAM: u32 = 200_001;
const VERSION: u32 = 1;

async fn receive_call(socket: &UdpSocket) -> (ReceivedCall, SocketAddr) {
    let mut buf = vec![0_u8; 8192];
    let (len, from) = socket.recv_from(&mut buf).await.expect("receive call");
    (ReceivedCall::parse(&buf[..len]), from)
}

/// Answers every call with its u32 argument plus one.
async fn increment_server(socket: UdpSocket) {
    loop {
        let (call, from) = receive_call(&socket).await;
        let value = call.args::<u32>();
        socket.send_to(&success(call.xid, &(value + 1)), from).await.expect("send reply");
    }
}

#[tokio::test]
async fn call_returns_decoded_result() {
    init_logging();
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let server = tokio::spawn(increment_server(socket));

    let mut client = UdpClient::connect(&loopback_config(addr.port(), PROGRAM, VERSION))
        .await
        .expect("connect");
    assert_eq!(client.peer(), addr);

    let mut result = 0_u32;
    client.call(1, &41_u32, &mut result).await.expect("call");
    assert_eq!(result, 42);
    client.call(1, &99_u32, &mut result).await.expect("second call");
    assert_eq!(result, 100);
    server.abort();
}

#[tokio::test]
async fn call_header_names_program_version_and_procedure() {
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let server = tokio::spawn(async move {
        let (call, from) = receive_call(&socket).await;
        socket.send_to(&success(call.xid, &Void), from).await.expect("send reply");
        call
    });

    let mut client = UdpClient::connect(&loopback_config(addr.port(), PROGRAM, VERSION))
        .await
        .expect("connect");
    client.call_version(5, 3, &Void, &mut Void).await.expect("call");

    let call = server.await.expect("server task");
    assert_eq!(call.call.prog, PROGRAM);
    assert_eq!(call.call.vers, 3);
    assert_eq!(call.call.proc, 5);
    assert_eq!(call.call.cred.flavor, auth_flavor::AUTH_NONE);
}

#[tokio::test]
async fn replies_with_other_xid_are_ignored() {
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let server = tokio::spawn(async move {
        let (call, from) = receive_call(&socket).await;
        let stale = call.xid.wrapping_sub(1);
        socket.send_to(&success(stale, &13_u32), from).await.expect("send stale");
        socket.send_to(&success(call.xid, &7_u32), from).await.expect("send reply");
    });

    let mut client = UdpClient::connect(&loopback_config(addr.port(), PROGRAM, VERSION))
        .await
        .expect("connect");
    let mut result = 0_u32;
    client.call(1, &Void, &mut result).await.expect("call");
    assert_eq!(result, 7);
    server.await.expect("server task");
}

#[tokio::test]
async fn datagrams_from_other_hosts_are_ignored() {
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let (impostor, _) = bind_udp("127.0.0.2").await;
    let server = tokio::spawn(async move {
        let (call, from) = receive_call(&socket).await;
        impostor.send_to(&success(call.xid, &666_u32), from).await.expect("send forged");
        sleep(Duration::from_millis(50)).await;
        socket.send_to(&success(call.xid, &7_u32), from).await.expect("send reply");
    });

    let mut client = UdpClient::connect(&loopback_config(addr.port(), PROGRAM, VERSION))
        .await
        .expect("connect");
    let mut result = 0_u32;
    client.call(1, &Void, &mut result).await.expect("call");
    assert_eq!(result, 7);
    server.await.expect("server task");
}

#[tokio::test]
async fn calls_from_the_server_are_ignored() {
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let server = tokio::spawn(async move {
        let (call, from) = receive_call(&socket).await;
        // A call message reusing the xid.
        let mut bogus = Vec::new();
        CallMessage::new(call.xid, 1, 1, 1)
            .encode(&mut bogus, &AuthNone)
            .expect("encode");
        socket.send_to(&bogus, from).await.expect("send call");
        socket.send_to(&success(call.xid, &5_u32), from).await.expect("send reply");
    });

    let mut client = UdpClient::connect(&loopback_config(addr.port(), PROGRAM, VERSION))
        .await
        .expect("connect");
    let mut result = 0_u32;
    client.call(1, &Void, &mut result).await.expect("call");
    assert_eq!(result, 5);
    server.await.expect("server task");
}

/// Collects the xids of every datagram received and never answers.
fn silent_server(socket: UdpSocket) -> Arc<Mutex<Vec<u32>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    tokio::spawn(async move {
        loop {
            let (call, _) = receive_call(&socket).await;
            recorded.lock().expect("lock").push(call.xid);
        }
    });
    seen
}

#[tokio::test]
async fn retransmits_with_fixed_interval_until_timeout() {
    init_logging();
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let seen = silent_server(socket);

    let config = loopback_config(addr.port(), PROGRAM, VERSION)
        .with_timeout(Duration::from_millis(350))
        .with_retransmission_timeout(Duration::from_millis(100));
    let mut client = UdpClient::connect(&config).await.expect("connect");

    let started = Instant::now();
    let err = client.call(1, &Void, &mut Void).await.expect_err("no reply");
    assert!(matches!(err, RpcError::Timeout), "unexpected error: {err:?}");
    assert!(started.elapsed() >= Duration::from_millis(350));

    sleep(Duration::from_millis(50)).await;
    let xids = seen.lock().expect("lock").clone();
    assert!((3..=4).contains(&xids.len()), "sent {} times", xids.len());
    assert!(xids.iter().all(|&xid| xid == xids[0]), "xid changed: {xids:?}");
}

#[tokio::test]
async fn retransmits_with_exponential_backoff() {
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let seen = silent_server(socket);

    let config = loopback_config(addr.port(), PROGRAM, VERSION)
        .with_timeout(Duration::from_millis(700))
        .with_retransmission_timeout(Duration::from_millis(100))
        .with_retransmission_mode(RetransmissionMode::Exponential);
    let mut client = UdpClient::connect(&config).await.expect("connect");

    let err = client.call(1, &Void, &mut Void).await.expect_err("no reply");
    assert!(matches!(err, RpcError::Timeout));

    sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().expect("lock").len(), 3);
}

#[tokio::test]
async fn consecutive_calls_use_fresh_xids() {
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let seen = silent_server(socket);

    let config = loopback_config(addr.port(), PROGRAM, VERSION)
        .with_timeout(Duration::from_millis(50))
        .with_retransmission_timeout(Duration::from_millis(100));
    let mut client = UdpClient::connect(&config).await.expect("connect");
    for _ in 0..2 {
        let err = client.call(1, &Void, &mut Void).await.expect_err("no reply");
        assert!(matches!(err, RpcError::Timeout));
    }

    sleep(Duration::from_millis(50)).await;
    let xids = seen.lock().expect("lock").clone();
    assert_eq!(xids.len(), 2);
    assert_ne!(xids[0], xids[1]);
}

#[tokio::test]
async fn zero_timeout_makes_call_one_way() {
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let seen = silent_server(socket);

    let mut client = UdpClient::connect(&loopback_config(addr.port(), PROGRAM, VERSION))
        .await
        .expect("connect");
    client.set_timeout(Duration::ZERO);

    let mut result = 11_u32;
    timeout(Duration::from_millis(500), client.call(1, &3_u32, &mut result))
        .await
        .expect("one-way call must not wait")
        .expect("call");
    assert_eq!(result, 11);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn rejected_program_version_is_reported() {
    let (socket, addr) = bind_udp("127.0.0.1").await;
    tokio::spawn(async move {
        let (call, from) = receive_call(&socket).await;
        let body = accept_body::PROG_MISMATCH(mismatch_info { low: 2, high: 3 });
        let reply = reply_bytes(&rpc_msg::accepted(call.xid, body), &Void);
        socket.send_to(&reply, from).await.expect("send reply");
    });

    let mut client = UdpClient::connect(&loopback_config(addr.port(), PROGRAM, VERSION))
        .await
        .expect("connect");
    let err = client.call(1, &Void, &mut Void).await.expect_err("mismatch");
    assert!(matches!(err, RpcError::ProgramVersionMismatch { low: 2, high: 3 }));
}

#[tokio::test]
async fn rejected_shorthand_is_refreshed_once() {
    init_logging();
    let (socket, addr) = bind_udp("127.0.0.1").await;
    let server = tokio::spawn(async move {
        let mut flavors = Vec::new();
        let mut xids = Vec::new();

        // Hand out a shorthand token on the first call.
        let (call, from) = receive_call(&socket).await;
        flavors.push(call.call.cred.flavor);
        let reply = rpc_msg {
            xid: call.xid,
            body: rpc_body::REPLY(reply_body::MSG_ACCEPTED(accepted_reply {
                verf: opaque_auth { flavor: auth_flavor::AUTH_SHORT, body: vec![1, 2, 3, 4] },
                reply_data: accept_body::SUCCESS,
            })),
        };
        socket.send_to(&reply_bytes(&reply, &Void), from).await.expect("send reply");

        // Then reject every credential.
        for _ in 0..2 {
            let (call, from) = receive_call(&socket).await;
            flavors.push(call.call.cred.flavor);
            xids.push(call.xid);
            let reason = rejected_reply::AUTH_ERROR(auth_stat::AUTH_REJECTEDCRED);
            let reply = reply_bytes(&rpc_msg::denied(call.xid, reason), &Void);
            socket.send_to(&reply, from).await.expect("send denial");
        }

        // Anything after the single refresh would show up here.
        let extra = timeout(Duration::from_millis(300), receive_call(&socket)).await.is_ok();
        (flavors, xids, extra)
    });

    let config = loopback_config(addr.port(), PROGRAM, VERSION)
        .with_auth(AuthUnix::new("client", 1000, 1000, &[]));
    let mut client = UdpClient::connect(&config).await.expect("connect");
    client.call(1, &Void, &mut Void).await.expect("first call");

    let err = client.call(1, &Void, &mut Void).await.expect_err("rejected twice");
    assert!(
        matches!(err, RpcError::AuthenticationFailed(auth_stat::AUTH_REJECTEDCRED)),
        "unexpected error: {err:?}"
    );

    let (flavors, xids, extra) = server.await.expect("server task");
    assert_eq!(
        flavors,
        vec![auth_flavor::AUTH_UNIX, auth_flavor::AUTH_SHORT, auth_flavor::AUTH_UNIX]
    );
    assert_ne!(xids[0], xids[1]);
    assert!(!extra, "client retried more than once");
}

#[tokio::test]
async fn broadcast_reports_each_responder_once() {
    init_logging();
    let (rendezvous, addr) = bind_udp("127.0.0.1").await;
    let server = tokio::spawn(async move {
        let (call, client) = receive_call(&rendezvous).await;
        let mut responders = Vec::new();
        for value in 1..=3_u32 {
            let (socket, responder) = bind_udp("127.0.0.1").await;
            socket.send_to(&success(call.xid, &value), client).await.expect("send reply");
            responders.push((socket, responder));
        }
        // A duplicate, a rejection, garbage and a reply to another call.
        let (first, _) = &responders[0];
        first.send_to(&success(call.xid, &1_u32), client).await.expect("send duplicate");
        let (noisy, _) = bind_udp("127.0.0.1").await;
        let denied = rpc_msg::accepted(call.xid, accept_body::PROG_UNAVAIL);
        noisy.send_to(&reply_bytes(&denied, &Void), client).await.expect("send rejection");
        noisy.send_to(&[1, 2, 3], client).await.expect("send garbage");
        let mut truncated = success(call.xid, &Void);
        truncated.truncate(10);
        noisy.send_to(&truncated, client).await.expect("send truncated");
        noisy
            .send_to(&success(call.xid.wrapping_add(9), &4_u32), client)
            .await
            .expect("send unrelated");
        let addrs: Vec<SocketAddr> = responders.iter().map(|(_, addr)| *addr).collect();
        // Keep the sockets open until the client is done.
        sleep(Duration::from_millis(600)).await;
        addrs
    });

    let config = loopback_config(addr.port(), PROGRAM, VERSION)
        .with_timeout(Duration::from_millis(400));
    let mut client = UdpClient::connect(&config).await.expect("connect");
    let mut replies: Vec<(SocketAddr, u32)> = Vec::new();
    client
        .broadcast_call(1, &Void, |from, value: u32| replies.push((from, value)))
        .await
        .expect("broadcast");

    let responders = server.await.expect("server task");
    replies.sort_by_key(|(_, value)| *value);
    let expected: Vec<(SocketAddr, u32)> = responders.into_iter().zip(1..=3).collect();
    assert_eq!(replies, expected);
}
