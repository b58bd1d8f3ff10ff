//! Integration tests running the request cycle over the loopback interface.
//!
//! A miniature RADIUS responder answers on 127.0.0.1 the way the FreeRADIUS SNMP virtual
//! server would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use radsnmp::controller::{Controller, FatalError, Settings};
use radsnmp::crypto::Secret;
use radsnmp::dictionary::Dictionary;
use radsnmp::pairs::{Pair, PairList};
use radsnmp::radius::{Code, Packet, MAX_PACKET_SIZE};
use radsnmp::schema::SnmpAttributes;
use radsnmp::shutdown::Shutdown;
use radsnmp::transport::UdpTransport;
use radsnmp::value::Value;

fn setup() -> (Arc<Dictionary>, SnmpAttributes) {
    let dict = Dictionary::builtin().unwrap();
    let attrs = SnmpAttributes::resolve(&dict).unwrap();
    (Arc::new(dict), attrs)
}

/// Answers `count` requests, echoing each requested leaf back with a value.
async fn run_test_server(
    socket: UdpSocket,
    count: usize,
    secret: Secret,
) -> Result<Vec<Packet>, &'static str> {
    let (dict, attrs) = setup();
    let ident = dict.attr_by_name("FreeRADIUS-Auth-Serv-Ident").ok_or("no ident")?;
    let string_type = dict
        .attr(attrs.snmp_type)
        .value_by_name("string")
        .ok_or("no string type")?;

    let mut requests = Vec::new();
    let mut buf = [0u8; MAX_PACKET_SIZE];
    for _ in 0..count {
        let (len, src) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .map_err(|_| "Server timeout waiting for packet")?
            .map_err(|_| "Server receive error")?;

        let request = Packet::decode_request(&dict, &buf[..len], &Secret::default())
            .map_err(|_| "Failed to decode request")?;

        let mut pairs = PairList::new();
        if request.pairs.find(ident).is_some() {
            pairs.push(Pair::new(attrs.snmp_type, Value::Integer(string_type as u32)));
            pairs.push(Pair::new(ident, Value::String(b"FreeRADIUS loopback".to_vec())));
        }
        pairs.push(Pair::new(attrs.message_authenticator, Value::Octets(vec![0; 16])));

        let reply = Packet::new(Code::ACCESS_ACCEPT, request.id, pairs);
        let data = reply
            .encode_reply(&dict, &request.authenticator, &secret)
            .map_err(|_| "Failed to encode reply")?;
        socket
            .send_to(&data, src)
            .await
            .map_err(|_| "Failed to send reply")?;
        requests.push(request);
    }
    Ok(requests)
}

type ServerHandle = tokio::task::JoinHandle<Result<Vec<Packet>, &'static str>>;

async fn start_server(count: usize, secret: Secret) -> (SocketAddr, ServerHandle) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let handle = tokio::spawn(run_test_server(socket, count, secret));
    (addr, handle)
}

async fn run_controller(server: SocketAddr, input: &str) -> (Result<(), FatalError>, String) {
    let (dict, attrs) = setup();
    let transport = UdpTransport::connect(server).await.unwrap();
    let settings = Settings {
        code: Code::STATUS_SERVER,
        server,
        secret: Secret::default(),
        retries: 2,
        timeout: Duration::from_millis(500),
        first_id: 200,
    };
    let mut controller = Controller::new(
        dict,
        attrs,
        settings,
        input.as_bytes(),
        Vec::new(),
        transport,
        Arc::new(Shutdown::new()),
    );
    let result = timeout(Duration::from_secs(5), controller.run()).await.unwrap();
    let (_, output, _) = controller.into_parts();
    (result, String::from_utf8(output).unwrap())
}

#[tokio::test]
async fn test_get_over_loopback() {
    let (addr, server) = start_server(2, Secret::default()).await;

    let (result, output) = run_controller(
        addr,
        "get\n.1.3.6.1.2.1.67.1.1.1.1.1.0\nset\n.1.3.6.1.2.1.67.1.1.1.1.4.0\n2\n",
    )
    .await;
    assert!(result.is_ok());
    assert_eq!(
        output,
        ".1.3.6.1.2.1.67.1.1.1.1.1\nstring\nFreeRADIUS loopback\nDONE\n"
    );

    let requests = server.await.unwrap().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].code, Code::STATUS_SERVER);
    assert_eq!(requests[0].id, 200);
    assert_eq!(requests[1].id, 201);
}

#[tokio::test]
async fn test_reply_with_wrong_secret() {
    let (addr, server) = start_server(1, Secret::new("not-the-secret")).await;

    let (result, output) = run_controller(addr, "get\n.1.3.6.1.2.1.67.1.1.1.1.1\nPING\n").await;
    assert!(result.is_ok());
    assert_eq!(output, "NONE\nPONG\n");
    assert!(server.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_silent_server() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let (result, output) = run_controller(addr, "get\n.1.3.6.1.2.1.67.1.1.1.1.1\n").await;
    assert!(matches!(result, Err(FatalError::NoResponse { attempts: 2 })));
    assert_eq!(output, "");

    // Both attempts carry the same packet.
    let mut first = [0u8; MAX_PACKET_SIZE];
    let mut second = [0u8; MAX_PACKET_SIZE];
    let (len, _) = socket.recv_from(&mut first).await.unwrap();
    let (len2, _) = socket.recv_from(&mut second).await.unwrap();
    assert_eq!(first[..len], second[..len2]);
}
