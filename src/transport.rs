//! Connected transports to the RADIUS server.

use std::{
    fmt, io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use clap::ValueEnum;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
    time::{timeout, timeout_at, Instant},
};

use crate::radius::{HEADER_SIZE, MAX_PACKET_SIZE};

/// Transport protocol used to reach the server.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    #[default]
    #[value(name = "udp")]
    Udp,
    #[value(name = "tcp")]
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "udp"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// A connection to a fixed destination carrying whole RADIUS packets.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Sends one packet.
    async fn send(&mut self, packet: &[u8]) -> io::Result<()>;

    /// Waits up to `timeout` for data. Returns `false` if the wait timed out.
    async fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Receives one packet, giving up with [`io::ErrorKind::TimedOut`] after `timeout`.
    /// Called after [`Transport::wait_readable`] returned `true`, which does not guarantee a
    /// whole packet is there.
    async fn recv(&mut self, timeout: Duration) -> io::Result<Vec<u8>>;
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "Timed out receiving packet")
}

/// Connected UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Binds an ephemeral local port of the server's address family and connects it.
    pub async fn connect(server: SocketAddr) -> io::Result<Self> {
        let local = match server.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(server).await?;
        Ok(UdpTransport {
            socket,
            buf: vec![0u8; MAX_PACKET_SIZE],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    async fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        self.socket.send(packet).await.map(|_| ())
    }

    async fn wait_readable(&mut self, wait: Duration) -> io::Result<bool> {
        match timeout(wait, self.socket.readable()).await {
            Ok(ready) => ready.map(|_| true),
            Err(_) => Ok(false),
        }
    }

    async fn recv(&mut self, wait: Duration) -> io::Result<Vec<u8>> {
        let len = timeout(wait, self.socket.recv(&mut self.buf))
            .await
            .map_err(|_| timed_out())??;
        Ok(self.buf[..len].to_vec())
    }
}

/// TCP stream; packets are delimited by the length field of their header.
pub struct TcpTransport {
    stream: TcpStream,
    /// Bytes read but not yet returned as a packet.
    buf: Vec<u8>,
}

impl TcpTransport {
    pub async fn connect(server: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(server).await?;
        stream.set_nodelay(true)?;
        Ok(TcpTransport {
            stream,
            buf: Vec::with_capacity(MAX_PACKET_SIZE),
        })
    }

    /// Length announced by the buffered header, if a whole header is buffered.
    fn frame_len(&self) -> Option<usize> {
        self.buf
            .get(2..4)
            .map(|len| u16::from_be_bytes([len[0], len[1]]) as usize)
    }

    fn frame_ready(&self) -> bool {
        self.frame_len().is_some_and(|len| self.buf.len() >= len)
    }

    /// Splits the first packet off the buffer once all of it has arrived.
    fn take_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let Some(len) = self.frame_len() else {
            return Ok(None);
        };
        if !(HEADER_SIZE..=MAX_PACKET_SIZE).contains(&len) {
            // The stream can't be resynchronised past a bad length.
            self.buf.clear();
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid packet length {} on stream", len),
            ));
        }
        if self.buf.len() < len {
            return Ok(None);
        }
        Ok(Some(self.buf.drain(..len).collect()))
    }
}

impl Transport for TcpTransport {
    async fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        self.stream.write_all(packet).await
    }

    async fn wait_readable(&mut self, wait: Duration) -> io::Result<bool> {
        if self.frame_ready() {
            return Ok(true);
        }
        match timeout(wait, self.stream.readable()).await {
            Ok(ready) => ready.map(|_| true),
            Err(_) => Ok(false),
        }
    }

    async fn recv(&mut self, wait: Duration) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + wait;
        let mut chunk = [0u8; MAX_PACKET_SIZE];
        loop {
            if let Some(packet) = self.take_frame()? {
                return Ok(packet);
            }
            // `read` is cancel safe, so a partial packet stays buffered on timeout.
            let read = timeout_at(deadline, self.stream.read(&mut chunk))
                .await
                .map_err(|_| timed_out())??;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Connection closed by server",
                ));
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }
}

/// Either transport, chosen at runtime.
pub enum Connection {
    Udp(UdpTransport),
    Tcp(TcpTransport),
}

impl Connection {
    pub async fn connect(protocol: Protocol, server: SocketAddr) -> io::Result<Self> {
        match protocol {
            Protocol::Udp => UdpTransport::connect(server).await.map(Connection::Udp),
            Protocol::Tcp => TcpTransport::connect(server).await.map(Connection::Tcp),
        }
    }
}

impl Transport for Connection {
    async fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        match self {
            Connection::Udp(t) => t.send(packet).await,
            Connection::Tcp(t) => t.send(packet).await,
        }
    }

    async fn wait_readable(&mut self, wait: Duration) -> io::Result<bool> {
        match self {
            Connection::Udp(t) => t.wait_readable(wait).await,
            Connection::Tcp(t) => t.wait_readable(wait).await,
        }
    }

    async fn recv(&mut self, wait: Duration) -> io::Result<Vec<u8>> {
        match self {
            Connection::Udp(t) => t.recv(wait).await,
            Connection::Tcp(t) => t.recv(wait).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_udp_wait_times_out() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transport = UdpTransport::connect(server.local_addr().unwrap()).await.unwrap();
        assert!(!transport.wait_readable(Duration::from_millis(50)).await.unwrap());
    }

    #[tokio::test]
    async fn test_udp_exchange() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transport = UdpTransport::connect(server.local_addr().unwrap()).await.unwrap();

        transport.send(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        let (len, peer) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(peer, transport.local_addr().unwrap());

        server.send_to(b"pong", peer).await.unwrap();
        assert!(transport.wait_readable(Duration::from_secs(5)).await.unwrap());
        assert_eq!(transport.recv(Duration::from_secs(5)).await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_udp_recv_times_out() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transport = UdpTransport::connect(server.local_addr().unwrap()).await.unwrap();
        let err = transport.recv(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_tcp_framing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut packet = vec![2u8, 7, 0, 22];
            packet.extend_from_slice(&[0xaa; 18]);
            // Two packets in a single write.
            let mut both = packet.clone();
            both.extend_from_slice(&packet);
            stream.write_all(&both).await.unwrap();
            packet
        });

        let mut transport = Connection::connect(Protocol::Tcp, addr).await.unwrap();
        let expected = server.await.unwrap();
        assert!(transport.wait_readable(Duration::from_secs(5)).await.unwrap());
        assert_eq!(transport.recv(Duration::from_secs(5)).await.unwrap(), expected);
        assert!(transport.wait_readable(Duration::from_secs(5)).await.unwrap());
        assert_eq!(transport.recv(Duration::from_secs(5)).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_tcp_partial_packet() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut packet = vec![2u8, 9, 0, 20];
            packet.extend_from_slice(&[0x55; 16]);
            stream.write_all(&packet[..12]).await.unwrap();
            rx.await.unwrap();
            stream.write_all(&packet[12..]).await.unwrap();
            // Keep the connection open until the client is done.
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
            packet
        });

        let mut transport = TcpTransport::connect(addr).await.unwrap();
        assert!(transport.wait_readable(Duration::from_secs(5)).await.unwrap());
        let err = transport.recv(Duration::from_millis(100)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // The first half stays buffered and completes with the rest.
        tx.send(()).unwrap();
        let packet = transport.recv(Duration::from_secs(5)).await.unwrap();
        drop(transport);
        assert_eq!(packet, server.await.unwrap());
    }

    #[tokio::test]
    async fn test_tcp_bad_length() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&[2, 1, 0x20, 0x00]).await.unwrap();
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
        });

        let mut transport = TcpTransport::connect(addr).await.unwrap();
        let err = transport.recv(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(Protocol::from_str("udp", false), Ok(Protocol::Udp));
        assert_eq!(Protocol::from_str("tcp", false), Ok(Protocol::Tcp));
        assert!(Protocol::from_str("sctp", false).is_err());
        assert_eq!(Protocol::default().to_string(), "udp");
    }
}
