use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::PeerStream;

/// Base TCP port; a bridge for the n-th serial port conventionally listens
/// on `DEFAULT_TCP_PORT + n`.
pub const DEFAULT_TCP_PORT: u16 = 7700;

/// Non-blocking TCP listener for control peers.
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Bind to `host:port`. Port 0 picks an ephemeral port.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "listening for peers");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept one pending connection, if any.
    ///
    /// Returns `Ok(None)` when nobody is waiting. Accepted streams are
    /// non-blocking with Nagle disabled.
    pub fn accept(&self) -> Result<Option<PeerStream>> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(true).map_err(TransportError::Accept)?;
                let _ = stream.set_nodelay(true);
                debug!(peer = %addr, "accepted connection");
                Ok(Some(PeerStream::from_tcp(stream)))
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Connect to a running bridge (blocking).
pub fn connect(addr: impl ToSocketAddrs + std::fmt::Display, timeout: Duration) -> Result<PeerStream> {
    let label = addr.to_string();
    let resolved = addr
        .to_socket_addrs()
        .map_err(|source| TransportError::Connect {
            addr: label.clone(),
            source,
        })?;

    let mut last_err = None;
    for candidate in resolved {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                debug!(addr = %candidate, "connected to bridge");
                return Ok(PeerStream::from_tcp(stream));
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(TransportError::Connect {
        addr: label,
        source: last_err
            .unwrap_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "no address resolved")),
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn accept_within(server: &TcpServer, timeout: Duration) -> PeerStream {
        let start = Instant::now();
        loop {
            if let Some(stream) = server.accept().expect("accept should not fail") {
                return stream;
            }
            assert!(start.elapsed() < timeout, "no connection accepted");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn accept_without_pending_returns_none() {
        let server = TcpServer::bind("127.0.0.1", 0).expect("bind should succeed");
        assert!(server.accept().unwrap().is_none());
    }

    #[test]
    fn connect_and_exchange_bytes() {
        let server = TcpServer::bind("127.0.0.1", 0).expect("bind should succeed");
        let addr = server.local_addr();

        let client = thread::spawn(move || {
            let mut stream = connect(addr, Duration::from_secs(2)).expect("connect should succeed");
            stream.write_all(b"ping").unwrap();
            let mut reply = [0u8; 4];
            stream.read_exact(&mut reply).unwrap();
            reply
        });

        let mut accepted = accept_within(&server, Duration::from_secs(2));
        accepted.set_nonblocking(false).unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        accepted.write_all(b"pong").unwrap();

        assert_eq!(&client.join().unwrap(), b"pong");
    }

    #[test]
    fn bind_conflict_reports_address() {
        let first = TcpServer::bind("127.0.0.1", 0).expect("bind should succeed");
        let port = first.local_addr().port();
        let err = TcpServer::bind("127.0.0.1", port)
            .err()
            .expect("second bind should fail");
        assert!(matches!(err, TransportError::Bind { ref addr, .. } if addr.ends_with(&port.to_string())));
    }

    #[test]
    fn connect_refused_is_connect_error() {
        let port = {
            let server = TcpServer::bind("127.0.0.1", 0).unwrap();
            server.local_addr().port()
        };
        let err = connect(format!("127.0.0.1:{port}"), Duration::from_millis(500))
            .expect_err("nobody is listening");
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
