use std::io::{ErrorKind, Write};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use otcom_transport::PeerStream;

use crate::codec::{encode_packet, Packet, PacketConfig};
use crate::error::{PacketError, Result};
use crate::reader::transport_to_packet_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(1);

/// Writes complete control packets to any `Write` stream.
///
/// Works on non-blocking streams: a full socket is retried until the
/// configured write timeout runs out.
#[derive(Debug)]
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
    config: PacketConfig,
}

impl<T: Write> PacketWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete packet.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.send(packet.command, packet.payload.as_ref())
    }

    /// Encode and send a payload under `command`.
    pub fn send(&mut self, command: u8, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_packet(command, payload, &mut self.buf)?;

        let deadline = self.config.write_timeout.map(|t| (Instant::now() + t, t));
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(PacketError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if let Some((deadline, timeout)) = deadline {
                        if Instant::now() >= deadline {
                            return Err(PacketError::WriteTimeout(timeout));
                        }
                    }
                    std::thread::sleep(WOULD_BLOCK_BACKOFF);
                }
                Err(err) => return Err(PacketError::Io(err)),
            }
        }

        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(PacketError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

impl PacketWriter<PeerStream> {
    /// Create a packet writer for a blocking peer stream and apply the write
    /// timeout from config at the socket level as well.
    pub fn with_config_peer(inner: PeerStream, config: PacketConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_packet_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::codec::decode_packet;
    use crate::command::{RAW_DATA, SEND_AS_IS};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct WouldBlockOnce {
        blocked: bool,
        out: Vec<u8>,
    }

    impl Write for WouldBlockOnce {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.blocked {
                self.blocked = true;
                return Err(io::Error::new(ErrorKind::WouldBlock, "full"));
            }
            // accept two bytes at a time
            let n = buf.len().min(2);
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct NeverWritable;

    impl Write for NeverWritable {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::WouldBlock, "full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ClosedWriter;

    impl Write for ClosedWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn send_encodes_packet() {
        let sink = SharedSink::default();
        let mut writer = PacketWriter::new(sink.clone());
        writer.send(SEND_AS_IS, b"abc").unwrap();

        let written = sink.0.lock().unwrap().clone();
        assert_eq!(written, vec![0xBB, 0x00, 0x03, 0xB5, b'a', b'b', b'c']);
    }

    #[test]
    fn partial_and_blocked_writes_complete() {
        let mut writer = PacketWriter::new(WouldBlockOnce {
            blocked: false,
            out: Vec::new(),
        });
        writer.write_packet(&Packet::new(RAW_DATA, b"hello".to_vec())).unwrap();

        let mut out = BytesMut::from(writer.get_ref().out.as_slice());
        let packet = decode_packet(&mut out).unwrap();
        assert_eq!(packet.payload.as_ref(), b"hello");
    }

    #[test]
    fn stuck_socket_times_out() {
        let config = PacketConfig {
            read_timeout: None,
            write_timeout: Some(Duration::from_millis(20)),
        };
        let mut writer = PacketWriter::with_config(NeverWritable, config);
        assert!(matches!(
            writer.send(RAW_DATA, b"x"),
            Err(PacketError::WriteTimeout(_))
        ));
    }

    #[test]
    fn zero_write_is_connection_closed() {
        let mut writer = PacketWriter::new(ClosedWriter);
        assert!(matches!(
            writer.send(RAW_DATA, b"x"),
            Err(PacketError::ConnectionClosed)
        ));
    }
}
