use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use otcom_transport::PeerStream;

use crate::codec::{decode_packet, Packet, PacketConfig};
use crate::error::{PacketError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete control packets from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete packets.
#[derive(Debug)]
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    config: PacketConfig,
}

impl<T: Read> PacketReader<T> {
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

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(PacketError::ConnectionClosed)` when EOF is reached.
    /// With a read timeout configured on the stream, an expired wait surfaces
    /// as `PacketError::Io` of kind `WouldBlock` or `TimedOut`.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = decode_packet(&mut self.buf) {
                return Ok(packet);
            }
            self.fill()?;
        }
    }

    /// Like [`Self::read_packet`], but returns `Ok(None)` instead of an error
    /// when the stream has no data right now.
    pub fn try_read_packet(&mut self) -> Result<Option<Packet>> {
        match self.read_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(PacketError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let read = loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(PacketError::Io(err)),
            }
        };

        if read == 0 {
            return Err(PacketError::ConnectionClosed);
        }

        self.buf.extend_from_slice(&chunk[..read]);
        Ok(())
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

impl PacketReader<PeerStream> {
    /// Create a packet reader for a peer stream and apply the read timeout
    /// from config.
    pub fn with_config_peer(inner: PeerStream, config: PacketConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_packet_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_packet_error(err: otcom_transport::TransportError) -> PacketError {
    match err {
        otcom_transport::TransportError::Io(io)
        | otcom_transport::TransportError::Accept(io) => PacketError::Io(io),
        otcom_transport::TransportError::Bind { source, .. }
        | otcom_transport::TransportError::Connect { source, .. } => PacketError::Io(source),
        other => PacketError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;
    use crate::codec::encode_packet;
    use crate::command::{RAW_DATA, STATUS_REPLY};

    fn wire(packets: &[(u8, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (command, payload) in packets {
            encode_packet(*command, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    struct ByteByByteReader {
        data: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::new(ErrorKind::Interrupted, "signal"));
            }
            self.inner.read(buf)
        }
    }

    struct AlwaysWouldBlock;

    impl Read for AlwaysWouldBlock {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::WouldBlock, "no data"))
        }
    }

    #[test]
    fn read_multiple_packets() {
        let data = wire(&[
            (RAW_DATA, &b"one"[..]),
            (STATUS_REPLY, &[1][..]),
            (RAW_DATA, &b"three"[..]),
        ]);
        let mut reader = PacketReader::new(Cursor::new(data));

        assert_eq!(reader.read_packet().unwrap().payload.as_ref(), b"one");
        assert_eq!(reader.read_packet().unwrap().command, STATUS_REPLY);
        assert_eq!(reader.read_packet().unwrap().payload.as_ref(), b"three");
        assert!(matches!(
            reader.read_packet(),
            Err(PacketError::ConnectionClosed)
        ));
    }

    #[test]
    fn read_byte_by_byte() {
        let data = wire(&[(RAW_DATA, &b"split"[..])]);
        let mut reader = PacketReader::new(ByteByByteReader { data, pos: 0 });
        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.payload.as_ref(), b"split");
    }

    #[test]
    fn retries_interrupted_reads() {
        let mut reader = PacketReader::new(InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[(STATUS_REPLY, &[0][..])])),
        });
        assert_eq!(reader.read_packet().unwrap().payload.as_ref(), &[0]);
    }

    #[test]
    fn try_read_maps_would_block_to_none() {
        let mut reader = PacketReader::new(AlwaysWouldBlock);
        assert!(reader.try_read_packet().unwrap().is_none());
    }

    #[test]
    fn eof_mid_packet_is_connection_closed() {
        let mut data = wire(&[(RAW_DATA, &b"abcdef"[..])]);
        data.truncate(6);
        let mut reader = PacketReader::new(Cursor::new(data));
        assert!(matches!(
            reader.read_packet(),
            Err(PacketError::ConnectionClosed)
        ));
    }
}
