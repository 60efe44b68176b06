use std::io::ErrorKind;
use std::time::{Duration, Instant};

use otcom_frame::{
    Packet, PacketConfig, PacketError, PacketReader, PacketWriter, BAUDRATE_CHANGE,
    FLOWMODE_CHANGE, KILL, RECONNECT, SEND_AS_IS, STATUS, STATUS_REPLY,
};
use otcom_transport::{FlowMode, PeerStream};
use tracing::debug;

use crate::error::{PeerError, Result};

/// Default wait for connects and replies.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// A control-socket connection to a running bridge.
///
/// This is what command-line tools use: send requests, wait for the status
/// reply, or stream the raw and decoded data the bridge broadcasts.
#[derive(Debug)]
pub struct BridgeClient {
    reader: PacketReader<PeerStream>,
    writer: PacketWriter<PeerStream>,
    timeout: Duration,
}

impl BridgeClient {
    /// Connect with [`DEFAULT_TIMEOUT`].
    pub fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_TIMEOUT)
    }

    pub fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let stream = otcom_transport::connect(addr, timeout)?;
        let reader_stream = stream.try_clone()?;
        let config = PacketConfig {
            read_timeout: Some(timeout),
            write_timeout: Some(timeout),
        };
        let reader = PacketReader::with_config_peer(reader_stream, config.clone())?;
        let writer = PacketWriter::with_config_peer(stream, config)?;
        debug!(addr, "connected to bridge");
        Ok(Self {
            reader,
            writer,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask whether the bridge has its device open.
    pub fn status(&mut self) -> Result<bool> {
        self.request_status(false)
    }

    /// Like [`Self::status`], and ask the bridge to log its buffer state.
    pub fn status_verbose(&mut self) -> Result<bool> {
        self.request_status(true)
    }

    fn request_status(&mut self, verbose: bool) -> Result<bool> {
        let payload: &[u8] = if verbose { &[1] } else { &[] };
        self.writer.send(STATUS, payload)?;

        // Broadcast data may be interleaved ahead of the reply.
        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            let Some(packet) = self.recv_packet()? else {
                continue;
            };
            if packet.command == STATUS_REPLY {
                return Ok(packet.payload.first().is_some_and(|&flag| flag != 0));
            }
            debug!(command = packet.name(), "skipping packet while waiting for status");
        }
        Err(PeerError::Timeout(self.timeout))
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.send(&Packet::with_u32(BAUDRATE_CHANGE, baud_rate))
    }

    pub fn set_flow_mode(&mut self, mode: FlowMode) -> Result<()> {
        self.send(&Packet::with_u32(FLOWMODE_CHANGE, mode.code()))
    }

    pub fn reconnect(&mut self) -> Result<()> {
        self.send(&Packet::new(RECONNECT, Vec::new()))
    }

    /// Ask the bridge process to exit.
    pub fn kill(&mut self) -> Result<()> {
        self.send(&Packet::new(KILL, Vec::new()))
    }

    /// Write `data` to the device verbatim.
    pub fn send_as_is(&mut self, data: &[u8]) -> Result<()> {
        self.writer.send(SEND_AS_IS, data).map_err(Into::into)
    }

    pub fn send(&mut self, packet: &Packet) -> Result<()> {
        self.writer.write_packet(packet).map_err(Into::into)
    }

    /// Wait up to the timeout for the next packet from the bridge.
    ///
    /// `Ok(None)` means nothing arrived in time.
    pub fn recv_packet(&mut self) -> Result<Option<Packet>> {
        match self.reader.try_read_packet() {
            Ok(packet) => Ok(packet),
            Err(PacketError::ConnectionClosed) => {
                Err(PeerError::Disconnected("bridge closed the connection".into()))
            }
            Err(PacketError::Io(err)) if err.kind() == ErrorKind::ConnectionReset => {
                Err(PeerError::Disconnected(err.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use otcom_frame::RAW_DATA;
    use otcom_transport::TcpServer;

    use super::*;
    use crate::client::{Client, ClientConfig};
    use crate::control::{process_requests, ControlHandler};

    struct Connected;

    impl ControlHandler for Connected {
        fn is_connected(&self) -> bool {
            true
        }
        fn baud_rate(&self) -> u32 {
            115_200
        }
        fn flow_mode(&self) -> FlowMode {
            FlowMode::None
        }
        fn request_baud_rate(&self, _baud_rate: u32) {}
        fn request_flow_mode(&self, _mode: FlowMode) {}
        fn request_reconnect(&self) {}
        fn request_kill(&self) {}
        fn send_as_is(&self, _data: &[u8]) {}
    }

    fn accept(server: &TcpServer) -> PeerStream {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(stream) = server.accept().expect("accept") {
                return stream;
            }
            assert!(Instant::now() < deadline, "no connection");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn status_skips_broadcast_data() {
        let server = TcpServer::bind("127.0.0.1", 0).expect("bind");
        let addr = server.local_addr().to_string();

        let bridge = thread::spawn(move || {
            let client = Client::new(1, accept(&server), &ClientConfig::default()).expect("client");
            client.send(RAW_DATA, b"noise").expect("broadcast");
            let deadline = Instant::now() + Duration::from_secs(2);
            while Instant::now() < deadline {
                let _ = client.read_available();
                if process_requests(&client, &Connected).expect("dispatch") > 0 {
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            panic!("status request never arrived");
        });

        let mut remote = BridgeClient::connect(&addr).expect("connect");
        assert!(remote.status().expect("status"));
        bridge.join().expect("bridge thread");
    }

    #[test]
    fn status_times_out_without_reply() {
        let server = TcpServer::bind("127.0.0.1", 0).expect("bind");
        let addr = server.local_addr().to_string();
        let mut remote =
            BridgeClient::connect_with_timeout(&addr, Duration::from_millis(100)).expect("connect");
        let _held = accept(&server);
        assert!(matches!(remote.status(), Err(PeerError::Timeout(_))));
    }

    #[test]
    fn requests_are_encoded() {
        let server = TcpServer::bind("127.0.0.1", 0).expect("bind");
        let addr = server.local_addr().to_string();
        let mut remote = BridgeClient::connect(&addr).expect("connect");
        let accepted = accept(&server);
        accepted.set_nonblocking(false).expect("blocking");
        accepted
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("timeout");

        remote.set_baud_rate(9600).expect("baud");
        remote.set_flow_mode(FlowMode::Hardware).expect("flow");
        remote.send_as_is(b"\x01\x02").expect("send");
        remote.kill().expect("kill");

        let mut reader = PacketReader::new(accepted);
        let baud = reader.read_packet().expect("baud packet");
        assert_eq!((baud.command, baud.u32_le()), (BAUDRATE_CHANGE, Some(9600)));
        let flow = reader.read_packet().expect("flow packet");
        assert_eq!((flow.command, flow.u32_le()), (FLOWMODE_CHANGE, Some(1)));
        let send = reader.read_packet().expect("send packet");
        assert_eq!(send.payload.as_ref(), b"\x01\x02");
        assert_eq!(reader.read_packet().expect("kill packet").command, KILL);
    }

    #[test]
    fn closed_bridge_is_disconnected() {
        let server = TcpServer::bind("127.0.0.1", 0).expect("bind");
        let addr = server.local_addr().to_string();
        let mut remote = BridgeClient::connect(&addr).expect("connect");
        drop(accept(&server));
        drop(server);

        let result = loop {
            match remote.recv_packet() {
                Ok(None) => continue,
                other => break other,
            }
        };
        assert!(matches!(result, Err(PeerError::Disconnected(_))));
    }
}
