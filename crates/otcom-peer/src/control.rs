use otcom_frame::{
    command_name, Packet, BAUDRATE_CHANGE, FLOWMODE_CHANGE, KILL, RECONNECT, SEND_AS_IS, STATUS,
};
use otcom_transport::FlowMode;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::Result;

/// What the control dispatcher needs from the bridge.
///
/// Configuration changes are requests: the bridge owns the device and
/// applies them on its own schedule.
pub trait ControlHandler {
    fn is_connected(&self) -> bool;
    fn baud_rate(&self) -> u32;
    fn flow_mode(&self) -> FlowMode;

    fn request_baud_rate(&self, baud_rate: u32);
    fn request_flow_mode(&self, mode: FlowMode);
    fn request_reconnect(&self);
    fn request_kill(&self);

    /// Forward peer bytes to the device untouched.
    fn send_as_is(&self, data: &[u8]);

    /// Log a detailed buffer status. Triggered by a status request with a
    /// non-zero first payload byte.
    fn report_status(&self) {}
}

/// Handle one request from `client`.
///
/// Only a status request writes back to the peer; a failed reply is the
/// only error returned.
pub fn dispatch<H: ControlHandler + ?Sized>(client: &Client, packet: &Packet, handler: &H) -> Result<()> {
    debug!(peer_id = client.id(), command = packet.name(), len = packet.payload.len(), "control request");
    match packet.command {
        BAUDRATE_CHANGE => match packet.u32_le() {
            Some(baud_rate) if baud_rate != handler.baud_rate() => {
                info!(peer_id = client.id(), baud_rate, "baud rate change requested");
                handler.request_baud_rate(baud_rate);
            }
            Some(_) => {}
            None => warn!(peer_id = client.id(), "baud rate request without 4-byte value"),
        },
        FLOWMODE_CHANGE => match packet.u32_le().map(|code| (code, FlowMode::from_code(code))) {
            Some((_, Some(mode))) if mode != handler.flow_mode() => {
                info!(peer_id = client.id(), flow = %mode, "flow mode change requested");
                handler.request_flow_mode(mode);
            }
            Some((_, Some(_))) => {}
            Some((code, None)) => warn!(peer_id = client.id(), code, "unknown flow mode"),
            None => warn!(peer_id = client.id(), "flow mode request without 4-byte value"),
        },
        STATUS => {
            if packet.payload.first().is_some_and(|&verbose| verbose != 0) {
                handler.report_status();
            }
            client.send_packet(&Packet::status_reply(handler.is_connected()))?;
        }
        RECONNECT => {
            info!(peer_id = client.id(), "reconnect requested");
            handler.request_reconnect();
        }
        KILL => {
            info!(peer_id = client.id(), "kill requested");
            handler.request_kill();
        }
        SEND_AS_IS => handler.send_as_is(&packet.payload),
        other => debug!(
            peer_id = client.id(),
            command = command_name(other),
            "ignoring non-request command"
        ),
    }
    Ok(())
}

/// Drain and dispatch every complete request buffered for `client`.
///
/// Returns the number of requests handled.
pub fn process_requests<H: ControlHandler + ?Sized>(client: &Client, handler: &H) -> Result<usize> {
    let mut handled = 0usize;
    while let Some(packet) = client.next_request() {
        dispatch(client, &packet, handler)?;
        handled += 1;
    }
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    use otcom_frame::{encode_packet, PacketReader, STATUS_REPLY};
    use otcom_transport::PeerStream;

    use super::*;
    use crate::client::tests::socket_pair;
    use crate::client::ClientConfig;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl ControlHandler for Recorder {
        fn is_connected(&self) -> bool {
            true
        }

        fn baud_rate(&self) -> u32 {
            115_200
        }

        fn flow_mode(&self) -> FlowMode {
            FlowMode::None
        }

        fn request_baud_rate(&self, baud_rate: u32) {
            self.push(format!("baud {baud_rate}"));
        }

        fn request_flow_mode(&self, mode: FlowMode) {
            self.push(format!("flow {mode}"));
        }

        fn request_reconnect(&self) {
            self.push("reconnect".into());
        }

        fn request_kill(&self) {
            self.push("kill".into());
        }

        fn send_as_is(&self, data: &[u8]) {
            self.push(format!("send {}", String::from_utf8_lossy(data)));
        }

        fn report_status(&self) {
            self.push("report".into());
        }
    }

    fn wire(packets: &[(u8, &[u8])]) -> Vec<u8> {
        let mut buf = bytes::BytesMut::new();
        for (command, payload) in packets {
            encode_packet(*command, payload, &mut buf).expect("encode");
        }
        buf.to_vec()
    }

    fn feed(client: &Client, remote: &mut PeerStream, bytes: &[u8]) {
        remote.write_all(bytes).expect("write");
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut total = 0;
        while total < bytes.len() {
            assert!(Instant::now() < deadline, "bytes never arrived");
            total += client.read_available().expect("read");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn requests_reach_handler() {
        let (accepted, mut remote) = socket_pair();
        let client = Client::new(1, accepted, &ClientConfig::default()).expect("client");
        let handler = Recorder::default();

        let bytes = wire(&[
            (BAUDRATE_CHANGE, &9600u32.to_le_bytes()[..]),
            (BAUDRATE_CHANGE, &115_200u32.to_le_bytes()[..]),
            (FLOWMODE_CHANGE, &2u32.to_le_bytes()[..]),
            (FLOWMODE_CHANGE, &7u32.to_le_bytes()[..]),
            (RECONNECT, &[][..]),
            (SEND_AS_IS, &b"raw"[..]),
            (KILL, &[][..]),
        ]);
        feed(&client, &mut remote, &bytes);

        assert_eq!(process_requests(&client, &handler).expect("dispatch"), 7);
        assert_eq!(
            handler.calls(),
            vec!["baud 9600", "flow xonxoff", "reconnect", "send raw", "kill"]
        );
    }

    #[test]
    fn status_is_answered_to_requester() {
        let (accepted, mut remote) = socket_pair();
        let client = Client::new(1, accepted, &ClientConfig::default()).expect("client");
        let handler = Recorder::default();
        feed(&client, &mut remote, &wire(&[(STATUS, &[1][..])]));

        process_requests(&client, &handler).expect("dispatch");
        assert_eq!(handler.calls(), vec!["report"]);

        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("timeout");
        let reply = PacketReader::new(remote).read_packet().expect("reply");
        assert_eq!(reply.command, STATUS_REPLY);
        assert_eq!(reply.payload.as_ref(), &[1]);
    }

    #[test]
    fn unknown_command_advances_one_byte() {
        let (accepted, mut remote) = socket_pair();
        let client = Client::new(1, accepted, &ClientConfig::default()).expect("client");
        let handler = Recorder::default();

        let mut bytes = vec![0xBB, 0x00, 0x00, 0x42];
        bytes.extend(wire(&[(STATUS, &[][..])]));
        feed(&client, &mut remote, &bytes);

        assert_eq!(process_requests(&client, &handler).expect("dispatch"), 1);
        client.with_ring(|ring| {
            assert_eq!(ring.consumed(), bytes.len());
            assert!(ring.is_empty());
        });

        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("timeout");
        let mut reader = PacketReader::new(remote);
        assert_eq!(reader.read_packet().expect("reply").command, STATUS_REPLY);
    }

    #[test]
    fn partial_packet_waits() {
        let (accepted, mut remote) = socket_pair();
        let client = Client::new(1, accepted, &ClientConfig::default()).expect("client");
        let handler = Recorder::default();
        let bytes = wire(&[(SEND_AS_IS, &b"hello"[..])]);

        feed(&client, &mut remote, &bytes[..6]);
        assert_eq!(process_requests(&client, &handler).expect("dispatch"), 0);
        feed(&client, &mut remote, &bytes[6..]);
        assert_eq!(process_requests(&client, &handler).expect("dispatch"), 1);
        assert_eq!(handler.calls(), vec!["send hello"]);
    }
}
