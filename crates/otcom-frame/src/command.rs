//! Control-socket command bytes.
//!
//! Requests travel from peers to the bridge. Responses and data packets
//! travel from the bridge to peers only.

/// First byte of every control packet.
pub const SYNC: u8 = 0xBB;

/// Change the serial baud rate (4-byte LE payload).
pub const BAUDRATE_CHANGE: u8 = 0xA0;

/// Close and reopen the serial device.
pub const RECONNECT: u8 = 0xA2;

/// Change the serial flow mode (4-byte LE payload).
pub const FLOWMODE_CHANGE: u8 = 0xA3;

/// Terminate the bridge process.
pub const KILL: u8 = 0xB1;

/// Ask whether the device link is connected.
pub const STATUS: u8 = 0xB3;

/// Write the payload to the device verbatim.
pub const SEND_AS_IS: u8 = 0xB5;

/// Device bytes wrapped verbatim (bridge to peer).
pub const RAW_DATA: u8 = 0xB6;

/// Rendered directive text (bridge to peer).
pub const DECODED_TEXT: u8 = 0xB7;

/// Reply to [`STATUS`]: one byte, 1 connected, 0 disconnected.
pub const STATUS_REPLY: u8 = 0x02;

/// Returns a human-readable name for a command byte.
pub fn command_name(command: u8) -> &'static str {
    match command {
        BAUDRATE_CHANGE => "BAUDRATE_CHANGE",
        RECONNECT => "RECONNECT",
        FLOWMODE_CHANGE => "FLOWMODE_CHANGE",
        KILL => "KILL",
        STATUS => "STATUS",
        SEND_AS_IS => "SEND_AS_IS",
        RAW_DATA => "RAW_DATA",
        DECODED_TEXT => "DECODED_TEXT",
        STATUS_REPLY => "STATUS_REPLY",
        _ => "UNKNOWN",
    }
}

/// Returns true for commands a peer may send to the bridge.
pub fn is_request(command: u8) -> bool {
    matches!(
        command,
        BAUDRATE_CHANGE | RECONNECT | FLOWMODE_CHANGE | KILL | STATUS | SEND_AS_IS
    )
}

/// Returns true for commands the bridge sends to peers.
pub fn is_response(command: u8) -> bool {
    matches!(command, STATUS_REPLY | RAW_DATA | DECODED_TEXT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_and_responses_are_disjoint() {
        for command in 0u8..=255 {
            assert!(!(is_request(command) && is_response(command)));
        }
        assert!(is_request(STATUS));
        assert!(!is_request(RAW_DATA));
        assert!(is_response(RAW_DATA));
    }

    #[test]
    fn names() {
        assert_eq!(command_name(SEND_AS_IS), "SEND_AS_IS");
        assert_eq!(command_name(0x00), "UNKNOWN");
    }
}
