//! CRC-16/CCITT (polynomial 0x1021, initial value 0xFFFF, MSB first).

/// Initial register value.
pub const CRC_INIT: u16 = 0xFFFF;

const POLY: u16 = 0x1021;

static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Feed one byte into a running CRC.
#[inline]
pub fn update_byte(crc: u16, byte: u8) -> u16 {
    (crc << 8) ^ TABLE[usize::from((crc >> 8) as u8 ^ byte)]
}

/// Feed a slice into a running CRC.
pub fn update(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, &byte| update_byte(crc, byte))
}

/// CRC of a complete buffer.
pub fn crc16(data: &[u8]) -> u16 {
    update(CRC_INIT, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn table_matches_reference_entries() {
        assert_eq!(TABLE[0], 0x0000);
        assert_eq!(TABLE[1], 0x1021);
        assert_eq!(TABLE[0x10], 0x1231);
        assert_eq!(TABLE[0xFF], 0x1EF0);
    }

    #[test]
    fn incremental_equals_one_shot() {
        let data = b"split across several updates";
        let running = update(update(CRC_INIT, &data[..5]), &data[5..]);
        assert_eq!(running, crc16(data));
    }

    #[test]
    fn empty_input_is_init() {
        assert_eq!(crc16(&[]), CRC_INIT);
    }
}
