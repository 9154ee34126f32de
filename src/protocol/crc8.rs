//! CRC8 as used by the ESP3 serial protocol (polynomial 0x07, initial value 0).

const POLYNOMIAL: u8 = 0x07;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLYNOMIAL
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

/// Computes the CRC8 checksum of a block.
#[must_use]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &b| TABLE[usize::from(crc ^ b)])
}
