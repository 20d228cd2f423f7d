use crc16::{ARC, State};

/// CRC-16/ARC: polynomial 0x8005 reflected, zero init and xor-out.
/// Must match the launch monitor firmware byte-for-byte.
pub fn checksum(data: &[u8]) -> u16 {
    State::<ARC>::calculate(data)
}

/// Appends the checksum of `data` to it, little-endian.
pub fn append_checksum(data: &mut Vec<u8>) {
    let crc = checksum(data);
    data.extend_from_slice(&crc.to_le_bytes());
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn matches_published_check_value() {
        assert_eq!(checksum(b"123456789"), 0xBB3D);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn single_byte_vectors() {
        assert_eq!(checksum(&[0x00]), 0x0000);
        assert_eq!(checksum(&[0x01]), 0xC0C1);
    }

    #[test]
    fn append_is_little_endian() {
        let mut data = b"123456789".to_vec();
        append_checksum(&mut data);
        assert_eq!(&data[9..], &[0x3D, 0xBB]);
    }
}
