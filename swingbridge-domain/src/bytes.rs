#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Output width for [`int_to_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    /// Full 32-bit value, 4 bytes.
    Word,
    /// Value narrowed to a 16-bit two's complement short, 2 bytes.
    /// Used for the altitude and temperature sensor parameters.
    Short,
}

pub fn bytes_to_int(bytes: [u8; 4], endian: Endian) -> i32 {
    match endian {
        Endian::Little => i32::from_le_bytes(bytes),
        Endian::Big => i32::from_be_bytes(bytes),
    }
}

pub fn int_to_bytes(n: i32, endian: Endian, width: IntWidth) -> Vec<u8> {
    match (width, endian) {
        (IntWidth::Word, Endian::Little) => n.to_le_bytes().to_vec(),
        (IntWidth::Word, Endian::Big) => n.to_be_bytes().to_vec(),
        (IntWidth::Short, Endian::Little) => (n as i16).to_le_bytes().to_vec(),
        (IntWidth::Short, Endian::Big) => (n as i16).to_be_bytes().to_vec(),
    }
}

pub fn read_u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    let pair = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([pair[0], pair[1]]))
}

pub fn read_i16_le(bytes: &[u8], offset: usize) -> Option<i16> {
    read_u16_le(bytes, offset).map(|v| v as i16)
}

pub fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let quad = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
}

pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bytes_to_int_respects_endianness() {
        let bytes = [0x01, 0x00, 0x00, 0x80];
        assert_eq!(bytes_to_int(bytes, Endian::Little), i32::MIN + 1);
        assert_eq!(bytes_to_int(bytes, Endian::Big), 0x0100_0080);
    }

    #[test]
    fn int_to_bytes_word() {
        assert_eq!(int_to_bytes(0x0102_0304, Endian::Little, IntWidth::Word), vec![4, 3, 2, 1]);
        assert_eq!(int_to_bytes(0x0102_0304, Endian::Big, IntWidth::Word), vec![1, 2, 3, 4]);
    }

    #[test]
    fn int_to_bytes_short_narrows() {
        assert_eq!(int_to_bytes(-2, Endian::Little, IntWidth::Short), vec![0xfe, 0xff]);
        assert_eq!(int_to_bytes(1000, Endian::Big, IntWidth::Short), vec![0x03, 0xe8]);
        // only the low 16 bits survive
        assert_eq!(int_to_bytes(0x0001_0002, Endian::Little, IntWidth::Short), vec![0x02, 0x00]);
    }

    #[test]
    fn word_round_trip() {
        for n in [0, 1, -1, i32::MAX, i32::MIN, 123_456] {
            let bytes = int_to_bytes(n, Endian::Little, IntWidth::Word);
            let array: [u8; 4] = bytes.try_into().unwrap();
            assert_eq!(bytes_to_int(array, Endian::Little), n);
        }
    }

    #[test]
    fn reads_out_of_bounds_are_none() {
        assert_eq!(read_u16_le(&[1], 0), None);
        assert_eq!(read_i16_le(&[0xff, 0xff], 0), Some(-1));
        assert_eq!(read_u32_le(&[1, 0, 0, 0, 9], 1), Some(9 << 24));
        assert_eq!(read_u32_le(&[1, 0, 0, 0, 9], 2), None);
    }

    #[test]
    fn hex_helpers() {
        assert_eq!(to_hex(&[0xa0, 0x13]), "a013");
        assert_eq!(from_hex("A0 13").unwrap(), vec![0xa0, 0x13]);
        assert!(from_hex("zz").is_err());
    }
}
