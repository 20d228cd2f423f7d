//! Consistent Overhead Byte Stuffing.
//!
//! Encoded output never contains a zero byte, so zero can delimit frames on the
//! wire. Each block starts with a code byte `n` (1..=255) followed by `n - 1`
//! data bytes; a code below 0xFF implies a zero after the block unless it is
//! the last block.

use thiserror::Error;

const MAX_BLOCK: u8 = 0xFF;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CobsError {
    #[error("zero byte at offset {0} inside encoded data")]
    UnexpectedZero(usize),
    #[error("block at offset {offset} needs {needed} bytes, only {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 254 + 2);
    let mut code_index = 0;
    let mut code: u8 = 1;
    out.push(0);

    for &byte in data {
        if byte == 0 {
            out[code_index] = code;
            code_index = out.len();
            out.push(0);
            code = 1;
            continue;
        }
        out.push(byte);
        code += 1;
        if code == MAX_BLOCK {
            out[code_index] = code;
            code_index = out.len();
            out.push(0);
            code = 1;
        }
    }
    out[code_index] = code;
    out
}

pub fn decode(encoded: &[u8]) -> Result<Vec<u8>, CobsError> {
    let mut out = Vec::with_capacity(encoded.len());
    let mut i = 0;

    while i < encoded.len() {
        let code = encoded[i];
        if code == 0 {
            return Err(CobsError::UnexpectedZero(i));
        }
        let start = i + 1;
        let end = start + code as usize - 1;
        if end > encoded.len() {
            return Err(CobsError::Truncated {
                offset: i,
                needed: code as usize - 1,
                available: encoded.len() - start,
            });
        }
        if let Some(pos) = encoded[start..end].iter().position(|b| *b == 0) {
            return Err(CobsError::UnexpectedZero(start + pos));
        }
        out.extend_from_slice(&encoded[start..end]);
        i = end;
        if code != MAX_BLOCK && i < encoded.len() {
            out.push(0);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_vectors() {
        assert_eq!(encode(&[]), vec![0x01]);
        assert_eq!(encode(&[0x00]), vec![0x01, 0x01]);
        assert_eq!(encode(&[0x00, 0x00]), vec![0x01, 0x01, 0x01]);
        assert_eq!(encode(&[0x11, 0x22, 0x00, 0x33]), vec![0x03, 0x11, 0x22, 0x02, 0x33]);
        assert_eq!(encode(&[0x11, 0x00, 0x00, 0x00]), vec![0x02, 0x11, 0x01, 0x01, 0x01]);
    }

    #[test]
    fn long_zero_free_run_splits_at_254() {
        let data: Vec<u8> = (0..254).map(|i| (i % 255 + 1) as u8).collect();
        let encoded = encode(&data);
        assert_eq!(encoded[0], 0xFF);
        assert_eq!(encoded.len(), 256);
        assert_eq!(*encoded.last().unwrap(), 0x01);
        assert!(!encoded.contains(&0));
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn long_zero_run_round_trips() {
        let data = vec![0u8; 300];
        let encoded = encode(&data);
        assert!(!encoded.contains(&0));
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn decode_rejects_embedded_zero() {
        assert_eq!(decode(&[0x03, 0x11, 0x00]), Err(CobsError::UnexpectedZero(2)));
        assert_eq!(decode(&[0x00]), Err(CobsError::UnexpectedZero(0)));
    }

    #[test]
    fn decode_rejects_overrun() {
        assert_eq!(
            decode(&[0x05, 0x11, 0x22]),
            Err(CobsError::Truncated {
                offset: 0,
                needed: 4,
                available: 2
            })
        );
    }

    proptest! {
        #[test]
        fn round_trip(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let encoded = encode(&data);
            prop_assert!(!encoded.contains(&0));
            prop_assert_eq!(decode(&encoded).unwrap(), data);
        }

        #[test]
        fn round_trip_sparse(data in proptest::collection::vec(prop_oneof![Just(0u8), 1u8..=255], 0..700)) {
            prop_assert_eq!(decode(&encode(&data)).unwrap(), data);
        }
    }
}
