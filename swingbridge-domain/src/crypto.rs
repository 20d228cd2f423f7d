//! AES-256-CBC with PKCS7 padding over the MLM2PRO measurement and event
//! payloads.
//!
//! The key and IV are the fixed pre-shared values the launch monitor firmware
//! expects. They are compiled in and never change for the life of the process,
//! so a single [`Cipher`] is shared read-only by every session.

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;

/// Encryption type announced in the auth request.
pub const ENCRYPTION_TYPE: [u8; 2] = [0x00, 0x01];

const MLM2PRO_KEY: [u8; KEY_SIZE] = [
    0x1a, 0x41, 0x9a, 0x55, 0xd6, 0x2e, 0xe4, 0x8b, 0x36, 0xa7, 0x1b, 0x64, 0x0c, 0x7d, 0xf2, 0x93,
    0x5e, 0xc0, 0x88, 0x21, 0x4f, 0xb3, 0x6a, 0x17, 0xe9, 0x02, 0x75, 0xcd, 0x3b, 0x9f, 0x40, 0xd8,
];

const MLM2PRO_IV: [u8; BLOCK_SIZE] = [
    109, 46, 82, 19, 33, 50, 4, 69, 111, 44, 121, 72, 16, 101, 109, 66,
];

pub static MLM2PRO_CIPHER: Cipher = Cipher::new(MLM2PRO_KEY, MLM2PRO_IV);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("ciphertext length {0} is not a non-zero multiple of the block size")]
    Length(usize),
    #[error("invalid padding")]
    Padding,
}

#[derive(Clone)]
pub struct Cipher {
    key: [u8; KEY_SIZE],
    iv: [u8; BLOCK_SIZE],
}

impl Cipher {
    pub const fn new(key: [u8; KEY_SIZE], iv: [u8; BLOCK_SIZE]) -> Cipher {
        Cipher { key, iv }
    }

    pub fn key_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes256CbcEnc::new(&self.key.into(), &self.iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(DecryptError::Length(ciphertext.len()));
        }
        Aes256CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| DecryptError::Padding)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ciphertext_is_padded_to_blocks() {
        assert_eq!(MLM2PRO_CIPHER.encrypt(&[]).len(), 16);
        assert_eq!(MLM2PRO_CIPHER.encrypt(&[0u8; 15]).len(), 16);
        assert_eq!(MLM2PRO_CIPHER.encrypt(&[0u8; 16]).len(), 32);
    }

    #[test]
    fn truncated_ciphertext_is_an_error() {
        let ciphertext = MLM2PRO_CIPHER.encrypt(b"club speed and ball speed");
        assert_eq!(
            MLM2PRO_CIPHER.decrypt(&ciphertext[..ciphertext.len() - 1]),
            Err(DecryptError::Length(ciphertext.len() - 1))
        );
        assert_eq!(MLM2PRO_CIPHER.decrypt(&[]), Err(DecryptError::Length(0)));
    }

    #[test]
    fn corrupted_padding_is_an_error() {
        let mut ciphertext = MLM2PRO_CIPHER.encrypt(&[7u8; 16]);
        // the final block is pure padding; flipping a byte of the previous
        // ciphertext block garbles only that padding byte after CBC chaining
        let last = ciphertext.len() - BLOCK_SIZE - 1;
        ciphertext[last] ^= 0x55;
        assert_eq!(MLM2PRO_CIPHER.decrypt(&ciphertext), Err(DecryptError::Padding));
    }

    #[test]
    fn different_key_does_not_decrypt() {
        let other = Cipher::new([0x42; KEY_SIZE], MLM2PRO_IV);
        let ciphertext = MLM2PRO_CIPHER.encrypt(b"hello");
        assert_ne!(other.decrypt(&ciphertext).ok(), Some(b"hello".to_vec()));
    }

    proptest! {
        #[test]
        fn round_trip(plaintext in proptest::collection::vec(any::<u8>(), 0..=1024)) {
            let ciphertext = MLM2PRO_CIPHER.encrypt(&plaintext);
            prop_assert_eq!(MLM2PRO_CIPHER.decrypt(&ciphertext).unwrap(), plaintext);
        }

        #[test]
        fn decrypt_never_panics(garbage in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = MLM2PRO_CIPHER.decrypt(&garbage);
        }
    }
}
