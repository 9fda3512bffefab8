//! SRTP's AES-CTR-based key derivation function (RFC 3711 §4.3).
//!
//! Every session key, salt, and auth key used by either cipher family is
//! produced by this one function: it is invoked with a different one-byte
//! label and output length for each purpose.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};

use crate::error::{Error, Result};

/// SRTP encryption key label.
pub const LABEL_SRTP_ENCRYPTION: u8 = 0x00;
/// SRTP authentication key label.
pub const LABEL_SRTP_AUTHENTICATION_TAG: u8 = 0x01;
/// SRTP salting key label.
pub const LABEL_SRTP_SALT: u8 = 0x02;
/// SRTCP encryption key label (SRTP label + 3, per RFC 3711 §4.3.2).
pub const LABEL_SRTCP_ENCRYPTION: u8 = 0x03;
/// SRTCP authentication key label.
pub const LABEL_SRTCP_AUTHENTICATION_TAG: u8 = 0x04;
/// SRTCP salting key label.
pub const LABEL_SRTCP_SALT: u8 = 0x05;

enum KeySize {
    Aes128,
    Aes256,
}

/// Derives `out_len` pseudo-random bytes for `label` from `master_key` and
/// `master_salt`, per RFC 3711 §4.3.1.
///
/// The derivation forms a 128-bit input block by XORing the master salt
/// (zero-extended to 16 bytes) with the label placed at byte offset 7, runs
/// AES-ECB-encrypt-as-CTR-keystream over the block (and its successor, for
/// labels that need more than 16 bytes of output), and returns the leading
/// `out_len` bytes of that keystream.
///
/// `index_over_kdr` supports SRTP's optional key-derivation-rate indexing;
/// this crate does not implement a non-zero KDR and rejects it.
pub fn aes_cm_key_derivation(
    label: u8,
    master_key: &[u8],
    master_salt: &[u8],
    index_over_kdr: usize,
    out_len: usize,
) -> Result<Vec<u8>> {
    if index_over_kdr != 0 {
        return Err(Error::NonZeroKdrUnsupported);
    }

    let key_size = match master_key.len() {
        16 => KeySize::Aes128,
        32 => KeySize::Aes256,
        other => return Err(Error::MasterKeyLength(16, other)),
    };

    // x = master_salt padded to 16 bytes, XORed with (label at byte offset 7)
    let mut x = [0u8; 16];
    x[..master_salt.len()].copy_from_slice(master_salt);
    x[7] ^= label;

    let base = u128::from_be_bytes(x);
    let mut out = Vec::with_capacity(out_len);
    let mut block_index: u128 = 0;
    while out.len() < out_len {
        // RFC 3711 §4.3.1: successive blocks are AES_k(IV + j) for j = 0, 1, ...,
        // where "+" is integer addition over the full 128-bit IV.
        let block = base.wrapping_add(block_index).to_be_bytes();
        let mut ga = GenericArray::clone_from_slice(&block);
        match key_size {
            KeySize::Aes128 => {
                let cipher = Aes128::new_from_slice(master_key)
                    .map_err(|e| Error::CipherSetup(e.to_string()))?;
                cipher.encrypt_block(&mut ga);
            }
            KeySize::Aes256 => {
                let cipher = Aes256::new_from_slice(master_key)
                    .map_err(|e| Error::CipherSetup(e.to_string()))?;
                cipher.encrypt_block(&mut ga);
            }
        }

        let remaining = out_len - out.len();
        out.extend_from_slice(&ga[..remaining.min(16)]);
        block_index += 1;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 3711 Appendix B.3 key derivation test vectors.
    #[test]
    fn rfc3711_test_vectors() {
        let master_key = [
            0xE1, 0xF9, 0x7A, 0x0D, 0x3E, 0x01, 0x8B, 0xE0, 0xD6, 0x4F, 0xA3, 0x2C, 0x06, 0xDE,
            0x41, 0x39,
        ];
        let master_salt = [
            0x0E, 0xC6, 0x75, 0xAD, 0x49, 0x8A, 0xFE, 0xEB, 0xB6, 0x96, 0x0B, 0x3A, 0xAB, 0xE6,
        ];

        let expected_session_key = [
            0xC6, 0x1E, 0x7A, 0x93, 0x74, 0x4F, 0x39, 0xEE, 0x10, 0x73, 0x4A, 0xFE, 0x3F, 0xF7,
            0xA0, 0x87,
        ];
        let expected_session_salt = [
            0x30, 0xCB, 0xBC, 0x08, 0x86, 0x3D, 0x8C, 0x85, 0xD4, 0x9D, 0xB3, 0x4A, 0x9A, 0xE1,
        ];
        let expected_auth_key = [
            0xCE, 0xBE, 0x32, 0x1F, 0x6F, 0xF7, 0x71, 0x6B, 0x6F, 0xD4, 0xAB, 0x49, 0xAF, 0x25,
            0x6A, 0x15, 0x6D, 0x38, 0xBA, 0xA4,
        ];

        let session_key = aes_cm_key_derivation(
            LABEL_SRTP_ENCRYPTION,
            &master_key,
            &master_salt,
            0,
            master_key.len(),
        )
        .unwrap();
        assert_eq!(session_key, expected_session_key);

        let session_salt = aes_cm_key_derivation(
            LABEL_SRTP_SALT,
            &master_key,
            &master_salt,
            0,
            master_salt.len(),
        )
        .unwrap();
        assert_eq!(session_salt, expected_session_salt);

        let auth_key = aes_cm_key_derivation(
            LABEL_SRTP_AUTHENTICATION_TAG,
            &master_key,
            &master_salt,
            0,
            20,
        )
        .unwrap();
        assert_eq!(auth_key, expected_auth_key);
    }

    #[test]
    fn rejects_nonzero_kdr() {
        let err = aes_cm_key_derivation(LABEL_SRTP_AUTHENTICATION_TAG, &[0u8; 16], &[0u8; 14], 1, 0)
            .unwrap_err();
        assert_eq!(err, Error::NonZeroKdrUnsupported);
    }

    #[test]
    fn aes256_produces_32_byte_key() {
        let master_key = [0x11u8; 32];
        let master_salt = [0x22u8; 14];
        let key = aes_cm_key_derivation(LABEL_SRTP_ENCRYPTION, &master_key, &master_salt, 0, 32)
            .unwrap();
        assert_eq!(key.len(), 32);
    }
}
