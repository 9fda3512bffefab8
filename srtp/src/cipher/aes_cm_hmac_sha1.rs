//! AES-CTR + HMAC-SHA1 cipher family (RFC 3711's original suites).
//!
//! Covers all four profiles built on this family
//! (`AES_128/256_CM_HMAC_SHA1_80/32`); the only per-profile differences are
//! the session key length (16 or 32 bytes) and the truncated tag length (10
//! or 4 bytes), both read from [`ProtectionProfile`].

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use bytes::{BufMut, Bytes};
use byteorder::{BigEndian, ByteOrder};
use hmac::{Hmac, Mac};
use rtcp::header::{HEADER_LENGTH, SSRC_LENGTH};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use util::marshal::MarshalSize;

use super::Cipher;
use crate::error::{Error, Result};
use crate::key_derivation::{
    aes_cm_key_derivation, LABEL_SRTCP_AUTHENTICATION_TAG, LABEL_SRTCP_ENCRYPTION,
    LABEL_SRTCP_SALT, LABEL_SRTP_AUTHENTICATION_TAG, LABEL_SRTP_ENCRYPTION, LABEL_SRTP_SALT,
};
use crate::protection_profile::ProtectionProfile;

type HmacSha1 = Hmac<Sha1>;

const SRTCP_INDEX_SIZE: usize = 4;

enum StreamCipherImpl {
    Aes128(ctr::Ctr128BE<aes::Aes128>),
    Aes256(ctr::Ctr128BE<aes::Aes256>),
}

impl StreamCipherImpl {
    fn new(key: &[u8], iv: &[u8; 16]) -> Result<Self> {
        let nonce = GenericArray::from_slice(iv);
        match key.len() {
            16 => {
                let k = GenericArray::from_slice(key);
                Ok(StreamCipherImpl::Aes128(ctr::Ctr128BE::<aes::Aes128>::new(
                    k, nonce,
                )))
            }
            32 => {
                let k = GenericArray::from_slice(key);
                Ok(StreamCipherImpl::Aes256(ctr::Ctr128BE::<aes::Aes256>::new(
                    k, nonce,
                )))
            }
            other => Err(Error::MasterKeyLength(16, other)),
        }
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        match self {
            StreamCipherImpl::Aes128(c) => c.apply_keystream(data),
            StreamCipherImpl::Aes256(c) => c.apply_keystream(data),
        }
    }

    fn seek(&mut self, pos: u64) {
        match self {
            StreamCipherImpl::Aes128(c) => c.seek(pos),
            StreamCipherImpl::Aes256(c) => c.seek(pos),
        }
    }
}

/// Builds the 128-bit CTR IV per RFC 3711 §4.1.1:
/// `IV = (k_s << 16) XOR (SSRC << 64) XOR (i << 16)`, where `i` is the
/// 48-bit packet index `2^16*ROC + SEQ` for SRTP, or the 48-bit
/// `2^16*rollover + index` pairing SRTCP reuses the same construction with.
fn generate_counter(sequence_number: u16, rollover_counter: u32, ssrc: u32, session_salt: &[u8]) -> [u8; 16] {
    let mut counter = [0u8; 16];
    counter[4..8].copy_from_slice(&ssrc.to_be_bytes());
    counter[8..12].copy_from_slice(&rollover_counter.to_be_bytes());
    counter[12..16].copy_from_slice(&((sequence_number as u32) << 16).to_be_bytes());

    for (i, b) in session_salt.iter().enumerate().take(14) {
        counter[i] ^= b;
    }
    counter
}

pub(crate) struct CipherAesCmHmacSha1 {
    profile: ProtectionProfile,
    srtp_session_key: Vec<u8>,
    srtp_session_salt: Vec<u8>,
    srtp_session_auth: HmacSha1,
    srtcp_session_key: Vec<u8>,
    srtcp_session_salt: Vec<u8>,
    srtcp_session_auth: HmacSha1,
}

impl CipherAesCmHmacSha1 {
    pub fn new(profile: ProtectionProfile, master_key: &[u8], master_salt: &[u8]) -> Result<Self> {
        let key_len = profile.key_len();
        let auth_key_len = profile.auth_key_len();

        let srtp_session_key =
            aes_cm_key_derivation(LABEL_SRTP_ENCRYPTION, master_key, master_salt, 0, key_len)?;
        let srtp_session_salt = aes_cm_key_derivation(
            LABEL_SRTP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;
        let srtp_session_auth_key = aes_cm_key_derivation(
            LABEL_SRTP_AUTHENTICATION_TAG,
            master_key,
            master_salt,
            0,
            auth_key_len,
        )?;

        let srtcp_session_key =
            aes_cm_key_derivation(LABEL_SRTCP_ENCRYPTION, master_key, master_salt, 0, key_len)?;
        let srtcp_session_salt = aes_cm_key_derivation(
            LABEL_SRTCP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;
        let srtcp_session_auth_key = aes_cm_key_derivation(
            LABEL_SRTCP_AUTHENTICATION_TAG,
            master_key,
            master_salt,
            0,
            auth_key_len,
        )?;

        let srtp_session_auth = HmacSha1::new_from_slice(&srtp_session_auth_key)
            .map_err(|e| Error::CipherSetup(e.to_string()))?;
        let srtcp_session_auth = HmacSha1::new_from_slice(&srtcp_session_auth_key)
            .map_err(|e| Error::CipherSetup(e.to_string()))?;

        Ok(CipherAesCmHmacSha1 {
            profile,
            srtp_session_key,
            srtp_session_salt,
            srtp_session_auth,
            srtcp_session_key,
            srtcp_session_salt,
            srtcp_session_auth,
        })
    }

    /// RFC 3711 §4.2: `M = Authenticated Portion || ROC` for SRTP.
    fn generate_srtp_auth_tag(&self, buf: &[u8], roc: u32) -> [u8; 20] {
        let mut signer = self.srtp_session_auth.clone();
        signer.update(buf);
        signer.update(&roc.to_be_bytes());
        signer.finalize().into_bytes().into()
    }

    /// RFC 3711 §4.2: SRTCP's authenticated portion already carries its own
    /// index in the trailer, so no extra counter is appended.
    fn generate_srtcp_auth_tag(&self, buf: &[u8]) -> [u8; 20] {
        let mut signer = self.srtcp_session_auth.clone();
        signer.update(buf);
        signer.finalize().into_bytes().into()
    }
}

impl Cipher for CipherAesCmHmacSha1 {
    fn rtp_auth_tag_len(&self) -> usize {
        self.profile.auth_tag_len()
    }

    fn rtcp_auth_tag_len(&self) -> usize {
        self.profile.auth_tag_len()
    }

    fn get_rtcp_index(&self, encrypted: &[u8]) -> usize {
        let tail_offset = encrypted.len() - (self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE);
        (BigEndian::read_u32(&encrypted[tail_offset..tail_offset + SRTCP_INDEX_SIZE]) & !(1 << 31))
            as usize
    }

    fn encrypt_rtp(
        &mut self,
        plaintext: &[u8],
        header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes> {
        let mut writer = Vec::with_capacity(plaintext.len() + self.rtp_auth_tag_len());
        writer.extend_from_slice(plaintext);

        let counter = generate_counter(
            header.sequence_number,
            roc,
            header.ssrc,
            &self.srtp_session_salt,
        );
        let mut stream = StreamCipherImpl::new(&self.srtp_session_key, &counter)?;
        stream.apply_keystream(&mut writer[header.marshal_size()..]);

        let auth_tag = &self.generate_srtp_auth_tag(&writer, roc)[..self.rtp_auth_tag_len()];
        writer.extend_from_slice(auth_tag);

        Ok(Bytes::from(writer))
    }

    fn decrypt_rtp(
        &mut self,
        encrypted: &[u8],
        header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes> {
        let encrypted_len = encrypted.len();
        if encrypted_len < self.rtp_auth_tag_len() {
            return Err(Error::RtpTooShort(encrypted_len, self.rtp_auth_tag_len()));
        }

        let actual_tag = &encrypted[encrypted_len - self.rtp_auth_tag_len()..];
        let cipher_text = &encrypted[..encrypted_len - self.rtp_auth_tag_len()];

        let expected_tag = &self.generate_srtp_auth_tag(cipher_text, roc)[..self.rtp_auth_tag_len()];
        if actual_tag.ct_eq(expected_tag).unwrap_u8() != 1 {
            return Err(Error::AuthFailed);
        }

        let mut writer = Vec::with_capacity(cipher_text.len());
        writer.extend_from_slice(cipher_text);

        let counter = generate_counter(
            header.sequence_number,
            roc,
            header.ssrc,
            &self.srtp_session_salt,
        );
        let mut stream = StreamCipherImpl::new(&self.srtp_session_key, &counter)?;
        stream.seek(0);
        stream.apply_keystream(&mut writer[header.marshal_size()..]);

        Ok(Bytes::from(writer))
    }

    fn encrypt_rtcp(
        &mut self,
        decrypted: &[u8],
        srtcp_index: u32,
        ssrc: u32,
        encrypt: bool,
    ) -> Result<Bytes> {
        let mut writer =
            Vec::with_capacity(decrypted.len() + SRTCP_INDEX_SIZE + self.rtcp_auth_tag_len());
        writer.extend_from_slice(decrypted);

        if encrypt {
            let counter = generate_counter(
                (srtcp_index & 0xFFFF) as u16,
                srtcp_index >> 16,
                ssrc,
                &self.srtcp_session_salt,
            );
            let mut stream = StreamCipherImpl::new(&self.srtcp_session_key, &counter)?;
            stream.apply_keystream(&mut writer[HEADER_LENGTH + SSRC_LENGTH..]);
            writer.put_u32(srtcp_index | (1u32 << 31));
        } else {
            writer.put_u32(srtcp_index);
        }

        let auth_tag = &self.generate_srtcp_auth_tag(&writer)[..self.rtcp_auth_tag_len()];
        writer.extend_from_slice(auth_tag);

        Ok(Bytes::from(writer))
    }

    fn decrypt_rtcp(&mut self, encrypted: &[u8], srtcp_index: u32, ssrc: u32) -> Result<Bytes> {
        let encrypted_len = encrypted.len();
        let min_len = self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE;
        if encrypted_len < min_len {
            return Err(Error::RtcpTooShort(encrypted_len, min_len));
        }

        let tail_offset = encrypted_len - min_len;

        let actual_tag = &encrypted[encrypted_len - self.rtcp_auth_tag_len()..];
        let cipher_text = &encrypted[..encrypted_len - self.rtcp_auth_tag_len()];
        let expected_tag = &self.generate_srtcp_auth_tag(cipher_text)[..self.rtcp_auth_tag_len()];
        if actual_tag.ct_eq(expected_tag).unwrap_u8() != 1 {
            return Err(Error::AuthFailed);
        }

        let mut writer = Vec::with_capacity(tail_offset);
        writer.extend_from_slice(&encrypted[..tail_offset]);

        let is_encrypted = encrypted[tail_offset] >> 7;
        if is_encrypted == 0 {
            return Ok(Bytes::from(writer));
        }

        let counter = generate_counter(
            (srtcp_index & 0xFFFF) as u16,
            srtcp_index >> 16,
            ssrc,
            &self.srtcp_session_salt,
        );
        let mut stream = StreamCipherImpl::new(&self.srtcp_session_key, &counter)?;
        stream.seek(0);
        stream.apply_keystream(&mut writer[HEADER_LENGTH + SSRC_LENGTH..]);

        Ok(Bytes::from(writer))
    }
}
