//! AEAD_AES_128_GCM / AEAD_AES_256_GCM cipher family (RFC 7714).
//!
//! Unlike the CTR+HMAC family, confidentiality and authentication are a
//! single AEAD operation; the `rtcp_auth_tag_len`/`rtp_auth_tag_len` trait
//! methods both report the 16-byte GCM tag.

use aead::generic_array::GenericArray;
use aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce};
use byteorder::{BigEndian, ByteOrder};
use bytes::{Bytes, BytesMut};
use rtcp::header::{HEADER_LENGTH, SSRC_LENGTH};
use util::marshal::MarshalSize;

use super::Cipher;
use crate::error::{Error, Result};
use crate::key_derivation::{
    aes_cm_key_derivation, LABEL_SRTCP_ENCRYPTION, LABEL_SRTCP_SALT, LABEL_SRTP_ENCRYPTION,
    LABEL_SRTP_SALT,
};
use crate::protection_profile::ProtectionProfile;

const RTCP_ENCRYPTION_FLAG: u8 = 0x80;
const AEAD_HEADER_LEN: usize = HEADER_LENGTH + SSRC_LENGTH;

enum AeadImpl {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl AeadImpl {
    fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Ok(AeadImpl::Aes128(Aes128Gcm::new(GenericArray::from_slice(
                key,
            )))),
            32 => Ok(AeadImpl::Aes256(Aes256Gcm::new(GenericArray::from_slice(
                key,
            )))),
            other => Err(Error::MasterKeyLength(16, other)),
        }
    }

    fn encrypt(&self, nonce: &[u8], payload: Payload) -> Result<Vec<u8>> {
        let n = Nonce::from_slice(nonce);
        match self {
            AeadImpl::Aes128(c) => Ok(c.encrypt(n, payload)?),
            AeadImpl::Aes256(c) => Ok(c.encrypt(n, payload)?),
        }
    }

    fn decrypt(&self, nonce: &[u8], payload: Payload) -> Result<Vec<u8>> {
        let n = Nonce::from_slice(nonce);
        match self {
            AeadImpl::Aes128(c) => c.decrypt(n, payload).map_err(|_| Error::AuthFailed),
            AeadImpl::Aes256(c) => c.decrypt(n, payload).map_err(|_| Error::AuthFailed),
        }
    }
}

pub(crate) struct CipherAeadAesGcm {
    profile: ProtectionProfile,
    srtp_cipher: AeadImpl,
    srtcp_cipher: AeadImpl,
    srtp_session_salt: Vec<u8>,
    srtcp_session_salt: Vec<u8>,
}

impl CipherAeadAesGcm {
    pub fn new(profile: ProtectionProfile, master_key: &[u8], master_salt: &[u8]) -> Result<Self> {
        let key_len = profile.key_len();

        let srtp_session_key =
            aes_cm_key_derivation(LABEL_SRTP_ENCRYPTION, master_key, master_salt, 0, key_len)?;
        let srtcp_session_key =
            aes_cm_key_derivation(LABEL_SRTCP_ENCRYPTION, master_key, master_salt, 0, key_len)?;
        let srtp_session_salt = aes_cm_key_derivation(
            LABEL_SRTP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;
        let srtcp_session_salt = aes_cm_key_derivation(
            LABEL_SRTCP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;

        Ok(CipherAeadAesGcm {
            profile,
            srtp_cipher: AeadImpl::new(&srtp_session_key)?,
            srtcp_cipher: AeadImpl::new(&srtcp_session_key)?,
            srtp_session_salt,
            srtcp_session_salt,
        })
    }

    /// RFC 7714 §8.1: 2 zero octets || SSRC || ROC || SEQ, XORed with the salt.
    fn rtp_iv(&self, header: &rtp::header::Header, roc: u32) -> [u8; 12] {
        let mut iv = [0u8; 12];
        BigEndian::write_u32(&mut iv[2..6], header.ssrc);
        BigEndian::write_u32(&mut iv[6..10], roc);
        BigEndian::write_u16(&mut iv[10..12], header.sequence_number);
        for (i, b) in iv.iter_mut().enumerate() {
            *b ^= self.srtp_session_salt[i];
        }
        iv
    }

    /// RFC 7714 §9.1: 2 zero octets || SSRC || 1-bit zero || 31-bit index,
    /// XORed with the salt.
    fn rtcp_iv(&self, srtcp_index: u32, ssrc: u32) -> [u8; 12] {
        let mut iv = [0u8; 12];
        BigEndian::write_u32(&mut iv[2..6], ssrc);
        BigEndian::write_u32(&mut iv[8..12], srtcp_index);
        for (i, b) in iv.iter_mut().enumerate() {
            *b ^= self.srtcp_session_salt[i];
        }
        iv
    }

    /// RFC 7714 §17: the "ESRTCP word", E-bit prepended to the 31-bit index.
    fn rtcp_aad(&self, rtcp_header_and_ssrc: &[u8], srtcp_index: u32, encrypted: bool) -> [u8; 12] {
        let mut aad = [0u8; 12];
        aad[..8].copy_from_slice(&rtcp_header_and_ssrc[..8]);
        BigEndian::write_u32(&mut aad[8..12], srtcp_index);
        if encrypted {
            aad[8] |= RTCP_ENCRYPTION_FLAG;
        }
        aad
    }
}

impl Cipher for CipherAeadAesGcm {
    fn rtp_auth_tag_len(&self) -> usize {
        self.profile.auth_tag_len()
    }

    fn rtcp_auth_tag_len(&self) -> usize {
        self.profile.auth_tag_len()
    }

    fn get_rtcp_index(&self, encrypted: &[u8]) -> usize {
        let pos = encrypted.len() - 4;
        let val = BigEndian::read_u32(&encrypted[pos..]);
        (val & !((RTCP_ENCRYPTION_FLAG as u32) << 24)) as usize
    }

    fn encrypt_rtp(
        &mut self,
        plaintext: &[u8],
        header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes> {
        let header_len = header.marshal_size();
        let mut writer = BytesMut::with_capacity(plaintext.len() + self.rtp_auth_tag_len());
        writer.extend_from_slice(&plaintext[..header_len]);

        let nonce = self.rtp_iv(header, roc);
        let encrypted = self.srtp_cipher.encrypt(
            &nonce,
            Payload {
                msg: &plaintext[header_len..],
                aad: &writer,
            },
        )?;
        writer.extend(encrypted);
        Ok(writer.freeze())
    }

    fn decrypt_rtp(
        &mut self,
        ciphertext: &[u8],
        header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes> {
        if ciphertext.len() < self.rtp_auth_tag_len() {
            return Err(Error::RtpTooShort(ciphertext.len(), self.rtp_auth_tag_len()));
        }
        let header_len = header.marshal_size();
        let nonce = self.rtp_iv(header, roc);
        let decrypted = self.srtp_cipher.decrypt(
            &nonce,
            Payload {
                msg: &ciphertext[header_len..],
                aad: &ciphertext[..header_len],
            },
        )?;

        let mut writer = BytesMut::with_capacity(header_len + decrypted.len());
        writer.extend_from_slice(&ciphertext[..header_len]);
        writer.extend(decrypted);
        Ok(writer.freeze())
    }

    fn encrypt_rtcp(
        &mut self,
        decrypted: &[u8],
        srtcp_index: u32,
        ssrc: u32,
        encrypt: bool,
    ) -> Result<Bytes> {
        let nonce = self.rtcp_iv(srtcp_index, ssrc);
        let aad = self.rtcp_aad(decrypted, srtcp_index, encrypt);
        let payload = &decrypted[AEAD_HEADER_LEN..];

        // When `encrypt` is false the payload is authenticated as additional
        // data instead of being passed through the cipher, so GCM emits a
        // bare tag and the plaintext payload is carried on the wire as-is.
        let (msg, carried_payload): (&[u8], &[u8]) = if encrypt {
            (payload, &[])
        } else {
            (&[], payload)
        };
        let payload_aad: Vec<u8> = if encrypt {
            aad.to_vec()
        } else {
            let mut full = aad.to_vec();
            full.extend_from_slice(payload);
            full
        };

        let tagged = self.srtcp_cipher.encrypt(
            &nonce,
            Payload {
                msg,
                aad: &payload_aad,
            },
        )?;

        let mut writer =
            BytesMut::with_capacity(AEAD_HEADER_LEN + carried_payload.len() + tagged.len() + 4);
        writer.extend_from_slice(&decrypted[..AEAD_HEADER_LEN]);
        writer.extend_from_slice(carried_payload);
        writer.extend(tagged);
        writer.extend_from_slice(&aad[8..12]);
        Ok(writer.freeze())
    }

    fn decrypt_rtcp(&mut self, encrypted: &[u8], srtcp_index: u32, ssrc: u32) -> Result<Bytes> {
        if encrypted.len() < self.rtcp_auth_tag_len() + 4 {
            return Err(Error::RtcpTooShort(encrypted.len(), self.rtcp_auth_tag_len() + 4));
        }

        let is_encrypted = encrypted[encrypted.len() - 4] >> 7 == 1;
        let nonce = self.rtcp_iv(srtcp_index, ssrc);
        let aad = self.rtcp_aad(encrypted, srtcp_index, is_encrypted);
        let body_end = encrypted.len() - 4;
        let tag_start = body_end - self.rtcp_auth_tag_len();
        let body = &encrypted[AEAD_HEADER_LEN..tag_start];
        let tag = &encrypted[tag_start..body_end];

        if is_encrypted {
            let mut sealed = Vec::with_capacity(body.len() + tag.len());
            sealed.extend_from_slice(body);
            sealed.extend_from_slice(tag);
            let decrypted = self.srtcp_cipher.decrypt(
                &nonce,
                Payload {
                    msg: &sealed,
                    aad: &aad,
                },
            )?;
            let mut writer = BytesMut::with_capacity(AEAD_HEADER_LEN + decrypted.len());
            writer.extend_from_slice(&encrypted[..AEAD_HEADER_LEN]);
            writer.extend(decrypted);
            Ok(writer.freeze())
        } else {
            let mut payload_aad = aad.to_vec();
            payload_aad.extend_from_slice(body);
            // empty plaintext with `body` folded into the AAD: a successful
            // open confirms the unencrypted payload was not tampered with.
            self.srtcp_cipher.decrypt(
                &nonce,
                Payload {
                    msg: tag,
                    aad: &payload_aad,
                },
            )?;
            let mut writer = BytesMut::with_capacity(AEAD_HEADER_LEN + body.len());
            writer.extend_from_slice(&encrypted[..AEAD_HEADER_LEN]);
            writer.extend_from_slice(body);
            Ok(writer.freeze())
        }
    }
}
