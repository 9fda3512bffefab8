//! The SRTP/SRTCP cryptographic context for an SRTP session.
//!
//! A `Context` is one-directional: one instance encrypts outbound packets,
//! a separate instance (sharing the same master key material) decrypts
//! inbound ones. It owns the cipher and the per-SSRC stream registries for
//! both the RTP and RTCP sides.

mod srtcp;
mod srtp;
#[cfg(test)]
mod srtp_test;

use util::marshal::Unmarshal;

use crate::cipher::aes_cm_hmac_sha1::CipherAesCmHmacSha1;
use crate::cipher::aes_gcm::CipherAeadAesGcm;
use crate::cipher::Cipher;
use crate::config::{Config, SessionKeys};
use crate::error::{Error, Result};
use crate::protection_profile::ProtectionProfile;
use crate::stream::{SrtcpStream, SrtpStream, StreamRegistry};

pub struct Context {
    cipher: Box<dyn Cipher + Send>,
    srtcp_unencrypted: bool,
    srtp_streams: StreamRegistry<SrtpStream>,
    srtcp_streams: StreamRegistry<SrtcpStream>,
}

impl Context {
    /// Builds the encrypting side of a session, keyed with `config.local_keys`.
    pub fn new_outbound(config: &Config) -> Result<Self> {
        Self::with_keys(config, &config.local_keys)
    }

    /// Builds the decrypting side of a session, keyed with `config.remote_keys`.
    pub fn new_inbound(config: &Config) -> Result<Self> {
        Self::with_keys(config, &config.remote_keys)
    }

    fn with_keys(config: &Config, keys: &SessionKeys) -> Result<Self> {
        keys.validate(config.profile)?;

        let cipher: Box<dyn Cipher + Send> = match config.profile {
            ProtectionProfile::Aes128CmHmacSha1_80
            | ProtectionProfile::Aes128CmHmacSha1_32
            | ProtectionProfile::Aes256CmHmacSha1_80
            | ProtectionProfile::Aes256CmHmacSha1_32 => Box::new(CipherAesCmHmacSha1::new(
                config.profile,
                &keys.master_key,
                &keys.master_salt,
            )?),
            ProtectionProfile::AeadAes128Gcm | ProtectionProfile::AeadAes256Gcm => {
                Box::new(CipherAeadAesGcm::new(
                    config.profile,
                    &keys.master_key,
                    &keys.master_salt,
                )?)
            }
        };

        log::debug!("srtp context created for profile {:?}", config.profile);

        Ok(Context {
            cipher,
            srtcp_unencrypted: config.srtcp_unencrypted,
            srtp_streams: StreamRegistry::new(config.srtp_replay_policy),
            srtcp_streams: StreamRegistry::new(config.srtcp_replay_policy),
        })
    }
}

pub(crate) fn parse_rtcp_ssrc(buf: &[u8]) -> Result<u32> {
    if buf.len() < 8 {
        return Err(Error::RtcpTooShort(buf.len(), 8));
    }
    Ok(u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]))
}

pub(crate) fn unmarshal_rtp_header(mut buf: &[u8]) -> Result<rtp::header::Header> {
    rtp::header::Header::unmarshal(&mut buf).map_err(|_| Error::MalformedRtpHeader)
}
