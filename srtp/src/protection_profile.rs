/// An SRTP/SRTCP crypto suite, analogous to a TLS cipher suite.
///
/// The numeric values match the DTLS-SRTP protection profile IDs from
/// RFC 5764 / RFC 7714 so they round-trip through key-exchange negotiation
/// even though this crate does not perform that negotiation itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtectionProfile {
    Aes128CmHmacSha1_80,
    Aes128CmHmacSha1_32,
    Aes256CmHmacSha1_80,
    Aes256CmHmacSha1_32,
    AeadAes128Gcm,
    AeadAes256Gcm,
}

impl ProtectionProfile {
    /// Cipher key length in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            ProtectionProfile::Aes128CmHmacSha1_80
            | ProtectionProfile::Aes128CmHmacSha1_32
            | ProtectionProfile::AeadAes128Gcm => 16,
            ProtectionProfile::Aes256CmHmacSha1_80
            | ProtectionProfile::Aes256CmHmacSha1_32
            | ProtectionProfile::AeadAes256Gcm => 32,
        }
    }

    /// Salt length in bytes.
    pub fn salt_len(&self) -> usize {
        match self {
            ProtectionProfile::Aes128CmHmacSha1_80
            | ProtectionProfile::Aes128CmHmacSha1_32
            | ProtectionProfile::Aes256CmHmacSha1_80
            | ProtectionProfile::Aes256CmHmacSha1_32 => 14,
            ProtectionProfile::AeadAes128Gcm | ProtectionProfile::AeadAes256Gcm => 12,
        }
    }

    /// Master key material length: `key_len + salt_len`.
    pub fn master_key_material_len(&self) -> usize {
        self.key_len() + self.salt_len()
    }

    /// Authentication tag length appended to each RTP/RTCP packet.
    pub fn auth_tag_len(&self) -> usize {
        match self {
            ProtectionProfile::Aes128CmHmacSha1_80 | ProtectionProfile::Aes256CmHmacSha1_80 => 10,
            ProtectionProfile::Aes128CmHmacSha1_32 | ProtectionProfile::Aes256CmHmacSha1_32 => 4,
            ProtectionProfile::AeadAes128Gcm | ProtectionProfile::AeadAes256Gcm => 16,
        }
    }

    /// Length of the derived HMAC-SHA1 session auth key, 0 for AEAD suites
    /// which authenticate via the AEAD tag instead of a separate HMAC.
    pub fn auth_key_len(&self) -> usize {
        match self {
            ProtectionProfile::Aes128CmHmacSha1_80
            | ProtectionProfile::Aes128CmHmacSha1_32
            | ProtectionProfile::Aes256CmHmacSha1_80
            | ProtectionProfile::Aes256CmHmacSha1_32 => 20,
            ProtectionProfile::AeadAes128Gcm | ProtectionProfile::AeadAes256Gcm => 0,
        }
    }

    /// True for the AES-CTR + HMAC-SHA1 family, false for the AEAD family.
    pub fn is_ctr_hmac(&self) -> bool {
        self.auth_key_len() > 0
    }
}
