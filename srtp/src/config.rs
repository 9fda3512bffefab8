//! Session configuration.
//!
//! `Config` bundles the master key material and suite selection a
//! [`crate::Context`] is built from; it does not read environment variables
//! or configuration files — callers obtain key material from their own
//! key-exchange layer (DTLS-SRTP, SDES, etc.) and pass it in directly.

use crate::error::{Error, Result};
use crate::protection_profile::ProtectionProfile;
use crate::replay::ReplayPolicy;

/// A master key and salt pair, sized according to a [`ProtectionProfile`].
#[derive(Clone)]
pub struct SessionKeys {
    pub master_key: Vec<u8>,
    pub master_salt: Vec<u8>,
}

impl SessionKeys {
    pub fn new(master_key: impl Into<Vec<u8>>, master_salt: impl Into<Vec<u8>>) -> Self {
        SessionKeys {
            master_key: master_key.into(),
            master_salt: master_salt.into(),
        }
    }

    pub(crate) fn validate(&self, profile: ProtectionProfile) -> Result<()> {
        if self.master_key.len() != profile.key_len() {
            return Err(Error::MasterKeyLength(profile.key_len(), self.master_key.len()));
        }
        if self.master_salt.len() != profile.salt_len() {
            return Err(Error::MasterSaltLength(
                profile.salt_len(),
                self.master_salt.len(),
            ));
        }
        Ok(())
    }
}

/// Configuration for an SRTP session's pair of [`crate::Context`]s: one
/// instance encrypts with `local_keys`, the other decrypts with
/// `remote_keys`; which side is "local" depends on which peer built it.
#[derive(Clone)]
pub struct Config {
    pub profile: ProtectionProfile,
    pub local_keys: SessionKeys,
    pub remote_keys: SessionKeys,
    /// When set, outbound SRTCP on this context is sent with the E-bit
    /// clear and the payload left unencrypted; the trailer and HMAC (or
    /// AEAD tag) are still produced, so integrity is preserved.
    pub srtcp_unencrypted: bool,
    pub srtp_replay_policy: ReplayPolicy,
    pub srtcp_replay_policy: ReplayPolicy,
}

impl Config {
    pub fn new(profile: ProtectionProfile, local_keys: SessionKeys, remote_keys: SessionKeys) -> Result<Self> {
        local_keys.validate(profile)?;
        remote_keys.validate(profile)?;
        Ok(Config {
            profile,
            local_keys,
            remote_keys,
            srtcp_unencrypted: false,
            srtp_replay_policy: ReplayPolicy::default(),
            srtcp_replay_policy: ReplayPolicy::default(),
        })
    }

    pub fn with_srtcp_unencrypted(mut self, unencrypted: bool) -> Self {
        self.srtcp_unencrypted = unencrypted;
        self
    }

    pub fn with_srtp_replay_policy(mut self, policy: ReplayPolicy) -> Self {
        self.srtp_replay_policy = policy;
        self
    }

    pub fn with_srtcp_replay_policy(mut self, policy: ReplayPolicy) -> Self {
        self.srtcp_replay_policy = policy;
        self
    }
}
