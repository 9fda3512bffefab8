//! SRTCP encrypt/decrypt.

use bytes::Bytes;

use super::{parse_rtcp_ssrc, Context};
use crate::error::{Error, Result};

impl Context {
    /// The index advances on every outbound packet regardless of whether
    /// this context's `srtcp_unencrypted` flag suppresses payload
    /// encryption.
    pub fn encrypt_rtcp(&mut self, decrypted: &[u8]) -> Result<Bytes> {
        let ssrc = parse_rtcp_ssrc(decrypted)?;

        let index = self.srtcp_streams.get_or_create(ssrc).next_outbound_index()?;

        let out = self
            .cipher
            .encrypt_rtcp(decrypted, index, ssrc, !self.srtcp_unencrypted)?;

        log::trace!("encrypted srtcp packet ssrc={:#010x} index={}", ssrc, index);

        Ok(out)
    }

    /// The trailer's own index is authoritative on decrypt — there is no
    /// tentative-ROC step as on the RTP side, since the index is carried
    /// explicitly rather than derived from a 16-bit sequence number.
    pub fn decrypt_rtcp(&mut self, encrypted: &[u8]) -> Result<Bytes> {
        let min_len = self.cipher.rtcp_auth_tag_len() + 4;
        if encrypted.len() < min_len {
            return Err(Error::RtcpTooShort(encrypted.len(), min_len));
        }

        let ssrc = parse_rtcp_ssrc(encrypted)?;
        let index = self.cipher.get_rtcp_index(encrypted) as u32;

        let plaintext = self.cipher.decrypt_rtcp(encrypted, index, ssrc)?;

        let stream = self.srtcp_streams.get_or_create(ssrc);
        match stream.replay.check(index as u64) {
            crate::replay::ReplayOutcome::Duplicate => return Err(Error::Replayed),
            crate::replay::ReplayOutcome::TooOld => return Err(Error::TooOld),
            crate::replay::ReplayOutcome::Accepted => {}
        }
        stream.replay.accept(index as u64);

        log::trace!("decrypted srtcp packet ssrc={:#010x} index={}", ssrc, index);

        Ok(plaintext)
    }
}
