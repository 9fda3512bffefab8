pub(crate) mod aes_cm_hmac_sha1;
pub(crate) mod aes_gcm;

use bytes::Bytes;

use crate::error::Result;

/// A suite-specific implementation of SRTP/SRTCP packet encryption and
/// authentication. Exactly one of the two concrete ciphers in this module
/// backs every `Context`; this trait is the seam between the AES/HMAC
/// primitives and the packet engine.
pub(crate) trait Cipher {
    fn rtp_auth_tag_len(&self) -> usize;
    fn rtcp_auth_tag_len(&self) -> usize;

    /// Reads the 31-bit SRTCP index out of an already-received packet's
    /// trailer, ignoring the E-bit.
    fn get_rtcp_index(&self, encrypted: &[u8]) -> usize;

    fn encrypt_rtp(&mut self, plaintext: &[u8], header: &rtp::header::Header, roc: u32)
        -> Result<Bytes>;
    fn decrypt_rtp(
        &mut self,
        encrypted: &[u8],
        header: &rtp::header::Header,
        roc: u32,
    ) -> Result<Bytes>;

    /// `encrypt` is false when the session's `SRTCP_UNENCRYPTED` flag is set
    /// for this component; the trailer's E-bit and HMAC are still produced,
    /// only the payload encryption step is skipped.
    fn encrypt_rtcp(
        &mut self,
        decrypted: &[u8],
        srtcp_index: u32,
        ssrc: u32,
        encrypt: bool,
    ) -> Result<Bytes>;
    fn decrypt_rtcp(&mut self, encrypted: &[u8], srtcp_index: u32, ssrc: u32) -> Result<Bytes>;
}
