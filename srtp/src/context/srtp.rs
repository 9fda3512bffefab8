//! SRTP encrypt/decrypt.

use bytes::Bytes;
use util::marshal::MarshalSize;

use super::{unmarshal_rtp_header, Context};
use crate::error::{Error, Result};
use crate::stream::SrtpStream;

impl Context {
    /// Parses the header, updates ROC/`s_l`, derives the IV for the
    /// configured cipher, and appends the authentication tag.
    pub fn encrypt_rtp(&mut self, plaintext: &[u8]) -> Result<Bytes> {
        let header = unmarshal_rtp_header(plaintext)?;
        if plaintext.len() < header.marshal_size() {
            return Err(Error::RtpTooShort(plaintext.len(), header.marshal_size()));
        }

        let stream = self.srtp_streams.get_or_create(header.ssrc);
        let roc = stream.roc_for_encrypt(header.sequence_number)?;

        let out = self.cipher.encrypt_rtp(plaintext, &header, roc)?;

        self.srtp_streams
            .get_or_create(header.ssrc)
            .advance(header.sequence_number);

        log::trace!(
            "encrypted srtp packet ssrc={:#010x} seq={} roc={}",
            header.ssrc,
            header.sequence_number,
            roc
        );

        Ok(out)
    }

    /// Resolves the rollover-consistent packet index, rejects jumps too far
    /// into the future, verifies the tag, and only then commits the replay
    /// window and stream state.
    pub fn decrypt_rtp(&mut self, encrypted: &[u8]) -> Result<Bytes> {
        let header = unmarshal_rtp_header(encrypted)?;
        let auth_tag_len = self.cipher.rtp_auth_tag_len();
        if encrypted.len() < header.marshal_size() + auth_tag_len {
            return Err(Error::RtpTooShort(
                encrypted.len(),
                header.marshal_size() + auth_tag_len,
            ));
        }

        let stream = self.srtp_streams.get_or_create(header.ssrc);
        let roc = stream
            .tentative_roc(header.sequence_number)
            .ok_or(Error::RolloverAmbiguous)?;
        let index = SrtpStream::index(roc, header.sequence_number);

        // Authenticate (and, for CTR suites, decrypt) before consulting the
        // replay window, so a forged packet's freshness is never revealed
        // ahead of its tag being verified.
        let plaintext = self.cipher.decrypt_rtp(encrypted, &header, roc)?;

        let stream = self.srtp_streams.get_or_create(header.ssrc);
        match stream.replay.check(index) {
            crate::replay::ReplayOutcome::Duplicate => return Err(Error::Replayed),
            crate::replay::ReplayOutcome::TooOld => return Err(Error::TooOld),
            crate::replay::ReplayOutcome::Accepted => {}
        }
        stream.replay.accept(index);
        stream.advance(header.sequence_number);

        log::trace!(
            "decrypted srtp packet ssrc={:#010x} seq={} roc={}",
            header.ssrc,
            header.sequence_number,
            roc
        );

        Ok(plaintext)
    }
}
