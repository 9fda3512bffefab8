use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the SRTP/SRTCP packet engines and key derivation.
///
/// `Replayed` and `AuthFailed` are kept as distinct variants so a caller can
/// branch on them, but their `Display` text is deliberately similar: callers
/// that log this error to a peer-visible channel must not let the wording
/// leak which of the two actually happened.
#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("SRTP master key must be {0} bytes, got {1}")]
    MasterKeyLength(usize, usize),
    #[error("SRTP master salt must be {0} bytes, got {1}")]
    MasterSaltLength(usize, usize),
    #[error("unsupported SRTP protection profile {0:#06x}")]
    UnsupportedProfile(u16),
    #[error("index_over_kdr > 0 is not supported")]
    NonZeroKdrUnsupported,

    #[error("RTP packet too short: {0} bytes, need at least {1}")]
    RtpTooShort(usize, usize),
    #[error("RTCP packet too short: {0} bytes, need at least {1}")]
    RtcpTooShort(usize, usize),
    #[error("malformed RTP header")]
    MalformedRtpHeader,
    #[error("malformed RTCP header")]
    MalformedRtcpHeader,

    #[error("packet failed authentication")]
    AuthFailed,
    #[error("packet rejected as a replay")]
    Replayed,
    #[error("index is older than the replay window")]
    TooOld,
    #[error("sequence number jumped too far forward to resolve a rollover counter")]
    RolloverAmbiguous,
    #[error("SSRC exhausted its 48-bit packet index space")]
    PacketIndexExhausted,
    #[error("SRTCP index exhausted its 31-bit space")]
    SrtcpIndexExhausted,

    #[error("no stream registered for SSRC {0:#010x}")]
    UnknownSsrc(u32),

    #[error("RTP codec: {0}")]
    Rtp(#[from] rtp::Error),
    #[error("RTCP codec: {0}")]
    Rtcp(#[from] rtcp::Error),
    #[error("AES-GCM: {0}")]
    AesGcm(String),
    #[error("cipher key setup: {0}")]
    CipherSetup(String),
}

impl From<aes_gcm::Error> for Error {
    fn from(e: aes_gcm::Error) -> Self {
        Error::AesGcm(e.to_string())
    }
}
