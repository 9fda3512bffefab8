//! Authenticated encryption and replay protection for RTP/RTCP media.
//!
//! Implements SRTP/SRTCP (RFC 3711) and the AES-GCM extension (RFC 7714):
//! key derivation, the CTR+HMAC-SHA1 and AEAD_AES_GCM cipher families,
//! rollover-counter tracking, and the 64-packet sliding replay window. The
//! crate is synchronous and does not own sockets, timers, or a key-exchange
//! mechanism — callers supply master key material (e.g. from DTLS-SRTP) and
//! pass whole packet buffers in and out.

mod cipher;
pub mod config;
pub mod context;
mod error;
mod key_derivation;
mod protection_profile;
mod replay;
mod stream;

pub use config::{Config, SessionKeys};
pub use context::Context;
pub use error::{Error, Result};
pub use protection_profile::ProtectionProfile;
pub use replay::ReplayPolicy;
