use bytes::Bytes;
use util::marshal::Marshal;

use super::super::{Config, Context, ProtectionProfile, SessionKeys};
use crate::error::Error;

const MASTER_KEY: [u8; 16] = [
    0x0d, 0xcd, 0x21, 0x3e, 0x4c, 0xbc, 0xf2, 0x8f, 0x01, 0x7f, 0x69, 0x94, 0x40, 0x1e, 0x28, 0x89,
];
const MASTER_SALT: [u8; 14] = [
    0x62, 0x77, 0x60, 0x38, 0xc0, 0x6d, 0xc9, 0x41, 0x9f, 0x6d, 0xd9, 0x43, 0x3e, 0x7c,
];

// RFC 3711-style known-ciphertext vector for the same key/salt/sequence
// number, used to pin the keystream and tag against known-good output.
const SEQ_5000_ENCRYPTED: &[u8] = &[
    0x6d, 0xd3, 0x7e, 0xd5, 0x99, 0xb7, 0x2d, 0x28, 0xb1, 0xf3, 0xa1, 0xf0, 0x0c, 0xfb, 0xfd, 0x08,
];

fn build_config() -> Config {
    Config::new(
        ProtectionProfile::Aes128CmHmacSha1_80,
        SessionKeys::new(MASTER_KEY.to_vec(), MASTER_SALT.to_vec()),
        SessionKeys::new(MASTER_KEY.to_vec(), MASTER_SALT.to_vec()),
    )
    .unwrap()
}

fn build_outbound_context() -> Context {
    Context::new_outbound(&build_config()).unwrap()
}

fn build_inbound_context() -> Context {
    Context::new_inbound(&build_config()).unwrap()
}

fn test_packet(sequence_number: u16) -> rtp::packet::Packet {
    rtp::packet::Packet {
        header: rtp::header::Header {
            sequence_number,
            ..Default::default()
        },
        payload: Bytes::from_static(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05]),
    }
}

#[test]
fn encrypts_to_known_ciphertext() {
    let mut ctx = build_outbound_context();
    let raw = test_packet(5000).marshal().unwrap();
    let encrypted = ctx.encrypt_rtp(&raw).unwrap();
    assert_eq!(&encrypted[12..], SEQ_5000_ENCRYPTED);
}

#[test]
fn round_trips_a_run_of_sequence_numbers() {
    let mut encrypt_ctx = build_outbound_context();
    let mut decrypt_ctx = build_inbound_context();

    for seq in [5000u16, 5001, 5002, 5003, 5004, 65535] {
        let raw = test_packet(seq).marshal().unwrap();
        let encrypted = encrypt_ctx.encrypt_rtp(&raw).unwrap();
        let decrypted = decrypt_ctx.decrypt_rtp(&encrypted).unwrap();
        assert_eq!(decrypted, raw);
    }
}

#[test]
fn rejects_tampered_ciphertext() {
    let mut encrypt_ctx = build_outbound_context();
    let mut decrypt_ctx = build_inbound_context();

    let raw = test_packet(1).marshal().unwrap();
    let mut encrypted = encrypt_ctx.encrypt_rtp(&raw).unwrap().to_vec();
    *encrypted.last_mut().unwrap() ^= 0xff;

    let err = decrypt_ctx.decrypt_rtp(&encrypted).unwrap_err();
    assert_eq!(err, Error::AuthFailed);
}

#[test]
fn rejects_exact_replay() {
    let mut encrypt_ctx = build_outbound_context();
    let mut decrypt_ctx = build_inbound_context();

    let raw = test_packet(42).marshal().unwrap();
    let encrypted = encrypt_ctx.encrypt_rtp(&raw).unwrap();

    decrypt_ctx.decrypt_rtp(&encrypted).unwrap();
    let err = decrypt_ctx.decrypt_rtp(&encrypted).unwrap_err();
    assert_eq!(err, Error::Replayed);
}

#[test]
fn rollover_recovers_both_payloads() {
    let mut encrypt_ctx = build_outbound_context();
    let mut decrypt_ctx = build_inbound_context();

    let raw_a = test_packet(65535).marshal().unwrap();
    let raw_b = test_packet(0).marshal().unwrap();

    let enc_a = encrypt_ctx.encrypt_rtp(&raw_a).unwrap();
    let enc_b = encrypt_ctx.encrypt_rtp(&raw_b).unwrap();

    let dec_a = decrypt_ctx.decrypt_rtp(&enc_a).unwrap();
    let dec_b = decrypt_ctx.decrypt_rtp(&enc_b).unwrap();

    assert_eq!(dec_a, raw_a);
    assert_eq!(dec_b, raw_b);
}

#[test]
fn wrong_salt_fails_authentication() {
    let mut encrypt_ctx = build_outbound_context();
    let config = Config::new(
        ProtectionProfile::Aes128CmHmacSha1_80,
        SessionKeys::new(MASTER_KEY.to_vec(), vec![0u8; 14]),
        SessionKeys::new(MASTER_KEY.to_vec(), vec![0u8; 14]),
    )
    .unwrap();
    let mut wrong_ctx = Context::new_inbound(&config).unwrap();

    let raw = test_packet(5000).marshal().unwrap();
    let encrypted = encrypt_ctx.encrypt_rtp(&raw).unwrap();

    let err = wrong_ctx.decrypt_rtp(&encrypted).unwrap_err();
    assert_eq!(err, Error::AuthFailed);
}

#[test]
fn exhausted_roc_is_rejected_instead_of_wrapping() {
    let mut ctx = build_outbound_context();
    let raw_a = test_packet(65535).marshal().unwrap();
    ctx.encrypt_rtp(&raw_a).unwrap();

    // force the stream's ROC to the top of its 32-bit range, one short of
    // needing to wrap on the next rollover.
    let ssrc = test_packet(0).header.ssrc;
    let stream = ctx.srtp_streams.get_or_create(ssrc);
    stream.roc = u32::MAX;

    let raw_b = test_packet(0).marshal().unwrap();
    let err = ctx.encrypt_rtp(&raw_b).unwrap_err();
    assert_eq!(err, Error::PacketIndexExhausted);
}
