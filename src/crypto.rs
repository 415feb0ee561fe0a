// MIT License - Copyright (c) 2026 Peter Wright

//! Record encryption for the session transport.
//!
//! Every frame after the initial device-info exchange is AES-CTR encrypted.
//! The panel does not use a standard CTR construction: the 16-byte counter
//! block starts at `nonce(8) ‖ serial(6) ‖ 0x0000` and the whole block is
//! incremented as one big-endian integer per 16-byte chunk, with the
//! single-block ECB primitive generating the keystream.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use rand::RngCore;
use tracing::debug;

use crate::codec::{append_crc, slip_decode, verify_crc};

/// Block cipher selected by key size: 16 → AES-128, 24 → AES-192,
/// 32 → AES-256.
enum AceCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AceCipher {
    fn new(key: &[u8]) -> Option<Self> {
        match key.len() {
            16 => Some(Self::Aes128(Aes128::new(GenericArray::from_slice(key)))),
            24 => Some(Self::Aes192(Aes192::new(GenericArray::from_slice(key)))),
            32 => Some(Self::Aes256(Aes256::new(GenericArray::from_slice(key)))),
            _ => None,
        }
    }

    fn encrypt_block(&self, block: &mut [u8; 16]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }
}

/// Increment a 16-byte counter as one big-endian integer (mod 2^128).
fn increment_counter(counter: &mut [u8; 16]) {
    for byte in counter.iter_mut().rev() {
        let (v, overflow) = byte.overflowing_add(1);
        *byte = v;
        if !overflow {
            break;
        }
    }
}

/// AES-CTR transform. Encryption and decryption are the same operation.
///
/// Returns `None` for an unusable key size.
pub fn aes_ctr(data: &[u8], key: &[u8], nonce: &[u8; 8], serial: &[u8; 6]) -> Option<Vec<u8>> {
    let cipher = AceCipher::new(key)?;
    let mut counter = [0u8; 16];
    counter[..8].copy_from_slice(nonce);
    counter[8..14].copy_from_slice(serial);

    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks(16) {
        let mut keystream = counter;
        cipher.encrypt_block(&mut keystream);
        for (i, &b) in chunk.iter().enumerate() {
            out.push(b ^ keystream[i]);
        }
        increment_counter(&mut counter);
    }
    Some(out)
}

/// Session record crypto bound to one key and one panel serial.
pub struct AceCrypt {
    key: Vec<u8>,
    serial: [u8; 6],
}

impl AceCrypt {
    pub fn new(key: Vec<u8>, serial: [u8; 6]) -> Self {
        Self { key, serial }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Encrypt a plaintext message for transmission.
    ///
    /// Produces `nonce(8) ‖ AES-CTR(payload ‖ be16(crc16(payload)))`; the
    /// caller SLIP-frames the result.
    pub fn encrypt_message(&self, payload: &[u8]) -> Vec<u8> {
        let mut nonce = [0u8; 8];
        rand::rng().fill_bytes(&mut nonce);
        self.encrypt_message_with_nonce(payload, &nonce)
    }

    /// Deterministic variant used by tests.
    pub fn encrypt_message_with_nonce(&self, payload: &[u8], nonce: &[u8; 8]) -> Vec<u8> {
        let plaintext = append_crc(payload);
        // The key size was validated when the crypt was installed
        let ciphertext = aes_ctr(&plaintext, &self.key, nonce, &self.serial)
            .unwrap_or_default();
        let mut out = Vec::with_capacity(8 + ciphertext.len());
        out.extend_from_slice(nonce);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Decrypt a raw SLIP frame into the plaintext message.
    ///
    /// Returns `None` on any failure (truncated frame, bad key size, CRC
    /// mismatch). The multiplexer treats `None` as "not routable", never as
    /// fatal: the stream continues with the next frame.
    pub fn decrypt_message(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let raw = slip_decode(frame);
        if raw.len() < 11 {
            debug!("Discarding truncated frame ({} bytes after SLIP)", raw.len());
            return None;
        }
        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&raw[..8]);
        let plaintext = aes_ctr(&raw[8..], &self.key, &nonce, &self.serial)?;
        if !verify_crc(&plaintext) {
            debug!("Discarding frame with invalid CRC after decrypt");
            return None;
        }
        Some(plaintext[..plaintext.len() - 2].to_vec())
    }
}
