//! Sealed boxes: public-key authenticated encryption of payloads for a single party.
//!
//! A payload is sealed by generating an ephemeral X25519 key pair, deriving a symmetric key from
//! the Diffie-Hellman secret using BLAKE3 and encrypting the bincode-serialized payload with
//! ChaCha20Poly1305. Only the holder of the recipient's [`SecretKey`] can open it.

use std::fmt;

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use curve25519_dalek::montgomery::MontgomeryPoint;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

const KDF_CONTEXT: &str = "tristat 2024 sealed box v1";

/// Errors that can occur while sealing or opening a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SealError {
    /// The payload could not be (de-)serialized.
    #[error("payload serialization failed: {0}")]
    Serde(String),
    /// The payload could not be encrypted.
    #[error("encryption failed")]
    EncryptionFailed,
    /// The ciphertext was not created for this key or has been tampered with.
    #[error("decryption failed")]
    DecryptionFailed,
    /// The sealed payload is too short to contain an ephemeral key.
    #[error("sealed payload is malformed")]
    Malformed,
    /// The Diffie-Hellman exchange produced the all-zero point.
    #[error("degenerate public key")]
    DegenerateKey,
}

/// The public half of a party's key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(pub [u8; 32]);

/// The secret half of a party's key pair.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretKey([u8; 32]);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<REDACTED>)")
    }
}

/// An encrypted payload that only the intended recipient can open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sealed(pub Vec<u8>);

impl SecretKey {
    /// Generates a fresh secret key.
    pub fn generate(rng: &mut impl CryptoRng) -> Self {
        SecretKey(rng.random())
    }

    /// Wraps raw key bytes. Any 32 bytes are a valid (clamped) X25519 scalar.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SecretKey(bytes)
    }

    /// Returns the raw key bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(MontgomeryPoint::mul_base_clamped(self.0).to_bytes())
    }

    /// Opens a payload that was sealed for this key.
    pub fn open<T: DeserializeOwned>(&self, sealed: &Sealed) -> Result<T, SealError> {
        if sealed.0.len() < 32 {
            return Err(SealError::Malformed);
        }
        let (ephemeral, ciphertext) = sealed.0.split_at(32);
        let ephemeral = MontgomeryPoint(ephemeral.try_into().map_err(|_| SealError::Malformed)?);
        let shared = ephemeral.mul_clamped(self.0);
        let cipher = cipher(&shared, &ephemeral, &self.public_key())?;
        let plaintext = cipher
            .decrypt(&Nonce::default(), ciphertext)
            .map_err(|_| SealError::DecryptionFailed)?;
        bincode::deserialize(&plaintext).map_err(|e| SealError::Serde(format!("{e:?}")))
    }
}

/// Seals a payload for the owner of `recipient`.
pub fn seal<T: Serialize>(
    recipient: &PublicKey,
    value: &T,
    rng: &mut impl CryptoRng,
) -> Result<Sealed, SealError> {
    let ephemeral_secret: [u8; 32] = rng.random();
    let ephemeral = MontgomeryPoint::mul_base_clamped(ephemeral_secret);
    let shared = MontgomeryPoint(recipient.0).mul_clamped(ephemeral_secret);
    let cipher = cipher(&shared, &ephemeral, recipient)?;

    let plaintext = bincode::serialize(value).map_err(|e| SealError::Serde(format!("{e:?}")))?;
    let ciphertext = cipher
        .encrypt(&Nonce::default(), plaintext.as_ref())
        .map_err(|_| SealError::EncryptionFailed)?;

    let mut bytes = Vec::with_capacity(32 + ciphertext.len());
    bytes.extend_from_slice(ephemeral.as_bytes());
    bytes.extend(ciphertext);
    Ok(Sealed(bytes))
}

/// Derives the single-use cipher for a sealed payload.
///
/// The key is unique per ephemeral key, so a fixed nonce is never reused under the same key.
fn cipher(
    shared: &MontgomeryPoint,
    ephemeral: &MontgomeryPoint,
    recipient: &PublicKey,
) -> Result<ChaCha20Poly1305, SealError> {
    if shared.as_bytes() == &[0; 32] {
        return Err(SealError::DegenerateKey);
    }
    let mut material = Vec::with_capacity(96);
    material.extend_from_slice(shared.as_bytes());
    material.extend_from_slice(ephemeral.as_bytes());
    material.extend_from_slice(&recipient.0);
    let key = blake3::derive_key(KDF_CONTEXT, &material);
    Ok(ChaCha20Poly1305::new(Key::from_slice(&key)))
}
