//! Ed25519 identity keys
//!
//! Signing keys back local identities and sign key packages, group info
//! and commits. Verifying keys are carried in key packages and the roster.

use super::errors::{MlsError, MlsResult};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

pub const SIGNATURE_LEN: usize = 64;
pub const KEY_LEN: usize = 32;

/// Identity signing key, erased from memory on drop
#[derive(ZeroizeOnDrop)]
pub struct MlsSigningKey {
    inner: SigningKey,
}

impl MlsSigningKey {
    pub fn generate() -> Self {
        let mut seed = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut seed);
        Self::from_bytes(&seed)
    }

    /// Deterministic key from a 32-byte seed
    pub fn from_bytes(seed: &[u8; KEY_LEN]) -> Self {
        Self { inner: SigningKey::from_bytes(seed) }
    }

    pub fn from_slice(bytes: &[u8]) -> MlsResult<Self> {
        let seed: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            MlsError::CryptoError(format!("signing key must be {} bytes", KEY_LEN))
        })?;
        Ok(Self::from_bytes(&seed))
    }

    pub fn verifying_key(&self) -> MlsVerifyingKey {
        MlsVerifyingKey { inner: self.inner.verifying_key() }
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.inner.sign(data).to_bytes().to_vec()
    }

    /// Raw seed; only used when handing the key to a ciphersuite provider
    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.inner.to_bytes()
    }
}

/// Identity public key as carried in key packages and the roster
#[derive(Clone)]
pub struct MlsVerifyingKey {
    inner: VerifyingKey,
}

impl MlsVerifyingKey {
    pub fn from_slice(bytes: &[u8]) -> MlsResult<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            MlsError::CryptoError(format!("verifying key must be {} bytes", KEY_LEN))
        })?;
        let inner = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| MlsError::CryptoError(format!("not a valid Ed25519 point: {}", e)))?;
        Ok(Self { inner })
    }

    pub fn verify(&self, data: &[u8], signature: &[u8]) -> MlsResult<()> {
        let signature: [u8; SIGNATURE_LEN] = signature.try_into().map_err(|_| {
            MlsError::CryptoError(format!("signature must be {} bytes", SIGNATURE_LEN))
        })?;

        self.inner
            .verify(data, &Signature::from_bytes(&signature))
            .map_err(|_| MlsError::CryptoError("Signature verification failed".to_string()))
    }

    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.inner.to_bytes()
    }
}
