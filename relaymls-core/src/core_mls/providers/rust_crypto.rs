//! Pure-Rust provider for MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519
//!
//! - KEM: DHKEM(X25519, HKDF-SHA256)
//! - KDF: HKDF-SHA256
//! - AEAD: AES-128-GCM
//! - Signatures: Ed25519

use crate::core_mls::crypto::{MlsSigningKey, MlsVerifyingKey};
use crate::core_mls::errors::{MlsError, MlsResult};
use crate::core_mls::traits::ciphersuite::{
    CiphersuiteId, CiphersuiteProvider, ExtensionType, HpkeCiphertext, HpkeKeyPair,
    SignatureKeyPair, EXTENSION_LAST_RESORT, EXTENSION_NOSTR_GROUP_DATA,
    EXTENSION_REQUIRED_CAPABILITIES, MLS_128_DHKEMX25519_AES128GCM_SHA256_ED25519,
};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Nonce,
};
use hkdf::Hkdf;
use hpke::{
    aead::AesGcm128, kdf::HkdfSha256, kem::X25519HkdfSha256, Deserializable, Kem, OpModeR,
    OpModeS, Serializable,
};
use rand::RngCore;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// Size of AES-128-GCM key
const KEY_SIZE: usize = 16;

/// Size of nonce (96 bits for AES-GCM)
const NONCE_SIZE: usize = 12;

/// Size of SHA-256 output
const HASH_SIZE: usize = 32;

/// Size of X25519 keys
const X25519_KEY_SIZE: usize = 32;

/// HPKE suite `DHKEM(X25519, HKDF-SHA256), HKDF-SHA256, AES-128-GCM` (RFC 9180)
type HpkeKem = X25519HkdfSha256;
type HpkeKdf = HkdfSha256;
type HpkeAead = AesGcm128;

/// Default provider backed by RustCrypto and dalek crates
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCryptoProvider;

impl RustCryptoProvider {
    pub fn new() -> Self {
        Self
    }
}

fn hpke_error(context: &str, e: hpke::HpkeError) -> MlsError {
    MlsError::CryptoError(format!("{}: {}", context, e))
}

impl CiphersuiteProvider for RustCryptoProvider {
    fn suite_id(&self) -> CiphersuiteId {
        MLS_128_DHKEMX25519_AES128GCM_SHA256_ED25519
    }

    fn suite_name(&self) -> &'static str {
        "MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519"
    }

    fn supported_extensions(&self) -> Vec<ExtensionType> {
        vec![
            EXTENSION_REQUIRED_CAPABILITIES,
            EXTENSION_LAST_RESORT,
            EXTENSION_NOSTR_GROUP_DATA,
        ]
    }

    fn hash_len(&self) -> usize {
        HASH_SIZE
    }

    fn aead_key_len(&self) -> usize {
        KEY_SIZE
    }

    fn aead_nonce_len(&self) -> usize {
        NONCE_SIZE
    }

    fn random_bytes(&self, n: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; n];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    fn kdf_extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
        let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
        prk.to_vec()
    }

    fn kdf_expand(&self, prk: &[u8], info: &[u8], len: usize) -> MlsResult<Vec<u8>> {
        let hk = Hkdf::<Sha256>::from_prk(prk)
            .map_err(|e| MlsError::CryptoError(format!("Invalid PRK: {}", e)))?;
        let mut okm = vec![0u8; len];
        hk.expand(info, &mut okm)
            .map_err(|e| MlsError::CryptoError(format!("HKDF expand failed: {}", e)))?;
        Ok(okm)
    }

    fn generate_signature_keypair(&self) -> SignatureKeyPair {
        let signing_key = MlsSigningKey::generate();
        SignatureKeyPair {
            public: signing_key.verifying_key().to_bytes().to_vec(),
            private: signing_key.to_bytes().to_vec(),
        }
    }

    fn sign(&self, private_key: &[u8], message: &[u8]) -> MlsResult<Vec<u8>> {
        Ok(MlsSigningKey::from_slice(private_key)?.sign(message))
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> MlsResult<()> {
        MlsVerifyingKey::from_slice(public_key)?.verify(message, signature)
    }

    fn generate_hpke_keypair(&self) -> HpkeKeyPair {
        let mut seed = [0u8; X25519_KEY_SIZE];
        rand::rng().fill_bytes(&mut seed);
        let secret = StaticSecret::from(seed);
        seed.zeroize();

        HpkeKeyPair {
            public: PublicKey::from(&secret).as_bytes().to_vec(),
            private: secret.to_bytes().to_vec(),
        }
    }

    fn hpke_seal(
        &self,
        recipient_public: &[u8],
        info: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> MlsResult<HpkeCiphertext> {
        let recipient_pk = <HpkeKem as Kem>::PublicKey::from_bytes(recipient_public)
            .map_err(|e| hpke_error("Invalid HPKE public key", e))?;

        let (encapped_key, ciphertext) = hpke::single_shot_seal::<HpkeAead, HpkeKdf, HpkeKem, _>(
            &OpModeS::Base,
            &recipient_pk,
            info,
            plaintext,
            aad,
            &mut OsRng,
        )
        .map_err(|e| hpke_error("HPKE seal failed", e))?;

        Ok(HpkeCiphertext { kem_output: encapped_key.to_bytes().to_vec(), ciphertext })
    }

    fn hpke_open(
        &self,
        recipient_private: &[u8],
        info: &[u8],
        aad: &[u8],
        ciphertext: &HpkeCiphertext,
    ) -> MlsResult<Vec<u8>> {
        let recipient_sk = <HpkeKem as Kem>::PrivateKey::from_bytes(recipient_private)
            .map_err(|e| hpke_error("Invalid HPKE private key", e))?;
        let encapped_key = <HpkeKem as Kem>::EncappedKey::from_bytes(&ciphertext.kem_output)
            .map_err(|e| hpke_error("Invalid HPKE encapsulated key", e))?;

        hpke::single_shot_open::<HpkeAead, HpkeKdf, HpkeKem>(
            &OpModeR::Base,
            &recipient_sk,
            &encapped_key,
            info,
            &ciphertext.ciphertext,
            aad,
        )
        .map_err(|e| hpke_error("HPKE open failed", e))
    }

    fn aead_seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> MlsResult<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(MlsError::CryptoError("Invalid nonce size".to_string()));
        }
        let cipher = Aes128Gcm::new_from_slice(key)
            .map_err(|e| MlsError::CryptoError(format!("Invalid AEAD key: {}", e)))?;

        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|e| MlsError::CryptoError(format!("AEAD encryption failed: {}", e)))
    }

    fn aead_open(
        &self,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> MlsResult<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(MlsError::CryptoError("Invalid nonce size".to_string()));
        }
        let cipher = Aes128Gcm::new_from_slice(key)
            .map_err(|e| MlsError::CryptoError(format!("Invalid AEAD key: {}", e)))?;

        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|e| MlsError::CryptoError(format!("AEAD decryption failed: {}", e)))
    }
}
