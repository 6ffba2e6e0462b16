//! Ciphersuite Provider Trait
//!
//! Defines the primitive cryptography the engine consumes. The engine never
//! touches a concrete signature, HPKE or AEAD implementation directly; every
//! call goes through this trait so the suite can be swapped or mocked.

use crate::core_mls::errors::MlsResult;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Numeric ciphersuite identifier
pub type CiphersuiteId = u16;

/// Numeric extension identifier
pub type ExtensionType = u16;

/// MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519
pub const MLS_128_DHKEMX25519_AES128GCM_SHA256_ED25519: CiphersuiteId = 0x0001;

/// Required capabilities extension
pub const EXTENSION_REQUIRED_CAPABILITIES: ExtensionType = 0x0003;

/// Last-resort key package marker
pub const EXTENSION_LAST_RESORT: ExtensionType = 0x000A;

/// Transport metadata for relay-addressed groups
pub const EXTENSION_NOSTR_GROUP_DATA: ExtensionType = 0xF2EE;

/// Human readable extension name
pub fn extension_name(extension: ExtensionType) -> &'static str {
    match extension {
        EXTENSION_REQUIRED_CAPABILITIES => "RequiredCapabilities",
        EXTENSION_LAST_RESORT => "LastResort",
        EXTENSION_NOSTR_GROUP_DATA => "NostrGroupData",
        _ => "Unknown",
    }
}

/// HPKE output: encapsulated key plus AEAD ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpkeCiphertext {
    pub kem_output: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// HPKE key pair, private half zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HpkeKeyPair {
    #[zeroize(skip)]
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

/// Signature key pair, private half zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SignatureKeyPair {
    #[zeroize(skip)]
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

/// Cryptographic primitives for one fixed ciphersuite
///
/// Implementations must be deterministic for `hash`, `kdf_*`, `sign` and
/// `aead_*` given identical inputs, and draw all randomness from a CSPRNG.
pub trait CiphersuiteProvider: Send + Sync {
    /// Ciphersuite identifier
    fn suite_id(&self) -> CiphersuiteId;

    /// Ciphersuite name as registered with IANA
    fn suite_name(&self) -> &'static str;

    /// Extensions this provider's engine understands
    fn supported_extensions(&self) -> Vec<ExtensionType>;

    /// Output size of `hash` and `kdf_extract`
    fn hash_len(&self) -> usize;

    /// AEAD key size
    fn aead_key_len(&self) -> usize;

    /// AEAD nonce size
    fn aead_nonce_len(&self) -> usize;

    /// Cryptographically secure random bytes
    fn random_bytes(&self, n: usize) -> Vec<u8>;

    /// Ciphersuite hash function
    fn hash(&self, data: &[u8]) -> Vec<u8>;

    /// HKDF-Extract
    fn kdf_extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8>;

    /// HKDF-Expand
    fn kdf_expand(&self, prk: &[u8], info: &[u8], len: usize) -> MlsResult<Vec<u8>>;

    /// Generate a signature key pair
    fn generate_signature_keypair(&self) -> SignatureKeyPair;

    /// Sign `message` with a raw private key
    fn sign(&self, private_key: &[u8], message: &[u8]) -> MlsResult<Vec<u8>>;

    /// Verify `signature` over `message`
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> MlsResult<()>;

    /// Generate an HPKE key pair
    fn generate_hpke_keypair(&self) -> HpkeKeyPair;

    /// HPKE single-shot seal to `recipient_public`
    fn hpke_seal(
        &self,
        recipient_public: &[u8],
        info: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> MlsResult<HpkeCiphertext>;

    /// HPKE single-shot open with `recipient_private`
    fn hpke_open(
        &self,
        recipient_private: &[u8],
        info: &[u8],
        aad: &[u8],
        ciphertext: &HpkeCiphertext,
    ) -> MlsResult<Vec<u8>>;

    /// AEAD seal
    fn aead_seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8])
        -> MlsResult<Vec<u8>>;

    /// AEAD open
    fn aead_open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8])
        -> MlsResult<Vec<u8>>;
}
