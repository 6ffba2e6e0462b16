//! Provider Implementations
//!
//! Concrete implementations of the ciphersuite and identity traits.

pub mod memory_identity;
pub mod rust_crypto;

pub use memory_identity::MemoryIdentityProvider;
pub use rust_crypto::RustCryptoProvider;
