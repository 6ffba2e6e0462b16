//! Storage provider implementations

pub mod memory_store;
pub mod sql_store;

pub use memory_store::MemoryStorageProvider;
pub use sql_store::SqlStorageProvider;
