// Implementations of TrustStore.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::InMemoryTrustStore;
pub use sqlite_store::SqliteTrustStore;
