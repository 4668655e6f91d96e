// Implementations of ContentSource.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::InMemoryContentStore;
pub use sqlite_store::SqliteContentStore;
