// Implementations of QueueStore.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::InMemoryQueueStore;
pub use sqlite_store::SqliteQueueStore;
