// The core module contains all business logic.
// Each feature gets its own submodule; storage and the cache are ports
// implemented in infra.

#[path = "errors.rs"]
pub mod errors;

#[path = "locks.rs"]
pub mod locks;

#[path = "content/mod.rs"]
pub mod content;

#[path = "trust/mod.rs"]
pub mod trust;

#[path = "detection/mod.rs"]
pub mod detection;

#[path = "queue/mod.rs"]
pub mod queue;

#[path = "moderation/mod.rs"]
pub mod moderation;
