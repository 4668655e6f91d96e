// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "sqlite.rs"]
pub mod sqlite;

#[path = "trust/mod.rs"]
pub mod trust;

#[path = "queue/mod.rs"]
pub mod queue;

#[path = "content/mod.rs"]
pub mod content;

#[path = "cache/mod.rs"]
pub mod cache;
