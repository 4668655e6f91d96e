// Core moderation module - orchestration of trust, detection and the queue.
// Following the same pattern as the other core modules: models, port, service.

pub mod moderation_cache;
pub mod moderation_models;
pub mod moderation_service;

pub use moderation_cache::*;
pub use moderation_models::*;
pub use moderation_service::*;
