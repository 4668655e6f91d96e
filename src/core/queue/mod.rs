// Review queue - queued moderation work, its state machine and ordering.

pub mod priority_scorer;
pub mod queue_models;
pub mod review_queue;

pub use priority_scorer::*;
pub use queue_models::*;
pub use review_queue::*;
