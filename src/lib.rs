// Moderation review-queue engine for a discussion forum.
//
// - `core/` = Business logic (trust levels, detection heuristics, the review
//   queue and the service that ties them together)
// - `infra/` = Implementations of core traits (in-memory, SQLite, moka cache)

#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;
