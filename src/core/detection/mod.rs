// Detection heuristics - spam scoring and near-duplicate search.
//
// Both are rule based. Results are cached by the moderation service under
// keys that embed each heuristic's rule version.

pub mod duplicate_detector;
pub mod spam_scorer;

pub use duplicate_detector::*;
pub use spam_scorer::*;
