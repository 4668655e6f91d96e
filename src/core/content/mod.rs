// Forum content as seen by the moderation engine.
//
// The engine never owns posts or topics; it reads them through the
// `ContentSource` port and refers to them with `Subject`.

pub mod content_models;
pub mod content_source;

pub use content_models::*;
pub use content_source::*;
