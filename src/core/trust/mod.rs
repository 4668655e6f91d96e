// Trust levels - per-user engagement counters and the TL0..TL4 ladder.

pub mod trust_models;
pub mod trust_service;

pub use trust_models::*;
pub use trust_service::*;
