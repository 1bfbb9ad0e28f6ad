//! Background jobs

pub mod invalidation;

pub use invalidation::InvalidationDispatcher;
