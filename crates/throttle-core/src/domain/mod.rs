//! Domain model (task outcomes).

pub mod outcome;

pub use outcome::TaskOutcome;
