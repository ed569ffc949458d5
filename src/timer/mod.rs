//! Timekeeping primitives: segment accumulation and mode policy

mod accumulator;
mod policy;

pub use accumulator::{whole_seconds_between, Accumulator};
pub use policy::{ModePolicy, TimeUpLatch};
