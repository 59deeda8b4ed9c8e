//! Bounded concurrency for pipeline stages.
//!
//! Every fan-out in the pipeline (research per chapter, heavy and light
//! material pools) goes through [`run_bounded`], which caps the number of
//! in-flight units and turns each unit's failure into a [`Settled::Rejected`]
//! value instead of an early return.

pub mod pool;

pub use pool::{run_bounded, PoolError, Settled, Task};
