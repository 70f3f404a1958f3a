//! Bounded pool of reusable resources.
//!
//! Resources are created lazily by a caller-supplied factory and kept idle for
//! reuse up to the pool's capacity:
//! - `acquire` never waits: it reuses an idle resource or creates a new one
//! - `release` stores the resource, or disposes it when the idle store is full
//! - `close` disposes everything idle; later releases dispose immediately

mod lease;
mod pool;

pub use lease::Lease;
pub use pool::{PoolError, Resource, ResourcePool};
