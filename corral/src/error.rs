//! Construction errors shared by the pools.

/// Rejected pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("resource pool capacity must be at least 1")]
    ZeroCapacity,
    #[error("worker pool needs at least 1 worker")]
    ZeroWorkers,
}
