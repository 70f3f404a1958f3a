//! Resource pool implementation.
//!
//! The idle store is a bounded mpsc channel sized to the pool's capacity.
//! `release` and `close` serialize on one mutex guarding the open/closed state,
//! so a resource is never stored once drainage has begun. `acquire` only takes
//! from the channel and never touches that mutex.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use super::Lease;
use crate::error::ConfigError;
use crate::stats::PoolStats;

/// A handle managed by a [`ResourcePool`].
///
/// The pool disposes of a handle by calling [`Resource::close`] at most once.
pub trait Resource: Send + 'static {
    type Error: fmt::Display;

    fn close(self) -> Result<(), Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError<E> {
    #[error("pool has been closed")]
    Closed,
    #[error("failed to create resource: {0}")]
    Create(#[source] E),
}

impl<E> PoolError<E> {
    pub fn is_closed(&self) -> bool {
        matches!(self, PoolError::Closed)
    }
}

type Factory<R, E> = Box<dyn Fn() -> Result<R, E> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Open,
    Closed,
}

/// Pool of reusable resources shared between concurrent callers.
///
/// Capacity bounds the number of *idle* resources only. Callers beyond
/// capacity still get freshly created resources; the surplus is disposed when
/// it comes back and the idle store is full.
pub struct ResourcePool<R: Resource, E> {
    capacity: usize,
    state: Mutex<PoolState>,
    /// Mirrors `state` for the lock-free check in `acquire`.
    closed: AtomicBool,
    idle_tx: mpsc::Sender<R>,
    idle_rx: Mutex<mpsc::Receiver<R>>,
    created: AtomicU64,
    disposed: AtomicU64,
    factory: Factory<R, E>,
}

impl<R: Resource, E> ResourcePool<R, E> {
    pub fn new<F>(capacity: usize, factory: F) -> Result<Self, ConfigError>
    where
        F: Fn() -> Result<R, E> + Send + Sync + 'static,
    {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let (idle_tx, idle_rx) = mpsc::channel(capacity);
        tracing::debug!(capacity, "Resource pool created");

        Ok(Self {
            capacity,
            state: Mutex::new(PoolState::Open),
            closed: AtomicBool::new(false),
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
            created: AtomicU64::new(0),
            disposed: AtomicU64::new(0),
            factory: Box::new(factory),
        })
    }

    /// Take an idle resource, or create one if none is idle.
    ///
    /// Never waits. Factory errors are returned unmodified as
    /// [`PoolError::Create`] and are not retried.
    pub fn acquire(&self) -> Result<R, PoolError<E>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let next = lock(&self.idle_rx).try_recv();
        match next {
            Ok(resource) => {
                tracing::debug!("Acquire: reusing idle resource");
                Ok(resource)
            }
            Err(TryRecvError::Disconnected) => Err(PoolError::Closed),
            // Close may have drained the store since the check above.
            Err(TryRecvError::Empty) if self.is_closed() => Err(PoolError::Closed),
            Err(TryRecvError::Empty) => {
                tracing::debug!("Acquire: creating new resource");
                let resource = (self.factory)().map_err(PoolError::Create)?;
                self.created.fetch_add(1, Ordering::AcqRel);
                Ok(resource)
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but the resource goes back to the pool
    /// when the returned guard is dropped.
    pub fn lease(&self) -> Result<Lease<'_, R, E>, PoolError<E>> {
        self.acquire().map(|resource| Lease::new(resource, self))
    }

    /// Return a resource for reuse.
    ///
    /// Disposes it instead when the pool is closed or the idle store is full.
    pub fn release(&self, resource: R) {
        let state = lock(&self.state);

        if *state == PoolState::Closed {
            tracing::debug!("Release: pool closed, disposing");
            self.dispose(resource);
            return;
        }

        match self.idle_tx.try_send(resource) {
            Ok(()) => tracing::debug!("Release: stored idle"),
            Err(TrySendError::Full(resource)) | Err(TrySendError::Closed(resource)) => {
                tracing::debug!(capacity = self.capacity, "Release: idle store full, disposing");
                self.dispose(resource);
            }
        }
    }

    /// Close the pool and dispose every idle resource.
    ///
    /// Idempotent. After this, `acquire` fails with [`PoolError::Closed`] and
    /// `release` disposes whatever it is given.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        if *state == PoolState::Closed {
            return;
        }

        *state = PoolState::Closed;
        self.closed.store(true, Ordering::Release);

        let mut idle = lock(&self.idle_rx);
        idle.close();

        let mut drained = 0usize;
        while let Ok(resource) = idle.try_recv() {
            self.dispose(resource);
            drained += 1;
        }

        tracing::debug!(drained, "Resource pool closed");
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resources currently idle.
    pub fn idle(&self) -> usize {
        self.idle_tx.max_capacity() - self.idle_tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let created = self.created.load(Ordering::Acquire);
        let disposed = self.disposed.load(Ordering::Acquire);
        let idle = self.idle();

        PoolStats {
            capacity: self.capacity,
            idle,
            created,
            disposed,
            in_use: created.saturating_sub(disposed).saturating_sub(idle as u64),
            closed: self.is_closed(),
        }
    }

    fn dispose(&self, resource: R) {
        self.disposed.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = resource.close() {
            tracing::warn!(error = %e, "Failed to dispose resource");
        }
    }
}

impl<R: Resource, E> Drop for ResourcePool<R, E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<R: Resource, E> fmt::Debug for ResourcePool<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("capacity", &self.capacity)
            .field("idle", &self.idle())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
