//! Lease - a resource that returns itself to its pool on drop.

use std::fmt;
use std::ops::{Deref, DerefMut};

use super::{Resource, ResourcePool};

/// A resource borrowed from a [`ResourcePool`].
///
/// On drop: the resource is released back to the pool, which stores it or
/// disposes it (pool closed or idle store full).
pub struct Lease<'a, R: Resource, E> {
    /// Only `None` once `detach` or `drop` has taken it.
    resource: Option<R>,
    pool: &'a ResourcePool<R, E>,
}

impl<'a, R: Resource, E> Lease<'a, R, E> {
    pub(crate) fn new(resource: R, pool: &'a ResourcePool<R, E>) -> Self {
        Self {
            resource: Some(resource),
            pool,
        }
    }

    /// Take the resource out of the lease without returning it to the pool.
    pub fn detach(mut self) -> R {
        match self.resource.take() {
            Some(resource) => resource,
            None => unreachable!("lease already emptied"),
        }
    }
}

impl<R: Resource, E> Deref for Lease<'_, R, E> {
    type Target = R;

    fn deref(&self) -> &R {
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("lease already emptied"),
        }
    }
}

impl<R: Resource, E> DerefMut for Lease<'_, R, E> {
    fn deref_mut(&mut self) -> &mut R {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("lease already emptied"),
        }
    }
}

impl<R: Resource + fmt::Debug, E> fmt::Debug for Lease<'_, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&self.resource).finish()
    }
}

impl<R: Resource, E> Drop for Lease<'_, R, E> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.release(resource);
        }
    }
}
