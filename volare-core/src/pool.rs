//! Scoped-lease pools for long-lived shared resources.
//!
//! Browser instances and residential proxies are leased per request with a
//! guard that returns the item on every exit path, including panic and
//! cancellation. Returned items go to the back of the queue, which doubles
//! as rotation for proxy leases.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::adapter::Deadline;
use crate::error::VolareError;

#[derive(Debug)]
struct PoolInner<T> {
    name: &'static str,
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

/// Fixed-size pool of leasable items.
#[derive(Debug)]
pub struct LeasePool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for LeasePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> LeasePool<T> {
    /// Build a pool over the given items. The pool never grows.
    #[must_use]
    pub fn new(name: &'static str, items: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name,
                items: Mutex::new(items.into_iter().collect()),
                notify: Notify::new(),
            }),
        }
    }

    /// Items currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.items.lock().expect("mutex poisoned").len()
    }

    /// Take an item without waiting.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Lease<T>> {
        let item = self.inner.items.lock().expect("mutex poisoned").pop_front();
        item.map(|item| Lease {
            item: Some(item),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Wait for an item until the deadline.
    ///
    /// # Errors
    /// `PoolExhausted` when nothing frees up in time.
    pub async fn acquire(&self, deadline: Deadline) -> Result<Lease<T>, VolareError> {
        loop {
            if let Some(lease) = self.try_acquire() {
                return Ok(lease);
            }
            let notified = self.inner.notify.notified();
            if let Some(lease) = self.try_acquire() {
                return Ok(lease);
            }
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Err(VolareError::PoolExhausted {
                    pool: self.inner.name,
                });
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    target = "volare::pool",
                    pool = self.inner.name,
                    "lease wait exhausted the deadline"
                );
                return Err(VolareError::PoolExhausted {
                    pool: self.inner.name,
                });
            }
        }
    }
}

/// Guard over one leased item. Dropping returns the item to the pool and
/// wakes one waiter.
#[derive(Debug)]
pub struct Lease<T> {
    item: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("lease not yet released")
    }
}

impl<T> DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("lease not yet released")
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool
                .items
                .lock()
                .expect("mutex poisoned")
                .push_back(item);
            self.pool.notify.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drop_returns_items_and_rotates() {
        let pool = LeasePool::new("proxy", ["a", "b"]);
        let first = pool.try_acquire().unwrap();
        assert_eq!(*first, "a");
        drop(first);
        // "a" went to the back, so the next lease sees "b".
        let second = pool.try_acquire().unwrap();
        assert_eq!(*second, "b");
    }

    #[tokio::test]
    async fn acquire_waits_for_a_release() {
        let pool = LeasePool::new("browser", [1u32]);
        let held = pool.try_acquire().unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.acquire(Deadline::after(Duration::from_secs(1)))
                    .await
                    .map(|lease| *lease)
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn acquire_times_out_when_empty() {
        let pool: LeasePool<u32> = LeasePool::new("browser", []);
        let err = pool
            .acquire(Deadline::after(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, VolareError::PoolExhausted { pool: "browser" }));
    }
}
