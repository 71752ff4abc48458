//! Work queues and stage signals
//!
//! A [`WorkQueue`] counts an item as outstanding from `push` until the
//! [`CompletionToken`] of its lease is dropped. Barriers wait on that count,
//! so an item that was dequeued but is still being worked on keeps the queue
//! from reporting drained.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

/// Unbounded FIFO shared by producers and consumers of one stage
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    name: &'static str,
    items: Mutex<VecDeque<T>>,
    available: Semaphore,
    outstanding: Arc<watch::Sender<usize>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl<T> WorkQueue<T> {
    pub fn new(name: &'static str) -> Self {
        let (outstanding, _) = watch::channel(0usize);
        Self {
            inner: Arc::new(Inner {
                name,
                items: Mutex::new(VecDeque::new()),
                available: Semaphore::new(0),
                outstanding: Arc::new(outstanding),
            }),
        }
    }

    pub fn push(&self, item: T) {
        // counted before it becomes visible to consumers
        self.inner.outstanding.send_modify(|n| *n += 1);
        self.lock().push_back(item);
        self.inner.available.add_permits(1);
    }

    /// Take the next item if one is waiting.
    pub fn try_pop(&self) -> Option<Lease<T>> {
        let permit = self.inner.available.try_acquire().ok()?;
        permit.forget();
        self.take()
    }

    /// Wait up to `timeout` for the next item.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Lease<T>> {
        let permit = tokio::time::timeout(timeout, self.inner.available.acquire())
            .await
            .ok()?
            .ok()?;
        permit.forget();
        self.take()
    }

    // items waiting to be dequeued
    fn len(&self) -> usize {
        self.lock().len()
    }

    /// Items pushed whose lease has not been released yet, waiting or in work.
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.borrow()
    }

    /// Resolve once `outstanding() < limit`.
    pub async fn wait_below(&self, limit: usize) {
        let mut rx = self.inner.outstanding.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|n| *n < limit).await;
    }

    /// Resolve once every pushed item has been dequeued and released.
    pub async fn wait_drained(&self) {
        self.wait_below(1).await;
    }

    fn take(&self) -> Option<Lease<T>> {
        let item = self.lock().pop_front()?;
        Some(Lease {
            item,
            token: CompletionToken {
                outstanding: Arc::clone(&self.inner.outstanding),
            },
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.inner.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A dequeued item together with its completion token
#[derive(Debug)]
pub struct Lease<T> {
    item: T,
    token: CompletionToken,
}

impl<T> Lease<T> {
    /// Split into the owned item and the token that marks it processed.
    pub fn into_parts(self) -> (T, CompletionToken) {
        (self.item, self.token)
    }
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

/// Marks one dequeued item processed when dropped
#[must_use = "dropping the token marks the item processed"]
pub struct CompletionToken {
    outstanding: Arc<watch::Sender<usize>>,
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionToken")
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// One-shot latch telling workers that an upstream stage has finished
#[derive(Clone)]
pub struct StageSignal {
    name: &'static str,
    tx: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for StageSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSignal")
            .field("name", &self.name)
            .field("set", &self.is_set())
            .finish()
    }
}

impl StageSignal {
    pub fn new(name: &'static str) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            name,
            tx: Arc::new(tx),
        }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|set| *set).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::new("test");
        for i in 0..3 {
            queue.push(i);
        }
        let got: Vec<i32> = (0..3).map(|_| *queue.try_pop().unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2]);
        assert!(queue.try_pop().is_none());
    }

    #[tokio::test]
    async fn test_outstanding_until_token_dropped() {
        let queue = WorkQueue::new("test");
        queue.push("a");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.outstanding(), 1);

        let lease = queue.try_pop().unwrap();
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.outstanding(), 1);

        let (item, token) = lease.into_parts();
        assert_eq!(item, "a");
        assert_eq!(queue.outstanding(), 1);
        drop(token);
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_timeout_expires_on_empty_queue() {
        let queue: WorkQueue<u8> = WorkQueue::new("test");
        let start = tokio::time::Instant::now();
        assert!(queue.pop_timeout(Duration::from_secs(5)).await.is_none());
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_timeout_wakes_on_push() {
        let queue = WorkQueue::new("test");
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            producer.push(7u8);
        });
        let lease = queue.pop_timeout(Duration::from_secs(10)).await.unwrap();
        assert_eq!(*lease, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_drained_waits_for_in_flight_item() {
        let queue = WorkQueue::new("test");
        queue.push(1u8);
        let lease = queue.try_pop().unwrap();

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_drained().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        drop(lease);
        waiter.await.unwrap();
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_wait_below_returns_immediately_under_limit() {
        let queue = WorkQueue::new("test");
        queue.push(());
        queue.wait_below(2).await;
        drop(queue.try_pop());
        queue.wait_drained().await;
    }

    #[tokio::test]
    async fn test_item_leased_once_across_consumers() {
        let queue = WorkQueue::new("test");
        for i in 0..100u32 {
            queue.push(i);
        }
        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(lease) = queue.pop_timeout(Duration::from_millis(10)).await {
                    seen.push(*lease);
                }
                seen
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_stage_signal() {
        let signal = StageSignal::new("done");
        assert!(!signal.is_set());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        signal.set();
        waiter.await.unwrap();
        assert!(signal.is_set());
        // already set: returns at once
        signal.wait().await;
    }
}
