//! Mutation Queue
//!
//! Every state change (player actions, timer firings, admin commands) is sent
//! to one worker task that applies them strictly in arrival order. A mutation
//! may await slow oracle calls; nothing else runs until it settles.
//!
//! A failing mutation is logged and dropped. A panicking one is caught and
//! logged too, and the worker moves on to the next.

use std::fmt;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::AppError;

/// Owner of the state the queue serializes access to.
#[async_trait]
pub trait Mutator: Send + 'static {
    /// Queued work item.
    type Mutation: Send + 'static;

    /// Apply one mutation.
    async fn apply(&mut self, mutation: Self::Mutation) -> Result<(), AppError>;

    /// Short label for logs.
    fn label(_mutation: &Self::Mutation) -> &'static str {
        "mutation"
    }
}

/// Handle for enqueueing mutations.
pub struct MutationQueue<M> {
    tx: mpsc::UnboundedSender<M>,
}

impl<M> Clone for MutationQueue<M> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<M> fmt::Debug for MutationQueue<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationQueue")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<M: Send + 'static> MutationQueue<M> {
    /// Spawn the worker that owns `mutator`.
    ///
    /// The worker runs until every handle is dropped and the backlog is
    /// drained, then hands the mutator back through the join handle.
    pub fn spawn<S>(mutator: S) -> (Self, JoinHandle<S>)
    where
        S: Mutator<Mutation = M>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(mutator, rx));
        (Self { tx }, worker)
    }

    /// Channel pair for a mutator that needs to enqueue its own follow-ups.
    ///
    /// The mutator should keep only a weak sender so it cannot keep its own
    /// worker alive; start the worker with [`MutationQueue::start`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Start the worker on a receiver from [`MutationQueue::channel`].
    pub fn start<S>(mutator: S, rx: mpsc::UnboundedReceiver<M>) -> JoinHandle<S>
    where
        S: Mutator<Mutation = M>,
    {
        tokio::spawn(run_worker(mutator, rx))
    }

    /// Append a mutation. Returns `false` if the worker is gone.
    pub fn enqueue(&self, mutation: M) -> bool {
        self.tx.send(mutation).is_ok()
    }

    /// Weak sender for timers and background fetches.
    pub fn downgrade(&self) -> mpsc::WeakUnboundedSender<M> {
        self.tx.downgrade()
    }
}

async fn run_worker<S: Mutator>(mut mutator: S, mut rx: mpsc::UnboundedReceiver<S::Mutation>) -> S {
    while let Some(mutation) = rx.recv().await {
        let label = S::label(&mutation);
        debug!(label, "applying mutation");
        match AssertUnwindSafe(mutator.apply(mutation)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(label, error = %e, "mutation failed"),
            Err(panic) => error!(label, panic = panic_message(&panic), "mutation panicked"),
        }
    }
    debug!("mutation queue closed");
    mutator
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug)]
    enum Op {
        /// Read, sleep, then write back `value + delta`. Interleaving loses updates.
        Add(i64, u64),
        Fail,
        Panic,
    }

    #[derive(Default)]
    struct Counter {
        value: i64,
        log: Vec<i64>,
    }

    #[async_trait]
    impl Mutator for Counter {
        type Mutation = Op;

        async fn apply(&mut self, mutation: Op) -> Result<(), AppError> {
            match mutation {
                Op::Add(delta, delay_ms) => {
                    let seen = self.value;
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    self.value = seen + delta;
                    self.log.push(delta);
                    Ok(())
                }
                Op::Fail => Err(AppError::domain("nope")),
                Op::Panic => panic!("boom"),
            }
        }
    }

    #[tokio::test]
    async fn test_fifo_without_interleaving() {
        let (queue, worker) = MutationQueue::spawn(Counter::default());
        // Slow first, fast second: a concurrent executor would finish them
        // out of order and drop one of the writes.
        assert!(queue.enqueue(Op::Add(1, 30)));
        assert!(queue.enqueue(Op::Add(10, 0)));
        assert!(queue.enqueue(Op::Add(100, 10)));
        drop(queue);

        let counter = worker.await.unwrap();
        assert_eq!(counter.value, 111);
        assert_eq!(counter.log, vec![1, 10, 100]);
    }

    #[tokio::test]
    async fn test_errors_and_panics_do_not_stall() {
        let (queue, worker) = MutationQueue::spawn(Counter::default());
        queue.enqueue(Op::Fail);
        queue.enqueue(Op::Panic);
        queue.enqueue(Op::Add(5, 0));
        drop(queue);

        let counter = worker.await.unwrap();
        assert_eq!(counter.value, 5);
    }

    #[tokio::test]
    async fn test_weak_sender_does_not_keep_worker_alive() {
        let (queue, rx) = MutationQueue::<Op>::channel();
        let weak = queue.downgrade();
        let worker = MutationQueue::start(Counter::default(), rx);

        weak.upgrade().unwrap().send(Op::Add(2, 0)).unwrap();
        drop(queue);

        let counter = worker.await.unwrap();
        assert_eq!(counter.value, 2);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_panic_message() {
        let panic: Box<dyn std::any::Any + Send> = Box::new(String::from("bad"));
        assert_eq!(panic_message(&panic), "bad");
        let panic: Box<dyn std::any::Any + Send> = Box::new(3u8);
        assert_eq!(panic_message(&panic), "unknown panic");
    }
}
