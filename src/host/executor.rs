//! Marshalling of work onto the host thread.
//!
//! The host application owns exactly one thread on which its state may be
//! touched. [`MainThreadExecutor`] is the cloneable submission side: any
//! task or thread may hand it a closure and await the outcome. [`MainLoop`]
//! is the single consumer, driven by the host either continuously
//! ([`MainLoop::run`]) or cooperatively once per frame ([`MainLoop::tick`]).
//!
//! At most one unit of work executes at any instant. There is no reentrancy
//! protection: work running on the host thread must not wait on another
//! marshalled call, or the host thread deadlocks on itself.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::rpc::dispatcher::panic_message;

/// A deferred unit of work queued for the host thread.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Name given to the host thread when spawned by [`MainThreadExecutor::spawn`].
pub const HOST_THREAD_NAME: &str = "host-main";

/// Errors surfaced to a submitter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The main loop has shut down; nothing will run the work.
    #[error("host main loop is not running")]
    Stopped,

    /// The work was dequeued but dropped before completing.
    #[error("host main loop dropped the work before completion")]
    Dropped,

    /// The work panicked on the host thread.
    #[error("work panicked on the host thread: {0}")]
    Panicked(String),
}

/// Submission handle for the host thread.
#[derive(Debug, Clone)]
pub struct MainThreadExecutor {
    sender: mpsc::Sender<Job>,
}

impl MainThreadExecutor {
    /// Creates an executor with a bounded queue and returns its main loop.
    ///
    /// The caller is responsible for driving the returned [`MainLoop`] on
    /// the host thread.
    #[must_use]
    pub fn new(queue_capacity: usize) -> (Self, MainLoop) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        (
            Self { sender },
            MainLoop {
                receiver,
                capacity: queue_capacity.max(1),
                executed: 0,
            },
        )
    }

    /// Creates an executor whose main loop runs on a dedicated thread.
    ///
    /// The thread exits once every executor clone has been dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(queue_capacity: usize) -> io::Result<(Self, JoinHandle<u64>)> {
        let (executor, main_loop) = Self::new(queue_capacity);
        let handle = thread::Builder::new()
            .name(HOST_THREAD_NAME.to_string())
            .spawn(move || main_loop.run())?;
        Ok((executor, handle))
    }

    /// Runs `work` on the host thread and returns its output.
    ///
    /// Waits for queue space if the queue is full, then waits for the host
    /// thread to execute the work. Neither wait blocks the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the main loop has stopped, or if the work panicked.
    pub async fn run<F, T>(&self, work: F) -> Result<T, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (slot, completion) = oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work))
                .map_err(|payload| ExecutorError::Panicked(panic_message(payload.as_ref())));
            // The submitter may have gone away; nothing to report to.
            let _ = slot.send(outcome);
        });

        self.sender
            .send(job)
            .await
            .map_err(|_| ExecutorError::Stopped)?;

        completion.await.map_err(|_| ExecutorError::Dropped)?
    }

    /// Returns `true` once the main loop has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Number of work units currently waiting in the queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

/// The single consumer of marshalled work.
#[derive(Debug)]
pub struct MainLoop {
    receiver: mpsc::Receiver<Job>,
    capacity: usize,
    executed: u64,
}

impl MainLoop {
    /// Runs every queued unit of work, without waiting for new work.
    ///
    /// At most one queue's worth of work runs per tick, so a steady stream
    /// of submissions cannot starve the host's own frame. Returns the number
    /// of units executed.
    pub fn tick(&mut self) -> usize {
        let mut ran = 0;
        while ran < self.capacity {
            let Ok(job) = self.receiver.try_recv() else {
                break;
            };
            job();
            ran += 1;
        }
        self.executed += ran as u64;
        ran
    }

    /// Runs work until every executor handle has been dropped.
    ///
    /// Blocks the calling thread; must not be called from within an async
    /// runtime. Returns the total number of units executed.
    #[must_use = "the executed count is the only record of how much work ran"]
    pub fn run(mut self) -> u64 {
        tracing::debug!("Host main loop started");
        while let Some(job) = self.receiver.blocking_recv() {
            job();
            self.executed += 1;
        }
        tracing::debug!(executed = self.executed, "Host main loop finished");
        self.executed
    }

    /// Total number of units executed so far.
    #[must_use]
    pub const fn executed(&self) -> u64 {
        self.executed
    }
}
