//! Ordered startup chain.
//!
//! # Responsibility
//! - Queue startup actions in FIFO order behind one completion future.
//! - Track progress so hosts can inspect where startup stands.
//!
//! # Invariants
//! - Step N starts only after step N-1 completed successfully.
//! - The first failure short-circuits every later step, including steps
//!   queued after the failure.
//! - Nothing runs until a completion future is polled.
//! - One driver runs steps at a time; a step interrupted by a dropped
//!   completion future is resumed, never restarted, by the next driver.

use crate::logging::summarize_panic_payload;
use crate::startup::error::{StartupError, StartupResult};
use crate::startup::listener::RootHandle;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::lock::Mutex as AsyncMutex;
use log::{debug, error};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Aggregate completion of every step queued so far.
pub type StartupFuture = Shared<BoxFuture<'static, StartupResult>>;

type Step = Box<dyn FnOnce() -> BoxFuture<'static, StartupResult> + Send>;

/// Observable position of a sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    /// Every queued step has completed.
    Resolved,
    /// Steps are queued and `step` (1-based) is the next to finish.
    Pending { step: usize, queued: usize },
    /// A step failed; nothing queued after it will run.
    Failed,
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<Step>,
    queued: usize,
    completed: usize,
    failure: Option<StartupError>,
}

struct Chain {
    queue: Mutex<Queue>,
    /// Step currently being driven. Held across awaits by the active driver.
    running: AsyncMutex<Option<BoxFuture<'static, StartupResult>>>,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            running: AsyncMutex::new(None),
        }
    }
}

impl Chain {
    /// Outcome for a completion covering the first `target` steps, once known.
    fn settled(&self, target: usize) -> Option<StartupResult> {
        let queue = self.queue.lock();
        match &queue.failure {
            Some(err) => Some(Err(err.clone())),
            None if queue.completed >= target => Some(Ok(())),
            None => None,
        }
    }

    fn next_step(&self) -> Option<Step> {
        self.queue.lock().pending.pop_front()
    }

    fn record(&self, outcome: StartupResult) {
        let dropped = {
            let mut queue = self.queue.lock();
            let step = queue.completed + 1;
            match outcome {
                Ok(()) => {
                    queue.completed = step;
                    debug!("event=startup_step module=startup status=ok step={}", step);
                    VecDeque::new()
                }
                Err(err) => {
                    error!(
                        "event=startup_step module=startup status=error step={} error={}",
                        step, err
                    );
                    queue.failure = Some(err);
                    mem::take(&mut queue.pending)
                }
            }
        };
        drop(dropped);
    }
}

/// Per-instance FIFO queue of startup actions.
#[derive(Default)]
pub struct StartupSequencer {
    chain: Arc<Chain>,
}

impl StartupSequencer {
    /// Creates an empty, already-resolved queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `action` and returns its 1-based step number.
    pub fn enqueue<F, Fut>(&mut self, root: RootHandle, action: F) -> usize
    where
        F: FnOnce(RootHandle) -> Fut + Send + 'static,
        Fut: Future<Output = StartupResult> + Send + 'static,
    {
        let mut queue = self.chain.queue.lock();
        queue.queued += 1;
        if queue.failure.is_none() {
            queue
                .pending
                .push_back(Box::new(move || run_step(action, root).boxed()));
        }
        queue.queued
    }

    /// Returns a future that completes once every step queued so far has
    /// run, or with the first failure.
    pub fn completion(&self) -> StartupFuture {
        let target = self.chain.queue.lock().queued;
        drive(Arc::clone(&self.chain), target).boxed().shared()
    }

    pub fn state(&self) -> StartupState {
        let queue = self.chain.queue.lock();
        if queue.failure.is_some() {
            StartupState::Failed
        } else if queue.completed == queue.queued {
            StartupState::Resolved
        } else {
            StartupState::Pending {
                step: queue.completed + 1,
                queued: queue.queued,
            }
        }
    }
}

async fn drive(chain: Arc<Chain>, target: usize) -> StartupResult {
    loop {
        if let Some(outcome) = chain.settled(target) {
            return outcome;
        }
        let mut running = chain.running.lock().await;
        if let Some(outcome) = chain.settled(target) {
            return outcome;
        }
        if running.is_none() {
            match chain.next_step() {
                Some(step) => {
                    debug!("event=startup_step module=startup status=start");
                    *running = Some(step());
                }
                None => return Ok(()),
            }
        }
        let outcome = match running.as_mut() {
            Some(step) => step.await,
            None => continue,
        };
        *running = None;
        chain.record(outcome);
    }
}

async fn run_step<F, Fut>(action: F, root: RootHandle) -> StartupResult
where
    F: FnOnce(RootHandle) -> Fut,
    Fut: Future<Output = StartupResult>,
{
    let pending = match panic::catch_unwind(AssertUnwindSafe(move || action(root))) {
        Ok(pending) => pending,
        Err(payload) => {
            return Err(StartupError::Panicked(summarize_panic_payload(
                payload.as_ref(),
            )))
        }
    };

    match AssertUnwindSafe(pending).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(StartupError::Panicked(summarize_panic_payload(
            payload.as_ref(),
        ))),
    }
}
