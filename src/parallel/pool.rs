//! Fixed-size worker pool behind a [`TaskLimiter`]
//!
//! A stage submits one task per input item. Submission blocks while the
//! limiter is full. `finish` closes the job queue and joins every worker; each
//! worker owns a clone of the stage's output sender, so the output queue is
//! closed exactly when the last worker has delivered its last result.

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::limiter::{Permit, TaskLimiter};
use crate::error::ConntopError;

pub struct StagePool<I: Send + 'static> {
    stage: &'static str,
    limiter: TaskLimiter,
    jobs: Option<Sender<(I, Permit)>>,
    /// Disconnects once every worker has exited.
    workers_alive: Receiver<()>,
    workers: Vec<JoinHandle<Result<()>>>,
}

impl<I: Send + 'static> StagePool<I> {
    /// Start `size` workers that apply `handler` to each item and send the
    /// result to `output`.
    pub fn spawn<O, F>(
        stage: &'static str,
        size: usize,
        output: Sender<O>,
        handler: F,
    ) -> Result<Self>
    where
        O: Send + 'static,
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        let size = size.max(1);
        let limiter = TaskLimiter::new(size);
        // outstanding tasks never exceed the limiter capacity, so neither does this queue
        let (jobs, job_receiver) = bounded::<(I, Permit)>(size);
        let (alive_tx, workers_alive) = bounded::<()>(0);
        let handler = Arc::new(handler);

        let mut workers = Vec::with_capacity(size);
        for worker_id in 0..size {
            let job_receiver = job_receiver.clone();
            let output = output.clone();
            let handler = Arc::clone(&handler);
            let alive = alive_tx.clone();

            let handle = thread::Builder::new()
                .name(format!("conntop-{}-{}", stage, worker_id))
                .spawn(move || {
                    let _alive = alive;
                    worker_loop(stage, job_receiver, output, handler)
                })?;
            workers.push(handle);
        }
        debug!("{} pool started with {} workers", stage, size);

        Ok(Self {
            stage,
            limiter,
            jobs: Some(jobs),
            workers_alive,
            workers,
        })
    }

    /// Admit one item, blocking while the pool is at capacity.
    pub fn submit(&self, item: I) -> Result<()> {
        let disconnected = ConntopError::StageDisconnected { stage: self.stage };

        let permit = self
            .limiter
            .acquire_or_abort(&self.workers_alive)
            .ok_or(ConntopError::StagePanicked { stage: self.stage })?;

        let jobs = self.jobs.as_ref().ok_or(disconnected)?;
        jobs.send((item, permit))
            .map_err(|_| ConntopError::StagePanicked { stage: self.stage })?;
        Ok(())
    }

    /// Tasks admitted but not yet completed.
    pub fn outstanding(&self) -> usize {
        self.limiter.outstanding()
    }

    /// Wait until every admitted task has delivered its result and released
    /// its slot, then let the output queue close.
    pub fn finish(mut self) -> Result<()> {
        drop(self.jobs.take());

        let mut first_error = None;
        for handle in self.workers.drain(..) {
            let outcome = handle
                .join()
                .unwrap_or_else(|_| Err(ConntopError::StagePanicked { stage: self.stage }.into()));
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        debug!("{} pool drained", self.stage);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn worker_loop<I, O, F>(
    stage: &'static str,
    jobs: Receiver<(I, Permit)>,
    output: Sender<O>,
    handler: Arc<F>,
) -> Result<()>
where
    F: Fn(I) -> O,
{
    for (item, permit) in jobs.iter() {
        let result = handler(item);
        output
            .send(result)
            .map_err(|_| ConntopError::StageDisconnected { stage })?;
        // released only after the result is in the output queue
        drop(permit);
    }
    Ok(())
}
