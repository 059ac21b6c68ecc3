use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver};

use crate::error::{LoaderError, Result};
use crate::scheduler::{Sample, SampleScheduler, SchedulerStats};

/// Runs a [`SampleScheduler`] on a worker thread, buffering up to `depth` samples ahead of
/// the consumer.
///
/// Dropping the prefetcher disconnects the channel; the worker notices on its next send and
/// drops the scheduler, which releases every open decoder.
pub struct Prefetcher {
    rx: Option<Receiver<Sample>>,
    worker: Option<JoinHandle<SchedulerStats>>,
}

impl Prefetcher {
    pub fn spawn(mut scheduler: SampleScheduler, depth: usize) -> Result<Self> {
        let (tx, rx) = channel::bounded(depth.max(1));
        let worker = thread::Builder::new()
            .name("clip-loader-prefetch".to_string())
            .spawn(move || {
                while let Some(sample) = scheduler.next_sample() {
                    if tx.send(sample).is_err() {
                        tracing::debug!("prefetch consumer hung up");
                        break;
                    }
                }
                scheduler.stats()
            })?;
        Ok(Self {
            rx: Some(rx),
            worker: Some(worker),
        })
    }

    /// Stops the worker and returns the scheduler's final counters.
    pub fn finish(mut self) -> Result<SchedulerStats> {
        self.rx.take();
        self.join()
    }

    fn join(&mut self) -> Result<SchedulerStats> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| LoaderError::Thread("prefetch worker panicked".to_string())),
            None => Ok(SchedulerStats::default()),
        }
    }
}

impl Iterator for Prefetcher {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.rx.take();
        if let Err(err) = self.join() {
            tracing::warn!(error = %err, "prefetch worker did not shut down cleanly");
        }
    }
}
