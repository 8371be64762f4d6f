//! Dedicated thread that owns an [`Orchestrator`] and runs submitted jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::image::{Image, ImageSource};

use super::orchestrator::Orchestrator;
use super::progress::{progress_channel, CancellationToken, ProgressReceiver, ProgressSender};

type BoxedSource = Box<dyn ImageSource + Send>;

struct Job {
    content: BoxedSource,
    style: BoxedSource,
    blend_ratio: f32,
    progress: ProgressSender,
    cancel: CancellationToken,
    reply: Sender<Result<Image>>,
}

/// Runs style transfer jobs one at a time on a background thread.
///
/// Submitting while a job is in flight fails with [`Error::Busy`]; jobs are
/// never queued behind each other.
pub struct Worker {
    jobs: Option<Sender<Job>>,
    status: Arc<Status>,
    thread: Option<JoinHandle<()>>,
}

/// Flags shared between a [`Worker`] and its thread.
#[derive(Default)]
struct Status {
    in_flight: AtomicBool,
    stopped: AtomicBool,
}

/// Ends the job in flight on the worker thread, also when the job unwinds.
struct InFlight<'a>(&'a Status);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            // published before the flag is cleared so `submit` cannot slip a job in
            self.0.stopped.store(true, Ordering::Release);
        }
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl Worker {
    /// Move `orchestrator` onto a new worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(orchestrator: Orchestrator) -> Result<Self> {
        let (jobs, queue) = crossbeam_channel::unbounded::<Job>();
        let status = Arc::new(Status::default());
        let shared = Arc::clone(&status);

        let thread = std::thread::Builder::new()
            .name("tilestyle-worker".to_string())
            .spawn(move || {
                run_jobs(&orchestrator, &queue, &shared);
                orchestrator.shutdown();
            })
            .map(Some)?;

        Ok(Self {
            jobs: Some(jobs),
            status,
            thread,
        })
    }

    /// Whether a submitted job has not finished yet.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.status.in_flight.load(Ordering::Acquire)
    }

    /// Whether the worker thread died while running a job.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.status.stopped.load(Ordering::Acquire)
    }

    /// Submit a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the previous job has not finished and
    /// [`Error::WorkerStopped`] if the worker thread is gone.
    pub fn submit(
        &self,
        content: impl ImageSource + Send + 'static,
        style: impl ImageSource + Send + 'static,
        blend_ratio: f32,
    ) -> Result<JobHandle> {
        let jobs = self.jobs.as_ref().ok_or(Error::WorkerStopped)?;

        self.status
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;

        if self.is_stopped() {
            self.status.in_flight.store(false, Ordering::Release);
            return Err(Error::WorkerStopped);
        }

        let (progress, progress_rx) = progress_channel();
        let (reply, result) = crossbeam_channel::bounded(1);
        let cancel = CancellationToken::new();

        let job = Job {
            content: Box::new(content),
            style: Box::new(style),
            blend_ratio,
            progress,
            cancel: cancel.clone(),
            reply,
        };

        if jobs.send(job).is_err() {
            self.status.in_flight.store(false, Ordering::Release);
            return Err(Error::WorkerStopped);
        }

        Ok(JobHandle {
            result,
            progress: progress_rx,
            cancel,
        })
    }

    /// Stop accepting jobs, wait for the thread, and release the operators.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        drop(self.jobs.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Pipeline worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs until every job sender is gone.
///
/// A panicking job unwinds the thread. Its reply sender is dropped, so the
/// waiter sees [`Error::WorkerStopped`], and later submissions fail the same way.
fn run_jobs(orchestrator: &Orchestrator, queue: &Receiver<Job>, status: &Status) {
    for job in queue {
        let in_flight = InFlight(status);
        let result = orchestrator.execute_cancellable(
            job.content.as_ref(),
            job.style.as_ref(),
            job.blend_ratio,
            Some(&job.progress),
            &job.cancel,
        );

        // cleared before replying so a waiter may resubmit immediately
        drop(in_flight);
        let _ = job.reply.send(result);
    }
    tracing::debug!("Pipeline worker exiting");
}

/// A submitted job.
pub struct JobHandle {
    result: Receiver<Result<Image>>,
    progress: ProgressReceiver,
    cancel: CancellationToken,
}

impl JobHandle {
    /// Progress events of this job.
    #[must_use]
    pub const fn progress(&self) -> &ProgressReceiver {
        &self.progress
    }

    /// Ask the job to stop after the tile in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the job finishes.
    ///
    /// # Errors
    ///
    /// Returns the job's error, or [`Error::WorkerStopped`] if the worker
    /// went away without replying.
    pub fn wait(self) -> Result<Image> {
        self.result.recv().map_err(|_| Error::WorkerStopped)?
    }
}
