//! Background job executor
//!
//! A fixed pool of worker threads fed through a crossbeam channel. Every
//! submission returns a [`JobHandle`] the caller blocks on with `wait()`.
//! Jobs run to completion once started; there is no cancellation.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};

use crate::context::StorageContext;
use crate::error::{Result, StoreError};
use crate::sstable::{Descriptor, SSTableReader};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of a background job; errors are shared between every waiter
pub type JobResult<T> = std::result::Result<T, Arc<StoreError>>;

/// Outcome of a rebuild job
pub type RebuildResult = JobResult<Arc<SSTableReader>>;

/// Completion slot shared by a running job and everyone waiting on it
struct JobSlot<T> {
    result: Mutex<Option<JobResult<T>>>,
    done: Condvar,
}

impl<T: Clone> JobSlot<T> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, result: JobResult<T>) {
        *self.result.lock() = Some(result);
        self.done.notify_all();
    }

    fn wait(&self) -> JobResult<T> {
        let mut guard = self.result.lock();
        loop {
            if let Some(result) = guard.as_ref() {
                return result.clone();
            }
            self.done.wait(&mut guard);
        }
    }

    fn is_finished(&self) -> bool {
        self.result.lock().is_some()
    }
}

/// Handle to a submitted job
pub struct JobHandle<T> {
    slot: Arc<JobSlot<T>>,
}

impl<T: Clone> JobHandle<T> {
    /// Block until the job finishes
    pub fn wait(&self) -> JobResult<T> {
        self.slot.wait()
    }

    pub fn is_finished(&self) -> bool {
        self.slot.is_finished()
    }
}

impl<T> Clone for JobHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

/// Handle to a submitted rebuild
pub type RebuildHandle = JobHandle<Arc<SSTableReader>>;

/// Worker pool running rebuilds (and other background jobs)
pub struct CompactionExecutor {
    ctx: Arc<StorageContext>,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    /// Rebuilds still running, keyed by generation
    in_flight: Arc<Mutex<HashMap<Descriptor, Arc<JobSlot<Arc<SSTableReader>>>>>>,
}

impl CompactionExecutor {
    /// Start `config.rebuild_threads` workers
    pub fn new(ctx: Arc<StorageContext>) -> Result<Self> {
        let threads = ctx.config().rebuild_threads.max(1);
        let (sender, receiver) = channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("rebuild-{}", i))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })?;
            workers.push(worker);
        }

        tracing::debug!("Started {} background workers", threads);

        Ok(Self {
            ctx,
            sender: Some(sender),
            workers,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Run `job` on a worker thread
    pub fn submit<T, F>(&self, job: F) -> JobHandle<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let slot = Arc::new(JobSlot::new());
        let job_slot = Arc::clone(&slot);
        if !self.dispatch(Box::new(move || job_slot.complete(run_guarded(job)))) {
            slot.complete(Err(shut_down()));
        }
        JobHandle { slot }
    }

    /// Rebuild the derived components of `descriptor` in the background.
    ///
    /// A submission for a generation whose rebuild is still running joins
    /// that rebuild instead of starting a second one.
    pub fn submit_rebuild(&self, descriptor: &Descriptor) -> RebuildHandle {
        let mut in_flight = self.in_flight.lock();
        if let Some(slot) = in_flight.get(descriptor) {
            tracing::debug!("Joining in-flight rebuild of {}", descriptor);
            return JobHandle {
                slot: Arc::clone(slot),
            };
        }

        let slot = Arc::new(JobSlot::new());
        in_flight.insert(descriptor.clone(), Arc::clone(&slot));
        drop(in_flight);

        let ctx = Arc::clone(&self.ctx);
        let registry = Arc::clone(&self.in_flight);
        let job_slot = Arc::clone(&slot);
        let target = descriptor.clone();

        let dispatched = self.dispatch(Box::new(move || {
            let result = run_guarded(|| SSTableReader::rebuild(&target, &ctx).map(Arc::new));
            registry.lock().remove(&target);
            job_slot.complete(result);
        }));
        if !dispatched {
            self.in_flight.lock().remove(descriptor);
            slot.complete(Err(shut_down()));
        }

        JobHandle { slot }
    }

    /// Number of rebuilds currently queued or running
    pub fn rebuilds_in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Queue a job; false if the workers are gone
    fn dispatch(&self, job: Job) -> bool {
        match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }
}

fn shut_down() -> Arc<StoreError> {
    Arc::new(StoreError::Rebuild("executor is shut down".to_string()))
}

/// Run a job, turning a panic into an error so waiters are always released
fn run_guarded<T, F>(job: F) -> JobResult<T>
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(result) => result.map_err(Arc::new),
        Err(_) => Err(Arc::new(StoreError::Rebuild("background job panicked".to_string()))),
    }
}

impl Drop for CompactionExecutor {
    /// Close the queue and let workers drain it
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("Background worker exited with a panic");
            }
        }
    }
}
