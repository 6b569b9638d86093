use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{Arc, mpsc},
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracker_common::internal;

use crate::{
    error::{QueueError, TaskError},
    handler::MessageHandler,
};

type Slot = Arc<Mutex<Option<Result<(), TaskError>>>>;

struct Job {
    path: PathBuf,
    log_failure: bool,
    slot: Slot,
}

/// The eventual result of a submitted message.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    slot: Slot,
}

impl TaskHandle {
    /// The result, once the task finished. Never blocks, and yields the
    /// result only once.
    pub fn poll(&self) -> Option<Result<(), TaskError>> {
        self.slot.lock().take()
    }
}

struct Shared {
    jobs: Mutex<mpsc::Receiver<Job>>,
    handler: Arc<dyn MessageHandler>,
    completed: Arc<Notify>,
    max_tasks: usize,
    /// One slot per worker. A replacement thread takes over its
    /// predecessor's slot, detaching the exiting thread.
    threads: Mutex<Vec<Option<JoinHandle<()>>>>,
}

/// A fixed number of worker threads running a [`MessageHandler`].
///
/// A worker that served `max_tasks` messages is replaced by a fresh thread.
/// Every completion wakes whoever waits on the `completed` notifier.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("open", &self.sender.is_some())
            .field("max_tasks", &self.shared.max_tasks)
            .field("threads", &self.threads())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// # Errors
    /// If a worker thread cannot be spawned.
    pub fn new(
        workers: usize,
        max_tasks: usize,
        handler: Arc<dyn MessageHandler>,
        completed: Arc<Notify>,
    ) -> Result<Self, QueueError> {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(Shared {
            jobs: Mutex::new(receiver),
            handler,
            completed,
            max_tasks: max_tasks.max(1),
            threads: Mutex::new((0..workers.max(1)).map(|_| None).collect()),
        });

        for index in 0..workers.max(1) {
            spawn_worker(&shared, index)?;
        }

        internal!(level = DEBUG, "Started {workers} queue workers");

        Ok(Self {
            sender: Some(sender),
            shared,
        })
    }

    /// Queue `path` for processing.
    ///
    /// # Errors
    /// If the pool was closed.
    pub fn submit(&self, path: PathBuf, log_failure: bool) -> Result<TaskHandle, QueueError> {
        let slot = Slot::default();
        let job = Job {
            path,
            log_failure,
            slot: slot.clone(),
        };

        self.sender
            .as_ref()
            .ok_or(QueueError::PoolClosed)?
            .send(job)
            .map_err(|_| QueueError::PoolClosed)?;

        Ok(TaskHandle { slot })
    }

    /// Number of worker threads currently held by the pool.
    pub fn threads(&self) -> usize {
        self.shared.threads.lock().iter().flatten().count()
    }

    /// Stop accepting work. Queued messages are still processed.
    pub fn close(&mut self) {
        self.sender = None;
    }

    /// Close the pool and wait for every worker to finish.
    pub fn join(mut self) {
        self.close();

        let workers = self.shared.threads.lock().len();
        for index in 0..workers {
            // A worker replaced while draining leaves its successor in the slot.
            loop {
                let thread = self.shared.threads.lock()[index].take();
                let Some(thread) = thread else {
                    break;
                };
                if thread.join().is_err() {
                    internal!(level = ERROR, "A queue worker thread panicked");
                }
            }
        }

        internal!(level = DEBUG, "Queue workers drained");
    }
}

fn spawn_worker(shared: &Arc<Shared>, index: usize) -> Result<(), QueueError> {
    let worker = Arc::clone(shared);
    // Held across the spawn so a quickly recycled successor cannot store its
    // handle before this one.
    let mut threads = shared.threads.lock();
    let thread = thread::Builder::new()
        .name(format!("tracker-worker-{index}"))
        .spawn(move || work(&worker, index))?;

    if let Some(slot) = threads.get_mut(index) {
        *slot = Some(thread);
    }
    Ok(())
}

fn work(shared: &Arc<Shared>, index: usize) {
    for _ in 0..shared.max_tasks {
        // The receiver lock is only held while waiting for the next job.
        let job = shared.jobs.lock().recv();
        let Ok(job) = job else {
            return;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            shared.handler.handle(&job.path, job.log_failure)
        }))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))));

        *job.slot.lock() = Some(result);
        shared.completed.notify_one();
    }

    internal!(level = TRACE, "Worker served {} tasks, replacing it", shared.max_tasks);
    if let Err(e) = spawn_worker(shared, index) {
        internal!(level = ERROR, "Unable to replace queue worker: {e}");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
