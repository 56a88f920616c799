//! Background task controller
//!
//! One worker thread per controller runs at most one `CancellableTask` at a
//! time. Submitting while a task is active is rejected, never queued.
//! Everything the task reports comes back as `TaskNotification`s on a
//! crossbeam channel, which the orchestrating side drains at its own pace.
//!
//! Every run ends with exactly one terminal event: `Done`, `Cancelled` or
//! `Error`. The controller is idle again before that event is sent, so a
//! caller reacting to it can submit the next task straight away.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::domain::{SigscopeError, SigscopeResult, SymbolBatch};
use crate::tasks::{CancelToken, CancellableTask, Step, TaskContext, TaskOutput};

/// Identifies one submitted run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub id: u64,
    pub name: String,
}

/// Events reported by a running task
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Progress { fraction: f32, status: String },
    /// A cancel request was accepted; a terminal event follows
    Cancelling,
    Symbols(SymbolBatch),
    Done(TaskOutput),
    Cancelled,
    Error(String),
}

impl TaskEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEvent::Done(_) | TaskEvent::Cancelled | TaskEvent::Error(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct TaskNotification {
    pub handle: TaskHandle,
    pub event: TaskEvent,
}

struct ActiveTask {
    handle: TaskHandle,
    cancel: CancelToken,
    cancelling: bool,
}

struct Job {
    handle: TaskHandle,
    task: Box<dyn CancellableTask>,
    cancel: CancelToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveTask>>>;

fn lock(slot: &ActiveSlot) -> MutexGuard<'_, Option<ActiveTask>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-task background controller
pub struct CancellableController {
    jobs: Option<Sender<Job>>,
    notifier: Sender<TaskNotification>,
    notifications: Receiver<TaskNotification>,
    active: ActiveSlot,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
}

impl CancellableController {
    /// Create a controller and start its worker thread
    pub fn new() -> Self {
        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        let (notifier, notifications) = unbounded();
        let active: ActiveSlot = Arc::new(Mutex::new(None));

        let worker = {
            let notifier = notifier.clone();
            let active = active.clone();
            thread::Builder::new()
                .name("sigscope-worker".into())
                .spawn(move || {
                    for job in jobs_rx.iter() {
                        run_job(job, &notifier, &active);
                    }
                })
                .ok()
        };

        if worker.is_none() {
            log::error!("Failed to spawn worker thread; every submission will fail");
        }

        Self {
            jobs: Some(jobs_tx),
            notifier,
            notifications,
            active,
            worker,
            next_id: 0,
        }
    }

    /// Receiver for task notifications. Clones share the same queue.
    pub fn notifications(&self) -> Receiver<TaskNotification> {
        self.notifications.clone()
    }

    /// Submit a task under `name`. Fails with `Busy` if a task is active.
    pub fn process(
        &mut self,
        name: &str,
        task: Box<dyn CancellableTask>,
    ) -> SigscopeResult<TaskHandle> {
        let mut active = lock(&self.active);
        if let Some(current) = active.as_ref() {
            log::warn!(
                "Rejected task '{name}': '{}' is still running",
                current.handle.name
            );
            return Err(SigscopeError::Busy);
        }

        let jobs = match (&self.jobs, &self.worker) {
            (Some(jobs), Some(_)) => jobs,
            _ => return Err(SigscopeError::Task("worker is not running".into())),
        };

        self.next_id += 1;
        let handle = TaskHandle {
            id: self.next_id,
            name: name.to_string(),
        };
        let cancel = CancelToken::new();

        let job = Job {
            handle: handle.clone(),
            task,
            cancel: cancel.clone(),
        };
        if jobs.send(job).is_err() {
            return Err(SigscopeError::Task("worker is not running".into()));
        }

        *active = Some(ActiveTask {
            handle: handle.clone(),
            cancel,
            cancelling: false,
        });
        log::debug!("Submitted task '{}' (#{})", handle.name, handle.id);
        Ok(handle)
    }

    /// Request cancellation of the active task. Returns false when idle or
    /// when a cancellation is already in flight.
    pub fn cancel(&self) -> bool {
        let mut active = lock(&self.active);
        match active.as_mut() {
            Some(current) if !current.cancelling => {
                current.cancelling = true;
                current.cancel.cancel();
                log::debug!("Cancelling task '{}'", current.handle.name);
                let _ = self.notifier.send(TaskNotification {
                    handle: current.handle.clone(),
                    event: TaskEvent::Cancelling,
                });
                true
            }
            _ => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Handle of the active task, if any
    pub fn current(&self) -> Option<TaskHandle> {
        lock(&self.active).as_ref().map(|a| a.handle.clone())
    }
}

impl Default for CancellableController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancellableController {
    fn drop(&mut self) {
        self.cancel();
        // Closing the job queue ends the worker loop
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
    }
}

/// Run one job to its terminal outcome on the worker thread
fn run_job(job: Job, notifier: &Sender<TaskNotification>, active: &ActiveSlot) {
    let Job {
        handle,
        mut task,
        cancel,
    } = job;

    let send = |event: TaskEvent| {
        let _ = notifier.send(TaskNotification {
            handle: handle.clone(),
            event,
        });
    };
    let on_symbols = |batch: SymbolBatch| send(TaskEvent::Symbols(batch));

    let mut last_progress = task.progress().clamp(0.0, 1.0);
    send(TaskEvent::Progress {
        fraction: last_progress,
        status: task.status(),
    });

    let outcome = loop {
        if cancel.is_cancelled() {
            break Step::Cancelled;
        }

        let ctx = TaskContext::new(&cancel, &on_symbols);
        let step = panic::catch_unwind(AssertUnwindSafe(|| task.work(&ctx)))
            .unwrap_or_else(|_| Step::Failed(SigscopeError::Task("task panicked".into())));

        match step {
            Step::Continue => {
                // Progress never goes backwards within a run
                last_progress = task.progress().clamp(0.0, 1.0).max(last_progress);
                send(TaskEvent::Progress {
                    fraction: last_progress,
                    status: task.status(),
                });
            }
            other => break other,
        }
    };

    // The task object dies here, before anyone hears about the outcome
    drop(task);

    let event = {
        let mut slot = lock(active);
        // Read under the lock cancel() takes: an accepted cancel always wins
        let cancelled = cancel.is_cancelled();
        *slot = None;
        match outcome {
            Step::Done(output) if !cancelled => TaskEvent::Done(output),
            Step::Failed(err) if !cancelled => TaskEvent::Error(err.to_string()),
            _ => TaskEvent::Cancelled,
        }
    };

    match &event {
        TaskEvent::Done(_) => log::info!("Task '{}' done", handle.name),
        TaskEvent::Error(msg) => log::error!("Task '{}' failed: {msg}", handle.name),
        _ => log::info!("Task '{}' cancelled", handle.name),
    }
    send(event);
}
