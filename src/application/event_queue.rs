// Single-consumer ordered task queue serializing the pipeline's
// side-effecting steps
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct QueuedTask {
    name: String,
    future: BoxFuture<'static, anyhow::Result<()>>,
}

struct State {
    tasks: VecDeque<QueuedTask>,
    in_flight: bool,
    stopping: bool,
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("event queue state lock poisoned")
    }
}

/// Ordered in-process task queue with a single background consumer. Tasks
/// never run concurrently with each other; they execute in enqueue order,
/// except `insert_first` tasks, which run before anything already queued
/// but after whatever is currently executing. A failing task is logged and
/// never blocks the tasks behind it.
///
/// Shutdown waits for the in-flight task and then discards everything still
/// queued without running it: delivery is at-most-once by contract.
pub struct EventQueue {
    inner: Arc<Inner>,
    worker: Option<JoinHandle<()>>,
}

impl EventQueue {
    /// Spawns the consumer on the current tokio runtime.
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                tasks: VecDeque::new(),
                in_flight: false,
                stopping: false,
            }),
            notify: Notify::new(),
        });
        let worker = tokio::spawn(Self::drain(inner.clone()));
        Self {
            inner,
            worker: Some(worker),
        }
    }

    pub fn enqueue(&self, name: impl Into<String>, future: BoxFuture<'static, anyhow::Result<()>>) {
        self.push(name.into(), future, false);
    }

    /// Priority enqueue: the task runs before anything already queued.
    pub fn insert_first(
        &self,
        name: impl Into<String>,
        future: BoxFuture<'static, anyhow::Result<()>>,
    ) {
        self.push(name.into(), future, true);
    }

    fn push(&self, name: String, future: BoxFuture<'static, anyhow::Result<()>>, first: bool) {
        {
            let mut state = self.inner.lock();
            if state.stopping {
                tracing::debug!("event queue stopping; dropping task '{}'", name);
                return;
            }
            let task = QueuedTask { name, future };
            if first {
                state.tasks.push_front(task);
            } else {
                state.tasks.push_back(task);
            }
        }
        self.inner.notify.notify_one();
    }

    /// True when no task is queued or executing. Test/diagnostic aid.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        !state.in_flight && state.tasks.is_empty()
    }

    /// Stop the consumer: the in-flight task (if any) runs to completion,
    /// everything still queued is discarded unrun.
    pub async fn shutdown(mut self) {
        self.inner.lock().stopping = true;
        self.inner.notify.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    async fn drain(inner: Arc<Inner>) {
        loop {
            // Pop under the lock, execute outside it; no task ever runs
            // while the lock is held.
            let task = {
                let mut state = inner.lock();
                if state.stopping {
                    break;
                }
                let task = state.tasks.pop_front();
                state.in_flight = task.is_some();
                task
            };
            match task {
                Some(task) => {
                    tracing::debug!("event queue executing '{}'", task.name);
                    if let Err(error) = task.future.await {
                        tracing::warn!("event queue task '{}' failed: {:#}", task.name, error);
                    }
                    inner.lock().in_flight = false;
                }
                None => inner.notify.notified().await,
            }
        }
    }
}
