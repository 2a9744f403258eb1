//! Cancellable scheduled work shared by the debouncer and the pager.
//!
//! A [`TaskScope`] is the arena a screen hands to every unit it owns. Units
//! schedule delayed callbacks through the scope and keep the returned
//! [`ScheduledTask`] so they can cancel superseded work. Tearing the screen
//! down calls [`TaskScope::shutdown`], which revokes the scope's
//! [`Liveness`] and aborts every task it spawned.
//!
//! Completion callbacks never run once the scope is shut down, even if the
//! abort races with a timer that already elapsed: the liveness flag is checked
//! after the delay, before the callback is invoked.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Shared "owner still active" flag.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the owner as torn down. Returns `true` on the first call.
    pub fn revoke(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one task spawned through a [`TaskScope`].
#[derive(Debug)]
pub struct ScheduledTask {
    id: u64,
    handle: tokio::task::AbortHandle,
}

impl ScheduledTask {
    /// Scope-unique task id, useful for log correlation.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Abort the task. Harmless if it already completed.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

struct ScopeInner {
    name: String,
    runtime: Handle,
    liveness: Liveness,
    next_id: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    hooks: Mutex<Vec<ShutdownHook>>,
}

type ShutdownHook = Box<dyn FnOnce() + Send>;

/// Arena of tasks owned by one screen.
///
/// Cloning a scope yields another handle to the same arena.
#[derive(Clone)]
pub struct TaskScope {
    inner: Arc<ScopeInner>,
}

impl std::fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScope")
            .field("name", &self.inner.name)
            .field("alive", &self.is_alive())
            .field("live_tasks", &self.live_tasks())
            .finish()
    }
}

impl TaskScope {
    /// Create a scope bound to the current tokio runtime.
    ///
    /// Fails with [`Error::Runtime`] when called outside a runtime.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|err| Error::Runtime(format!("task scope requires a tokio runtime: {err}")))?;
        Ok(Self {
            inner: Arc::new(ScopeInner {
                name: name.into(),
                runtime,
                liveness: Liveness::new(),
                next_id: AtomicU64::new(1),
                tasks: Mutex::new(Vec::new()),
                hooks: Mutex::new(Vec::new()),
            }),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.liveness.is_alive()
    }

    /// The scope's liveness flag, for callbacks that outlive a borrow of the scope.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.inner.liveness.clone()
    }

    /// Number of spawned tasks that have not finished yet.
    #[must_use]
    pub fn live_tasks(&self) -> usize {
        let tasks = self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.iter().filter(|task| !task.is_finished()).count()
    }

    /// Run `callback` after `delay`, unless cancelled or the scope is shut down first.
    ///
    /// Returns `None` when the scope is already shut down.
    pub fn spawn_after<F>(&self, delay: Duration, callback: F) -> Option<ScheduledTask>
    where
        F: FnOnce() + Send + 'static,
    {
        let liveness = self.liveness();
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            if liveness.is_alive() {
                callback();
            }
        })
    }

    /// Run `future` under the scope.
    ///
    /// Returns `None` when the scope is already shut down.
    pub fn spawn<Fut>(&self, future: Fut) -> Option<ScheduledTask>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.is_alive() {
            tracing::trace!(scope = %self.inner.name, "Spawn refused on shut-down scope");
            return None;
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = self.inner.runtime.spawn(future);
        let task = ScheduledTask {
            id,
            handle: handle.abort_handle(),
        };

        let mut tasks = self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
        Some(task)
    }

    /// Run `hook` once when the scope shuts down, after its tasks are aborted.
    ///
    /// Units use this to clear in-flight state their aborted tasks would
    /// otherwise have resolved. Runs immediately on a shut-down scope.
    pub fn on_shutdown<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            // Checked under the lock: shutdown revokes before draining.
            let mut hooks = self.inner.hooks.lock().unwrap_or_else(|e| e.into_inner());
            if self.is_alive() {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Revoke liveness, abort every task spawned through this scope and run
    /// the shutdown hooks.
    ///
    /// Idempotent; returns the number of tasks aborted by this call.
    pub fn shutdown(&self) -> usize {
        let first = self.inner.liveness.revoke();
        let drained: Vec<JoinHandle<()>> = {
            let mut tasks = self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        let aborted = drained.iter().filter(|task| !task.is_finished()).count();
        for task in &drained {
            task.abort();
        }
        let hooks: Vec<ShutdownHook> = {
            let mut hooks = self.inner.hooks.lock().unwrap_or_else(|e| e.into_inner());
            hooks.drain(..).collect()
        };
        for hook in hooks {
            hook();
        }
        if first {
            tracing::debug!(scope = %self.inner.name, aborted, "Task scope shut down");
        }
        aborted
    }
}
