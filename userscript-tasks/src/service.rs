use crate::state::{TaskSnapshot, TaskState};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use userscript_core::{allocate_task_id, EngineError, Result, TaskId};

type Factory<P, D, R> = Box<dyn Fn(P, TaskSettler<D, R>) -> BoxFuture<'static, Result<D>> + Send + Sync>;
type Terminator<D> = Box<dyn Fn(D) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Settled results nobody has claimed yet are kept for the most recent
/// settlements only
pub(crate) const MAX_UNCLAIMED_RESULTS: usize = 256;

struct TaskRecord<D, R> {
    state: TaskState,
    data: Option<D>,
    sender: Option<oneshot::Sender<Result<R>>>,
}

struct Registry<D, R> {
    tasks: HashMap<TaskId, TaskRecord<D, R>>,
    /// Settlement receivers, kept until claimed by `wait_for_result`
    results: HashMap<TaskId, oneshot::Receiver<Result<R>>>,
    /// Settlement order, used to bound unclaimed `results`
    settled: VecDeque<TaskId>,
    /// Killed before the factory reported a handle
    killed_while_pending: HashSet<TaskId>,
}

impl<D, R> Registry<D, R> {
    /// Record that `task_id` settled, dropping the oldest unclaimed results
    /// beyond the retention limit
    fn retire(&mut self, task_id: &TaskId) {
        self.settled.push_back(task_id.clone());
        while self.settled.len() > MAX_UNCLAIMED_RESULTS {
            if let Some(oldest) = self.settled.pop_front() {
                if self.results.remove(&oldest).is_some() {
                    debug!(task_id = %oldest, "Dropping unclaimed task result");
                }
            }
        }
    }
}

struct Inner<P, D, R> {
    registry: Mutex<Registry<D, R>>,
    factory: Factory<P, D, R>,
    terminator: Terminator<D>,
}

impl<P, D, R> Inner<P, D, R> {
    fn registry(&self) -> MutexGuard<'_, Registry<D, R>> {
        // No code path panics while holding the lock
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove the task and deliver `outcome` to its waiter.
    ///
    /// Only the first settlement of a task takes effect. Aborted tasks are
    /// owned by `kill_task` and ignore settlement.
    fn settle(&self, task_id: &TaskId, outcome: Result<R>) -> bool {
        let sender = {
            let mut registry = self.registry();
            match registry.tasks.get(task_id).map(|record| record.state) {
                Some(state) if state.is_active() => {}
                Some(_) => {
                    debug!(%task_id, "Ignoring settlement of aborted task");
                    return false;
                }
                None => {
                    debug!(%task_id, "Ignoring settlement of unknown or settled task");
                    return false;
                }
            }
            let sender = registry.tasks.remove(task_id).and_then(|mut record| {
                record.state = TaskState::Done;
                record.sender.take()
            });
            registry.retire(task_id);
            sender
        };

        if let Some(sender) = sender {
            // The waiter may have gone away; the result is simply dropped then
            let _ = sender.send(outcome);
        }
        true
    }
}

/// Resolves or rejects one task of a [`TaskService`].
///
/// Settling consumes the settler. Dropping it unsettled rejects the task with
/// an internal error so waiters never hang.
pub struct TaskSettler<D, R> {
    task_id: TaskId,
    settle: Option<Box<dyn FnOnce(Result<R>) -> bool + Send>>,
    _data: std::marker::PhantomData<fn() -> D>,
}

impl<D, R> TaskSettler<D, R> {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Complete the task successfully. Returns false when the task was
    /// already settled or aborted.
    pub fn resolve(mut self, value: R) -> bool {
        self.finish(Ok(value))
    }

    /// Fail the task. Returns false when the task was already settled or
    /// aborted.
    pub fn reject(mut self, error: EngineError) -> bool {
        self.finish(Err(error))
    }

    fn finish(&mut self, outcome: Result<R>) -> bool {
        match self.settle.take() {
            Some(settle) => settle(outcome),
            None => false,
        }
    }
}

impl<D, R> Drop for TaskSettler<D, R> {
    fn drop(&mut self) {
        if self.settle.is_some() {
            let task_id = self.task_id.clone();
            if self.finish(Err(EngineError::internal(format!(
                "Task {} was dropped without being settled",
                task_id
            )))) {
                warn!(%task_id, "Task settler dropped without settling");
            }
        }
    }
}

/// Tracks background work started by a factory.
///
/// `P` is the creation parameter, `D` the handle the factory returns once the
/// work has started (passed to the terminator on kill) and `R` the result
/// delivered to `wait_for_result`.
pub struct TaskService<P, D, R> {
    inner: Arc<Inner<P, D, R>>,
}

impl<P, D, R> Clone for TaskService<P, D, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P, D, R> TaskService<P, D, R>
where
    P: Send + 'static,
    D: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn new<F, Fut, T, TFut>(factory: F, terminator: T) -> Self
    where
        F: Fn(P, TaskSettler<D, R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D>> + Send + 'static,
        T: Fn(D) -> TFut + Send + Sync + 'static,
        TFut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    tasks: HashMap::new(),
                    results: HashMap::new(),
                    settled: VecDeque::new(),
                    killed_while_pending: HashSet::new(),
                }),
                factory: Box::new(move |param, settler| Box::pin(factory(param, settler))),
                terminator: Box::new(move |data| Box::pin(terminator(data))),
            }),
        }
    }

    /// Register a task and start it through the factory.
    ///
    /// Returns once the factory has reported its handle. A factory error
    /// rejects the task instead of failing `create`.
    pub async fn create(&self, param: P) -> Result<TaskId> {
        let (sender, receiver) = oneshot::channel();
        let task_id = {
            let mut registry = self.inner.registry();
            let task_id = allocate_task_id(&mut rand::rng(), |candidate| {
                registry.tasks.contains_key(candidate) || registry.results.contains_key(candidate)
            });
            registry.tasks.insert(
                task_id.clone(),
                TaskRecord {
                    state: TaskState::Pending,
                    data: None,
                    sender: Some(sender),
                },
            );
            registry.results.insert(task_id.clone(), receiver);
            task_id
        };
        debug!(%task_id, "Task created");

        let weak: Weak<Inner<P, D, R>> = Arc::downgrade(&self.inner);
        let settle_id = task_id.clone();
        let settler = TaskSettler {
            task_id: task_id.clone(),
            settle: Some(Box::new(move |outcome| match weak.upgrade() {
                Some(inner) => inner.settle(&settle_id, outcome),
                None => false,
            })),
            _data: std::marker::PhantomData,
        };

        match (self.inner.factory)(param, settler).await {
            Ok(data) => {
                let orphaned = {
                    let mut registry = self.inner.registry();
                    if registry.killed_while_pending.remove(&task_id) {
                        Some(data)
                    } else {
                        match registry.tasks.get_mut(&task_id) {
                            Some(record) if record.state == TaskState::Pending => {
                                record.state = TaskState::Running;
                                record.data = Some(data);
                                debug!(%task_id, "Task running");
                            }
                            _ => debug!(%task_id, "Task finished before it reported a handle"),
                        }
                        None
                    }
                };
                // Killed while starting: the kill found no handle to terminate
                if let Some(data) = orphaned {
                    debug!(%task_id, "Terminating task killed while starting");
                    if let Err(error) = (self.inner.terminator)(data).await {
                        warn!(%task_id, "Task terminator failed: {}", error);
                    }
                }
            }
            Err(error) => {
                debug!(%task_id, "Task factory failed: {}", error);
                self.inner.registry().killed_while_pending.remove(&task_id);
                self.inner.settle(&task_id, Err(error));
            }
        }

        Ok(task_id)
    }

    /// Snapshot of every task that has not settled yet
    pub fn get_tasks(&self) -> Vec<TaskSnapshot<D>> {
        self.inner
            .registry()
            .tasks
            .iter()
            .map(|(task_id, record)| TaskSnapshot {
                task_id: task_id.clone(),
                state: record.state,
                data: record.data.clone(),
            })
            .collect()
    }

    pub fn state(&self, task_id: &TaskId) -> Option<TaskState> {
        self.inner.registry().tasks.get(task_id).map(|record| record.state)
    }

    /// Abort a task.
    ///
    /// Unknown ids are ignored. Otherwise the task is marked aborted, the
    /// terminator runs on its handle, waiters are rejected with `reason` and
    /// the task is removed. Terminator errors are returned after the task has
    /// been removed.
    pub async fn kill_task(&self, task_id: &TaskId, reason: impl Into<String>) -> Result<()> {
        let data = {
            let mut registry = self.inner.registry();
            let Some(record) = registry.tasks.get_mut(task_id) else {
                debug!(%task_id, "Kill requested for unknown task");
                return Ok(());
            };
            if record.state == TaskState::Aborted {
                debug!(%task_id, "Task is already being killed");
                return Ok(());
            }
            let was_pending = record.state == TaskState::Pending;
            record.state = TaskState::Aborted;
            let data = record.data.clone();
            if was_pending {
                registry.killed_while_pending.insert(task_id.clone());
            }
            data
        };

        let terminated = match data {
            Some(data) => (self.inner.terminator)(data).await,
            None => Ok(()),
        };

        let sender = {
            let mut registry = self.inner.registry();
            let sender = registry
                .tasks
                .remove(task_id)
                .and_then(|mut record| record.sender.take());
            registry.retire(task_id);
            sender
        };
        if let Some(sender) = sender {
            let _ = sender.send(Err(EngineError::Aborted(reason.into())));
        }

        match &terminated {
            Ok(()) => debug!(%task_id, "Task killed"),
            Err(error) => warn!(%task_id, "Task terminator failed: {}", error),
        }
        terminated
    }

    /// Wait for the settlement of a task.
    ///
    /// The result can be claimed once; unknown or already claimed ids are an
    /// internal error, as are results evicted after too many later
    /// settlements went unclaimed.
    pub async fn wait_for_result(&self, task_id: &TaskId) -> Result<R> {
        let receiver = self.inner.registry().results.remove(task_id).ok_or_else(|| {
            EngineError::internal(format!("No pending result for task {}", task_id))
        })?;

        receiver.await.unwrap_or_else(|_| {
            Err(EngineError::internal(format!(
                "Task {} was removed without a result",
                task_id
            )))
        })
    }
}
