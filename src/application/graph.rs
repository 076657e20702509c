//! Dependency-ordered execution of workspace tasks.
//!
//! Each task declares the workspace paths it consumes and produces. A task becomes
//! runnable once every producer of its consumed paths has completed; paths nobody
//! produces are treated as already present.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub type TaskId = usize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("{path} is produced by tasks {first} and {second}")]
    DuplicateProducer {
        path: String,
        first: TaskId,
        second: TaskId,
    },

    #[error("dependency cycle between tasks {tasks:?}")]
    Cycle { tasks: Vec<TaskId> },
}

/// Why [`TaskGraph::run`] stopped early.
#[derive(Debug)]
pub enum RunError<E> {
    Graph(GraphError),
    /// The first task failure. Tasks already running were awaited.
    Task(E),
    /// Cancellation was observed before `pending` could be launched.
    Cancelled { pending: Option<TaskId> },
}

impl<E> From<GraphError> for RunError<E> {
    fn from(err: GraphError) -> Self {
        RunError::Graph(err)
    }
}

#[derive(Debug)]
struct Node<T> {
    task: T,
    consumes: Vec<String>,
    produces: Vec<String>,
}

#[derive(Debug)]
pub struct TaskGraph<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Default for TaskGraph<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> TaskGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<C, P>(&mut self, task: T, consumes: C, produces: P) -> TaskId
    where
        C: IntoIterator,
        C::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        self.nodes.push(Node {
            task,
            consumes: consumes.into_iter().map(Into::into).collect(),
            produces: produces.into_iter().map(Into::into).collect(),
        });
        self.nodes.len() - 1
    }

    pub fn task(&self, id: TaskId) -> &T {
        &self.nodes[id].task
    }

    pub fn tasks(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().map(|node| &node.task)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Prerequisites of every task, indexed by task id.
    pub fn dependencies(&self) -> Result<Vec<Vec<TaskId>>, GraphError> {
        let mut producers: HashMap<&str, TaskId> = HashMap::new();
        for (id, node) in self.nodes.iter().enumerate() {
            for path in &node.produces {
                if let Some(first) = producers.insert(path, id) {
                    if first != id {
                        return Err(GraphError::DuplicateProducer {
                            path: path.clone(),
                            first,
                            second: id,
                        });
                    }
                }
            }
        }

        Ok(self
            .nodes
            .iter()
            .map(|node| {
                let mut deps: Vec<TaskId> = node
                    .consumes
                    .iter()
                    .filter_map(|path| producers.get(path.as_str()).copied())
                    .collect();
                deps.sort_unstable();
                deps.dedup();
                deps
            })
            .collect())
    }

    /// A topological order of all tasks, ties broken by insertion order.
    pub fn plan(&self) -> Result<Vec<TaskId>, GraphError> {
        let deps = self.dependencies()?;
        let (mut remaining, dependents) = Self::edges(&deps);
        let mut ready: VecDeque<TaskId> = (0..deps.len()).filter(|id| remaining[*id] == 0).collect();
        let mut order = Vec::with_capacity(deps.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &next in &dependents[id] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        if order.len() < deps.len() {
            return Err(GraphError::Cycle {
                tasks: (0..deps.len()).filter(|id| remaining[*id] > 0).collect(),
            });
        }
        Ok(order)
    }

    fn edges(deps: &[Vec<TaskId>]) -> (Vec<usize>, Vec<Vec<TaskId>>) {
        let remaining = deps.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::new(); deps.len()];
        for (id, prerequisites) in deps.iter().enumerate() {
            for &dep in prerequisites {
                dependents[dep].push(id);
            }
        }
        (remaining, dependents)
    }

    /// Run every task, at most `limit` at a time.
    ///
    /// After the first failure, or once `cancel` fires, no further task is
    /// launched; tasks already in flight are awaited before returning.
    /// `on_complete` is called for every task that succeeded.
    pub async fn run<'a, E, F, Fut, C>(
        &'a self,
        limit: usize,
        cancel: &CancellationToken,
        mut task_fn: F,
        mut on_complete: C,
    ) -> Result<(), RunError<E>>
    where
        F: FnMut(TaskId, &'a T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        C: FnMut(TaskId),
    {
        self.plan()?;
        let deps = self.dependencies()?;
        let (mut remaining, dependents) = Self::edges(&deps);
        let mut ready: VecDeque<TaskId> = (0..deps.len()).filter(|id| remaining[*id] == 0).collect();
        let limit = limit.max(1);

        let mut running = FuturesUnordered::new();
        let mut failure: Option<RunError<E>> = None;

        loop {
            while failure.is_none() && running.len() < limit {
                let Some(&id) = ready.front() else {
                    break;
                };
                if cancel.is_cancelled() {
                    failure = Some(RunError::Cancelled { pending: Some(id) });
                    break;
                }
                ready.pop_front();
                let task = task_fn(id, &self.nodes[id].task);
                running.push(async move { (id, task.await) });
            }

            let Some((id, result)) = running.next().await else {
                break;
            };
            match result {
                Ok(()) => {
                    on_complete(id);
                    for &next in &dependents[id] {
                        remaining[next] -= 1;
                        if remaining[next] == 0 {
                            ready.push_back(next);
                        }
                    }
                }
                Err(err) => {
                    if !matches!(failure, Some(RunError::Task(_))) {
                        failure = Some(RunError::Task(err));
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
