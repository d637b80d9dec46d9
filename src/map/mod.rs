//! Nesting-aware parallel map
//!
//! [`Mapper`] applies a function to every item of a collection, either serially
//! or on a pool of worker threads. A map call issued from inside another map
//! call's work item is detected through the [`guard`] and always runs serially
//! on the calling thread without publishing status, so worker pools are never
//! created recursively.
//!
//! ```
//! use thorns::map::{Backend, Mapper};
//!
//! let squares = Mapper::with_backend(Backend::Threads)
//!     .workers(2)
//!     .show_status(false)
//!     .run(1..=4, |x: u64| x * x);
//! assert_eq!(squares, vec![1, 4, 9, 16]);
//! ```

pub mod backend;
pub mod guard;
pub mod status;

pub use backend::Backend;
pub use guard::{enter_map_scope, exit_map_scope, is_inside_map, map_depth, GuardStateError};
pub use status::{StatusSink, TerminalStatus};

use crate::config::MapConfig;
use crate::error::{ErrorCode, ThornsError};
use futures::future::join_all;
use guard::ScopeEntry;
use rayon::prelude::*;
use status::StatusPublisher;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Decision taken when a map call starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapPlan {
    /// Depth the work items run at (1 for a top-level call).
    pub depth: u32,
    /// Whether the call was issued from inside another map call.
    pub nested: bool,
    /// Backend the caller asked for.
    pub requested: Backend,
    /// Backend actually used.
    pub backend: Backend,
    /// Worker count actually used.
    pub workers: usize,
    /// Whether status was published.
    pub status: bool,
}

/// Results of a map call together with the plan it ran under.
#[derive(Debug, Clone, PartialEq)]
pub struct MapOutput<R> {
    pub values: Vec<R>,
    pub plan: MapPlan,
}

/// Configured map primitive.
#[derive(Clone)]
pub struct Mapper {
    backend: Backend,
    workers: usize,
    show_status: bool,
    label: String,
    sink: Option<Arc<dyn StatusSink>>,
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("backend", &self.backend)
            .field("workers", &self.workers)
            .field("show_status", &self.show_status)
            .field("label", &self.label)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new(&MapConfig::default())
    }
}

impl Mapper {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            backend: config.backend,
            workers: config.effective_workers(),
            show_status: config.show_status,
            label: "map".to_string(),
            sink: None,
        }
    }

    /// Mapper configured from defaults and `THORNS_*` environment variables.
    ///
    /// Invalid environment values are logged and ignored.
    pub fn from_env() -> Self {
        match MapConfig::from_env() {
            Ok(config) => Self::new(&config),
            Err(err) => {
                warn!("Ignoring invalid map configuration: {}", err);
                Self::default()
            }
        }
    }

    pub fn with_backend(backend: Backend) -> Self {
        Self::default().backend(backend)
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn show_status(mut self, enabled: bool) -> Self {
        self.show_status = enabled;
        self
    }

    /// Label shown in the progress bar and terminal title.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Send status events to `sink` instead of the terminal.
    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn plan(&self, entry: ScopeEntry, len: usize) -> MapPlan {
        let (backend, workers) = if entry.nested {
            (Backend::Serial, 1)
        } else {
            match self.backend {
                Backend::Serial => (Backend::Serial, 1),
                Backend::Threads => (Backend::Threads, self.workers),
            }
        };

        MapPlan {
            depth: entry.depth,
            nested: entry.nested,
            requested: self.backend,
            backend,
            workers,
            status: self.show_status && !entry.nested && len > 0,
        }
    }

    fn publisher(&self, plan: &MapPlan, total: usize) -> StatusPublisher {
        if !plan.status {
            return StatusPublisher::suppressed();
        }
        let sink = self
            .sink
            .clone()
            .unwrap_or_else(|| Arc::new(TerminalStatus::new()) as Arc<dyn StatusSink>);
        StatusPublisher::start(Some(sink), &self.label, total)
    }

    /// Apply `f` to every item, returning results in input order.
    pub fn run<T, R, F, I>(&self, items: I, f: F) -> Vec<R>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        match self.try_run(items, |item| Ok::<R, Infallible>(f(item))) {
            Ok(values) => values,
            Err(never) => match never {},
        }
    }

    /// Apply a fallible `f` to every item.
    ///
    /// The first error observed is returned unchanged. With the serial backend
    /// that is the error of the lowest failing index; with worker threads it is
    /// whichever failing item completed first.
    pub fn try_run<T, R, E, F, I>(&self, items: I, f: F) -> Result<Vec<R>, E>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        E: Send,
        F: Fn(T) -> Result<R, E> + Send + Sync,
    {
        self.try_run_with_plan(items, f).map(|output| output.values)
    }

    /// [`Mapper::try_run`] that also reports the plan the call ran under.
    pub fn try_run_with_plan<T, R, E, F, I>(&self, items: I, f: F) -> Result<MapOutput<R>, E>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        E: Send,
        F: Fn(T) -> Result<R, E> + Send + Sync,
    {
        let items: Vec<T> = items.into_iter().collect();
        let scope = guard::enter_map_scope();
        let mut plan = self.plan(scope.entry(), items.len());

        debug!(
            "Map '{}' over {} items: depth={} nested={} backend={} workers={}",
            self.label,
            items.len(),
            plan.depth,
            plan.nested,
            plan.backend,
            plan.workers
        );

        if items.is_empty() {
            scope.exit();
            return Ok(MapOutput {
                values: Vec::new(),
                plan,
            });
        }

        let pool = if plan.backend.is_parallel() {
            match build_pool(plan.workers) {
                Ok(pool) => Some(pool),
                Err(err) => {
                    let err = ThornsError::execution_with_code(
                        ErrorCode::EXEC_POOL_BUILD_FAILED,
                        format!("cannot build pool of {} workers", plan.workers),
                    )
                    .with_source(err);
                    warn!("{}, running '{}' serially", err, self.label);
                    plan.backend = Backend::Serial;
                    plan.workers = 1;
                    None
                }
            }
        } else {
            None
        };

        let status = self.publisher(&plan, items.len());
        let result = match pool {
            Some(pool) => run_threads(&pool, plan.depth, items, &f, &status),
            None => run_serial(items, &f, &status),
        };
        status.finish();
        scope.exit();

        result.map(|values| MapOutput { values, plan })
    }

    /// Async counterpart of [`Mapper::run`].
    pub async fn run_async<T, R, F, Fut, I>(&self, items: I, f: F) -> Vec<R>
    where
        I: IntoIterator<Item = T>,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let result = self
            .try_run_async(items, |item| {
                let fut = f(item);
                async move { Ok::<R, Infallible>(fut.await) }
            })
            .await;
        match result {
            Ok(values) => values,
            Err(never) => match never {},
        }
    }

    /// Async counterpart of [`Mapper::try_run`].
    pub async fn try_run_async<T, R, E, F, Fut, I>(&self, items: I, f: F) -> Result<Vec<R>, E>
    where
        I: IntoIterator<Item = T>,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        self.try_run_async_with_plan(items, f)
            .await
            .map(|output| output.values)
    }

    /// Async map that also reports its plan.
    ///
    /// With the threads backend up to `workers` item futures are polled
    /// concurrently on the current task. Each item future carries the call's
    /// depth in a task-local, so map calls made from inside it are nested.
    pub async fn try_run_async_with_plan<T, R, E, F, Fut, I>(
        &self,
        items: I,
        f: F,
    ) -> Result<MapOutput<R>, E>
    where
        I: IntoIterator<Item = T>,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let items: Vec<T> = items.into_iter().collect();
        let plan = self.plan(guard::next_entry(), items.len());

        debug!(
            "Async map '{}' over {} items: depth={} nested={} backend={} workers={}",
            self.label,
            items.len(),
            plan.depth,
            plan.nested,
            plan.backend,
            plan.workers
        );

        if items.is_empty() {
            return Ok(MapOutput {
                values: Vec::new(),
                plan,
            });
        }

        let status = self.publisher(&plan, items.len());
        let result = match plan.backend {
            Backend::Serial => {
                let mut values = Vec::with_capacity(items.len());
                let mut failure = None;
                for item in items {
                    let outcome = guard::scope_future(plan.depth, f(item)).await;
                    status.item_done();
                    match outcome {
                        Ok(value) => values.push(value),
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                match failure {
                    Some(err) => Err(err),
                    None => Ok(values),
                }
            }
            Backend::Threads => {
                let semaphore = Semaphore::new(plan.workers);
                let semaphore = &semaphore;
                let status = &status;
                let futures = items.into_iter().map(|item| {
                    let fut = guard::scope_future(plan.depth, f(item));
                    async move {
                        let _permit = semaphore.acquire().await.ok();
                        let outcome = fut.await;
                        status.item_done();
                        outcome
                    }
                });
                join_all(futures).await.into_iter().collect()
            }
        };
        status.finish();

        result.map(|values| MapOutput { values, plan })
    }
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("thorns-worker-{}", i))
        .build()
}

fn run_serial<T, R, E, F>(items: Vec<T>, f: &F, status: &StatusPublisher) -> Result<Vec<R>, E>
where
    F: Fn(T) -> Result<R, E>,
{
    items
        .into_iter()
        .map(|item| {
            let outcome = f(item);
            status.item_done();
            outcome
        })
        .collect()
}

fn run_threads<T, R, E, F>(
    pool: &rayon::ThreadPool,
    depth: u32,
    items: Vec<T>,
    f: &F,
    status: &StatusPublisher,
) -> Result<Vec<R>, E>
where
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> Result<R, E> + Send + Sync,
{
    pool.install(|| {
        items
            .into_par_iter()
            .map(|item| {
                let outcome = guard::inherit_map_scope(depth, || f(item));
                status.item_done();
                outcome
            })
            .collect()
    })
}

/// Map with configuration taken from the environment.
pub fn map<T, R, F, I>(items: I, f: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    Mapper::from_env().run(items, f)
}

/// Fallible map with configuration taken from the environment.
pub fn try_map<T, R, E, F, I>(items: I, f: F) -> Result<Vec<R>, E>
where
    I: IntoIterator<Item = T>,
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> Result<R, E> + Send + Sync,
{
    Mapper::from_env().try_run(items, f)
}

/// Async map with configuration taken from the environment.
pub async fn map_async<T, R, F, Fut, I>(items: I, f: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    Mapper::from_env().run_async(items, f).await
}

/// Fallible async map with configuration taken from the environment.
pub async fn try_map_async<T, R, E, F, Fut, I>(items: I, f: F) -> Result<Vec<R>, E>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    Mapper::from_env().try_run_async(items, f).await
}
