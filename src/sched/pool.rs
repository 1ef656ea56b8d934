use std::future::Future as StdFuture;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::{MofkaError, Result};

enum Inner {
    /// A dedicated multi-thread runtime this pool owns and tears down
    /// with it.
    Owned(Runtime),
    /// A handle onto a runtime owned by the embedder (e.g. the
    /// `#[tokio::main]` runtime the whole process already runs on).
    Shared(Handle),
}

/// Cooperative task scheduler over a user-space thread pool (spec.md
/// §5), standing in for the reference implementation's Argobots-backed
/// `MofkaThreadPool`. Tasks suspend at network, condition-variable, and
/// mutex-acquisition points the same way Argobots ULTs do; here that's
/// just whatever `.await` points the task contains.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<Inner>,
}

impl ThreadPool {
    /// Spin up a dedicated pool of `num_threads` worker threads.
    pub fn new(num_threads: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(num_threads.max(1))
            .thread_name("mofka-worker")
            .enable_all()
            .build()
            .map_err(|e| MofkaError::Transport(format!("failed to start thread pool: {e}")))?;
        Ok(Self {
            inner: Arc::new(Inner::Owned(runtime)),
        })
    }

    /// Adopt the runtime already driving the calling task (e.g. the
    /// embedder's own `#[tokio::main]` runtime) instead of spinning up
    /// a dedicated one.
    pub fn from_current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|_| MofkaError::Transport("no ambient tokio runtime to adopt".to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner::Shared(handle)),
        })
    }

    /// Schedule a task onto this pool.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: StdFuture + Send + 'static,
        F::Output: Send + 'static,
    {
        match self.inner.as_ref() {
            Inner::Owned(rt) => rt.spawn(fut),
            Inner::Shared(handle) => handle.spawn(fut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn owned_pool_runs_spawned_tasks() {
        let pool = ThreadPool::new(2).unwrap();
        let handle = pool.spawn(async { 1 + 1 });
        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn shared_pool_adopts_current_runtime() {
        let pool = ThreadPool::from_current().unwrap();
        let handle = pool.spawn(async { "ok" });
        assert_eq!(handle.await.unwrap(), "ok");
    }
}
