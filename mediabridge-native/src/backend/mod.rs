//! Platform backends running the engine's background work
//!
//! Two strategies exist. [`ThreadsBackend`] owns three dedicated threads
//! (network, worker, signaling). [`DispatcherBackend`] owns a single worker
//! thread and borrows a dispatcher queue pumped by the host (typically its UI
//! thread) for signaling work. The global factory starts exactly one of them
//! per initialization and stops it on shutdown.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


pub mod dispatcher;
pub mod threads;
pub mod worker_thread;

pub use dispatcher::DispatcherBackend;
pub use threads::ThreadsBackend;
pub use worker_thread::{StopMode, WorkerThread};

use crate::error::{InteropError, InteropResult};
use std::sync::Arc;
#[cfg(test)]
use tokio::sync::oneshot;

/// Unit of work posted to a queue
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Serial execution queue bound to one thread
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task. Tasks posted to a stopped queue are dropped.
    fn post(&self, task: Task);

    /// Whether the calling thread is the one draining this queue
    fn is_current(&self) -> bool;

    fn name(&self) -> &str;
}

/// Run `f` on `queue` and wait for its result
///
/// Runs inline when already on the queue's thread.
#[cfg(test)]
pub(crate) fn invoke<R, F>(queue: &dyn TaskQueue, f: F) -> InteropResult<R>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    if queue.is_current() {
        return Ok(f());
    }
    let (tx, rx) = oneshot::channel();
    queue.post(Box::new(move || {
        let _ = tx.send(f());
    }));
    rx.blocking_recv().map_err(|_| {
        InteropError::InvalidOperation(format!("{} stopped before running the task", queue.name()))
    })
}

/// Queues handed to the engine
#[derive(Clone)]
pub struct EngineQueues {
    pub network: Arc<dyn TaskQueue>,
    pub worker: Arc<dyn TaskQueue>,
    pub signaling: Arc<dyn TaskQueue>,
}

/// Execution resources created by a backend
pub struct EngineThreads {
    queues: EngineQueues,
    owned: Vec<WorkerThread>,
}

impl EngineThreads {
    pub fn new(queues: EngineQueues, owned: Vec<WorkerThread>) -> Self {
        Self { queues, owned }
    }

    pub fn queues(&self) -> &EngineQueues {
        &self.queues
    }

    /// Number of threads this backend spawned
    pub fn owned_thread_count(&self) -> usize {
        self.owned.len()
    }

    /// Stop every owned thread. The calling thread is never joined.
    pub fn stop(self, mode: StopMode) {
        for thread in self.owned {
            thread.stop(mode);
        }
    }
}

/// Strategy creating and destroying the engine's execution resources
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create the execution resources. Nothing is left running on failure.
    fn start(&self) -> InteropResult<EngineThreads>;

    fn stop(&self, threads: EngineThreads, mode: StopMode) {
        threads.stop(mode);
    }
}
