//! Named background thread draining a task queue
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


use super::{Task, TaskQueue};
use crate::error::{InteropError, InteropResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

static LIVE_THREADS: AtomicUsize = AtomicUsize::new(0);

/// How a thread is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Wait for the thread to exit, unless it is the calling thread
    Join,
    /// Ask the thread to exit and return immediately
    Detach,
}

enum Message {
    Run(Task),
    Stop,
}

/// Queue feeding one [`WorkerThread`]
struct ThreadQueue {
    name: String,
    sender: mpsc::UnboundedSender<Message>,
    thread_id: ThreadId,
}

impl TaskQueue for ThreadQueue {
    fn post(&self, task: Task) {
        if self.sender.send(Message::Run(task)).is_err() {
            debug!(queue = %self.name, "Dropping task posted to a stopped queue");
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Decrements the live thread count when the thread body exits, even by
/// unwinding.
struct LiveGuard;

impl Drop for LiveGuard {
    fn drop(&mut self) {
        LIVE_THREADS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Dedicated OS thread executing posted tasks in order
pub struct WorkerThread {
    queue: Arc<ThreadQueue>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawn a thread named `name`
    pub fn spawn(name: &str) -> InteropResult<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();
        let thread_name = name.to_string();

        LIVE_THREADS.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _live = LiveGuard;
            while let Some(message) = receiver.blocking_recv() {
                match message {
                    Message::Run(task) => {
                        if catch_unwind(AssertUnwindSafe(task)).is_err() {
                            error!(thread = %thread_name, "Task panicked on background thread");
                        }
                    }
                    Message::Stop => break,
                }
            }
            debug!(thread = %thread_name, "Background thread exiting");
        });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                LIVE_THREADS.fetch_sub(1, Ordering::SeqCst);
                return Err(InteropError::Unknown(format!(
                    "failed to spawn {}: {}",
                    name, e
                )));
            }
        };

        debug!(thread = %name, "Background thread started");
        Ok(Self {
            queue: Arc::new(ThreadQueue {
                name: name.to_string(),
                sender,
                thread_id: handle.thread().id(),
            }),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.queue.name
    }

    pub fn queue(&self) -> Arc<dyn TaskQueue> {
        Arc::clone(&self.queue) as Arc<dyn TaskQueue>
    }

    /// Number of worker threads currently running in the process
    pub fn live_count() -> usize {
        LIVE_THREADS.load(Ordering::SeqCst)
    }

    /// Stop the thread. Tasks queued before the stop still run; tasks posted
    /// afterwards are dropped.
    pub fn stop(mut self, mode: StopMode) {
        self.stop_inner(mode);
    }

    fn stop_inner(&mut self, mode: StopMode) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.queue.sender.send(Message::Stop);

        if mode == StopMode::Detach {
            return;
        }
        if self.queue.is_current() {
            // Stopping from inside the thread's own task; it exits once the
            // task returns.
            debug!(thread = %self.queue.name, "Not joining the current thread");
            return;
        }
        if handle.join().is_err() {
            warn!(thread = %self.queue.name, "Background thread panicked");
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop_inner(StopMode::Detach);
    }
}
