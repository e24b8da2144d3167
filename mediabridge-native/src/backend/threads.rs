//! Desktop backend: three dedicated engine threads
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


use super::{Backend, EngineQueues, EngineThreads, StopMode, WorkerThread};
use crate::error::InteropResult;
use tracing::info;

/// Backend spawning a network, a worker, and a signaling thread
#[derive(Debug, Clone)]
pub struct ThreadsBackend {
    thread_name_prefix: String,
}

impl ThreadsBackend {
    pub fn new(thread_name_prefix: impl Into<String>) -> Self {
        Self {
            thread_name_prefix: thread_name_prefix.into(),
        }
    }

    fn thread_name(&self, role: &str) -> String {
        format!("{} {} thread", self.thread_name_prefix, role)
    }
}

impl Backend for ThreadsBackend {
    fn name(&self) -> &'static str {
        "threads"
    }

    fn start(&self) -> InteropResult<EngineThreads> {
        let mut spawned: Vec<WorkerThread> = Vec::with_capacity(3);
        for role in ["network", "worker", "signaling"] {
            match WorkerThread::spawn(&self.thread_name(role)) {
                Ok(thread) => spawned.push(thread),
                Err(e) => {
                    for thread in spawned {
                        thread.stop(StopMode::Join);
                    }
                    return Err(e);
                }
            }
        }

        let queues = EngineQueues {
            network: spawned[0].queue(),
            worker: spawned[1].queue(),
            signaling: spawned[2].queue(),
        };
        info!(prefix = %self.thread_name_prefix, "Started engine threads");
        Ok(EngineThreads::new(queues, spawned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::invoke;

    #[test]
    fn test_start_spawns_three_named_threads() {
        let backend = ThreadsBackend::new("threads-test");
        let threads = backend.start().unwrap();
        assert_eq!(threads.owned_thread_count(), 3);

        let queues = threads.queues().clone();
        let name = invoke(queues.signaling.as_ref(), || {
            std::thread::current().name().map(str::to_string)
        })
        .unwrap();
        assert_eq!(name.as_deref(), Some("threads-test signaling thread"));
        assert_eq!(queues.network.name(), "threads-test network thread");
        assert_eq!(queues.worker.name(), "threads-test worker thread");

        backend.stop(threads, StopMode::Join);
    }
}
