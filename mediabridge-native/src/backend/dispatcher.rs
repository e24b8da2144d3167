//! Platform-integrated backend: one worker thread plus a host dispatcher
//!
//! The host owns the dispatcher thread and pumps its queue. Initialization
//! blocks until the dispatcher has run a probe task, so it must never run
//! on the dispatcher thread itself: that call would wait on a queue only it
//! can drain.
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


use super::{Backend, EngineQueues, EngineThreads, TaskQueue, WorkerThread};
use crate::error::{InteropError, InteropResult};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{error, info};

/// Backend driving signaling work through a host dispatcher
#[derive(Clone)]
pub struct DispatcherBackend {
    dispatcher: Arc<dyn TaskQueue>,
    thread_name_prefix: String,
    setup_timeout: Duration,
}

impl DispatcherBackend {
    pub fn new(
        dispatcher: Arc<dyn TaskQueue>,
        thread_name_prefix: impl Into<String>,
        setup_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            thread_name_prefix: thread_name_prefix.into(),
            setup_timeout,
        }
    }

    /// Wait until the dispatcher has drained a probe task
    fn handshake(&self) -> InteropResult<()> {
        let (tx, rx) = mpsc::channel();
        self.dispatcher.post(Box::new(move || {
            let _ = tx.send(());
        }));
        rx.recv_timeout(self.setup_timeout).map_err(|_| {
            error!(
                dispatcher = %self.dispatcher.name(),
                timeout_ms = self.setup_timeout.as_millis() as u64,
                "Dispatcher did not respond during initialization"
            );
            InteropError::Unknown(format!(
                "dispatcher '{}' did not respond within {:?}",
                self.dispatcher.name(),
                self.setup_timeout
            ))
        })
    }
}

impl Backend for DispatcherBackend {
    fn name(&self) -> &'static str {
        "dispatcher"
    }

    fn start(&self) -> InteropResult<EngineThreads> {
        if self.dispatcher.is_current() {
            return Err(InteropError::WrongThread(format!(
                "initialization cannot run on the dispatcher thread '{}'",
                self.dispatcher.name()
            )));
        }
        self.handshake()?;

        let worker = WorkerThread::spawn(&format!("{} worker thread", self.thread_name_prefix))?;
        let queues = EngineQueues {
            network: worker.queue(),
            worker: worker.queue(),
            signaling: Arc::clone(&self.dispatcher),
        };
        info!(
            dispatcher = %self.dispatcher.name(),
            prefix = %self.thread_name_prefix,
            "Started dispatcher backend"
        );
        Ok(EngineThreads::new(queues, vec![worker]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{invoke, StopMode, Task};

    /// Dispatcher that never runs anything
    struct StalledDispatcher;

    impl TaskQueue for StalledDispatcher {
        fn post(&self, _task: Task) {}

        fn is_current(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[test]
    fn test_start_from_dispatcher_thread_is_wrong_thread() {
        let host = WorkerThread::spawn("host dispatcher").unwrap();
        let backend = DispatcherBackend::new(host.queue(), "dispatcher-test", Duration::from_secs(5));

        let on_dispatcher = backend.clone();
        let result = invoke(host.queue().as_ref(), move || {
            on_dispatcher.start().map(|threads| threads.owned_thread_count())
        })
        .unwrap();
        assert!(matches!(result, Err(InteropError::WrongThread(_))));
        host.stop(StopMode::Join);
    }

    #[test]
    fn test_start_spawns_single_worker() {
        let host = WorkerThread::spawn("host dispatcher 2").unwrap();
        let backend = DispatcherBackend::new(host.queue(), "dispatcher-test", Duration::from_secs(5));
        let threads = backend.start().unwrap();
        assert_eq!(threads.owned_thread_count(), 1);
        assert!(invoke(threads.queues().signaling.as_ref(), || ()).is_ok());
        assert_eq!(threads.queues().worker.name(), "dispatcher-test worker thread");
        backend.stop(threads, StopMode::Join);
        host.stop(StopMode::Join);
    }

    #[test]
    fn test_stalled_dispatcher_times_out() {
        let backend = DispatcherBackend::new(
            Arc::new(StalledDispatcher),
            "dispatcher-test",
            Duration::from_millis(50),
        );
        assert!(matches!(backend.start(), Err(InteropError::Unknown(_))));
    }
}
