//! Asynchronous video capture device and format discovery
//!
//! Enumeration runs on the engine worker queue. Each item is passed to the
//! item callback, then the completion callback runs exactly once with the
//! overall result, including when the queue stops before the task runs.
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


use crate::engine::{VideoCaptureDevice, VideoCaptureFormat};
use crate::error::{InteropError, InteropResult};
use crate::global_factory::FactoryRef;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs the completion callback once, on drop if nobody completed it
struct Completion<C>
where
    C: FnOnce(InteropResult<()>),
{
    callback: Option<C>,
}

impl<C> Completion<C>
where
    C: FnOnce(InteropResult<()>),
{
    fn new(callback: C) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    fn complete(mut self, result: InteropResult<()>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl<C> Drop for Completion<C>
where
    C: FnOnce(InteropResult<()>),
{
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            warn!("Enumeration dropped before running");
            callback(Err(InteropError::InvalidOperation(
                "enumeration was cancelled by shutdown".to_string(),
            )));
        }
    }
}

fn enumerate_on_worker<T, L, E, C>(factory: FactoryRef, list: L, mut on_item: E, on_completed: C)
where
    T: 'static,
    L: FnOnce(&FactoryRef) -> InteropResult<Vec<T>> + Send + 'static,
    E: FnMut(&T) + Send + 'static,
    C: FnOnce(InteropResult<()>) + Send + 'static,
{
    let completion = Completion::new(on_completed);
    let queue = Arc::clone(&factory.queues().worker);
    queue.post(Box::new(move || {
        let result = list(&factory).map(|items| {
            debug!(count = items.len(), "Enumerated items");
            items.iter().for_each(&mut on_item);
        });
        completion.complete(result);
        drop(factory);
    }));
}

/// List the video capture devices
pub fn enum_video_capture_devices<E, C>(factory: FactoryRef, on_item: E, on_completed: C)
where
    E: FnMut(&VideoCaptureDevice) + Send + 'static,
    C: FnOnce(InteropResult<()>) + Send + 'static,
{
    enumerate_on_worker(
        factory,
        |factory| factory.engine().video_capture_devices(),
        on_item,
        on_completed,
    );
}

/// List the capture formats of one device
pub fn enum_video_capture_formats<E, C>(
    factory: FactoryRef,
    device_id: String,
    on_item: E,
    on_completed: C,
) where
    E: FnMut(&VideoCaptureFormat) + Send + 'static,
    C: FnOnce(InteropResult<()>) + Send + 'static,
{
    enumerate_on_worker(
        factory,
        move |factory| factory.engine().video_capture_formats(&device_id),
        on_item,
        on_completed,
    );
}
