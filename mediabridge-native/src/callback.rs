//! Callback slots for asynchronous notifications
//!
//! Every event an object can raise owns one [`CallbackSlot`]. Registration is
//! last-write-wins and `None` unregisters. Firing clones the registered
//! closure under the slot lock and invokes it after the lock is released, so
//! a callback may call back into the library (even to re-register itself)
//! without deadlocking.
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


use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Registered handler for events of type `E`
pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct SlotState<E> {
    callback: Option<Callback<E>>,
    closed: bool,
}

/// Single callback registration point
pub struct CallbackSlot<E> {
    state: Mutex<SlotState<E>>,
}

impl<E> CallbackSlot<E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                callback: None,
                closed: false,
            }),
        }
    }

    /// Register a callback, replacing the previous one. `None` unregisters.
    ///
    /// Ignored once the slot is closed.
    pub fn set(&self, callback: Option<Callback<E>>) {
        let previous = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            std::mem::replace(&mut state.callback, callback)
        };
        // The replaced closure may own foreign resources; drop it unlocked.
        drop(previous);
    }

    /// Invoke the registered callback, if any. Returns whether one ran.
    pub fn fire(&self, event: &E) -> bool {
        let callback = {
            let state = self.state.lock();
            if state.closed {
                return false;
            }
            state.callback.clone()
        };
        match callback {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    /// Unregister and refuse any further registration or invocation
    pub fn close(&self) {
        let previous = {
            let mut state = self.state.lock();
            state.closed = true;
            state.callback.take()
        };
        drop(previous);
    }
}

impl<E> Default for CallbackSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for CallbackSlot<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CallbackSlot")
            .field("registered", &state.callback.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}
