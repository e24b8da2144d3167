//! Library-wide lifecycle and diagnostics
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


use super::{guard, guard_value, to_mb_bool, MbBool, UserData, MB_FALSE};
use crate::backend::{Task, TaskQueue};
use crate::error::{InteropError, ResultCode};
use crate::global_factory::{GlobalFactory, ShutdownOptions};
use mediabridge_config::BackendKind;
use std::ffi::{c_char, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info};

/// Runs a task handed to the host dispatcher; the host calls it exactly
/// once, on its dispatcher thread
pub type MbTaskRunner = unsafe extern "C" fn(task: *mut c_void);

/// Host hook enqueuing `run(task)` on the dispatcher thread
pub type MbDispatcherPostCallback =
    unsafe extern "C" fn(user_data: *mut c_void, run: MbTaskRunner, task: *mut c_void);

/// Host hook telling whether the calling thread is the dispatcher thread
pub type MbDispatcherHasThreadAccessCallback = unsafe extern "C" fn(user_data: *mut c_void) -> MbBool;

/// Host dispatcher driven through C callbacks
struct ForeignDispatcher {
    post: MbDispatcherPostCallback,
    has_thread_access: MbDispatcherHasThreadAccessCallback,
    user_data: UserData,
    name: String,
}

unsafe extern "C" fn run_foreign_task(task: *mut c_void) {
    if task.is_null() {
        return;
    }
    // SAFETY: `task` comes from `Box::into_raw` in `ForeignDispatcher::post`
    // and the host runs it only once.
    let task = unsafe { Box::from_raw(task as *mut Task) };
    if catch_unwind(AssertUnwindSafe(move || task())).is_err() {
        error!("Panic in a task run by the host dispatcher");
    }
}

impl TaskQueue for ForeignDispatcher {
    fn post(&self, task: Task) {
        let task = Box::into_raw(Box::new(task)) as *mut c_void;
        // SAFETY: the host registered these callbacks for this user data.
        unsafe { (self.post)(self.user_data.get(), run_foreign_task, task) };
    }

    fn is_current(&self) -> bool {
        // SAFETY: see `post`.
        unsafe { (self.has_thread_access)(self.user_data.get()) != MB_FALSE }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Log every live object and return how many there are
///
/// Never initializes the library.
#[no_mangle]
pub extern "C" fn mb_library_report_live_objects() -> u32 {
    guard_value("mb_library_report_live_objects", 0, || {
        Ok(GlobalFactory::global().report_live_objects() as u32)
    })
}

/// Current shutdown options, see `ShutdownOptions`
#[no_mangle]
pub extern "C" fn mb_library_get_shutdown_options() -> u32 {
    guard_value("mb_library_get_shutdown_options", 0, || {
        Ok(GlobalFactory::global().shutdown_options().bits())
    })
}

/// Unknown bits are dropped
#[no_mangle]
pub extern "C" fn mb_library_set_shutdown_options(options: u32) {
    super::guard_void("mb_library_set_shutdown_options", || {
        GlobalFactory::global().set_shutdown_options(ShutdownOptions::from_bits_truncate(options));
        Ok(())
    })
}

/// Shut down the library even if objects are still alive
///
/// Returns `InvalidOperation` when objects were alive and the
/// fail-on-live-objects option is set; the shutdown happens regardless.
#[no_mangle]
pub extern "C" fn mb_library_force_shutdown() -> ResultCode {
    guard("mb_library_force_shutdown", || {
        let outcome = GlobalFactory::global().force_shutdown()?;
        info!(?outcome, "Forced shutdown requested by the host");
        Ok(())
    })
}

/// Shut down only if nothing is alive; true when the library is shut down
#[no_mangle]
pub extern "C" fn mb_library_try_shutdown() -> MbBool {
    guard_value("mb_library_try_shutdown", MB_FALSE, || {
        Ok(to_mb_bool(GlobalFactory::global().try_shutdown()))
    })
}

#[no_mangle]
pub extern "C" fn mb_library_is_initialized() -> MbBool {
    guard_value("mb_library_is_initialized", MB_FALSE, || {
        Ok(to_mb_bool(GlobalFactory::global().is_initialized()))
    })
}

/// Select the backend used by the next initialization
///
/// `0` selects dedicated threads, `1` the host dispatcher. Fails with
/// `InvalidOperation` while the library is initialized.
#[no_mangle]
pub extern "C" fn mb_library_use_backend(backend: u32) -> ResultCode {
    guard("mb_library_use_backend", || {
        let backend = match backend {
            0 => BackendKind::Threads,
            1 => BackendKind::Dispatcher,
            other => {
                return Err(InteropError::InvalidParameter(format!(
                    "unknown backend {}",
                    other
                )))
            }
        };
        GlobalFactory::global().update_settings(|settings| settings.backend = backend)
    })
}

/// Register the host dispatcher and select the dispatcher backend
///
/// Initialization then blocks until the dispatcher runs a first task, and
/// fails with `WrongThread` when attempted on the dispatcher thread itself.
///
/// # Safety
/// `name` must be null or a NUL-terminated string. The callbacks must stay
/// callable with `user_data` from any thread until the library is shut down.
#[no_mangle]
pub unsafe extern "C" fn mb_library_set_dispatcher(
    post: Option<MbDispatcherPostCallback>,
    has_thread_access: Option<MbDispatcherHasThreadAccessCallback>,
    user_data: *mut c_void,
    name: *const c_char,
) -> ResultCode {
    guard("mb_library_set_dispatcher", || {
        let (Some(post), Some(has_thread_access)) = (post, has_thread_access) else {
            return Err(InteropError::InvalidParameter(
                "dispatcher callbacks are required".to_string(),
            ));
        };
        let name = unsafe { super::opt_str_arg(name, "name") }?
            .unwrap_or("host dispatcher")
            .to_string();
        let dispatcher: Arc<dyn TaskQueue> = Arc::new(ForeignDispatcher {
            post,
            has_thread_access,
            user_data: UserData::new(user_data),
            name,
        });
        GlobalFactory::global().update_settings(|settings| {
            settings.backend = BackendKind::Dispatcher;
            settings.dispatcher = Some(dispatcher);
        })
    })
}
