//! Forwarding of library logs to the host
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


use super::{guard, guard_void, str_arg, to_cstring, write_out, UserData};
use crate::error::{InteropError, ResultCode};
use crate::global_factory::GlobalFactory;
use mediabridge_logging::{Severity, SinkId};
use std::ffi::{c_char, c_void};

pub type MbLogSinkCallback = unsafe extern "C" fn(user_data: *mut c_void, severity: i32, message: *const c_char);

fn severity(value: i32) -> Result<Severity, InteropError> {
    Severity::from_raw(value)
        .ok_or_else(|| InteropError::InvalidParameter(format!("unknown severity {}", value)))
}

/// Register a sink receiving every message at or above `min_severity`
///
/// `sink_id` receives a non-zero id for [`mb_logging_remove_sink`].
///
/// # Safety
/// `sink_id` must be valid for writes; `callback` must be callable with
/// `user_data` from any thread until the sink is removed.
#[no_mangle]
pub unsafe extern "C" fn mb_logging_add_sink(
    min_severity: i32,
    callback: Option<MbLogSinkCallback>,
    user_data: *mut c_void,
    sink_id: *mut u64,
) -> ResultCode {
    let user = UserData::new(user_data);
    guard("mb_logging_add_sink", || {
        let callback = callback
            .ok_or_else(|| InteropError::InvalidParameter("callback is null".to_string()))?;
        if sink_id.is_null() {
            return Err(InteropError::InvalidParameter("sink_id is null".to_string()));
        }
        // Make sure the forwarding layer is installed.
        let _ = GlobalFactory::global();
        let id = mediabridge_logging::add_sink(severity(min_severity)?, move |severity, message| {
            let message = to_cstring(message);
            unsafe { callback(user.get(), severity as i32, message.as_ptr()) }
        })
        .ok_or_else(|| InteropError::InvalidParameter("a sink needs a minimum severity below None".to_string()))?;
        unsafe { write_out(sink_id, id.as_raw()) }
    })
}

/// Unknown ids return `NotFound`
#[no_mangle]
pub extern "C" fn mb_logging_remove_sink(sink_id: u64) -> ResultCode {
    guard("mb_logging_remove_sink", || {
        let id = SinkId::from_raw(sink_id)
            .ok_or_else(|| InteropError::InvalidParameter("sink id 0".to_string()))?;
        if mediabridge_logging::remove_sink(id) {
            Ok(())
        } else {
            Err(InteropError::NotFound(format!("log sink {}", sink_id)))
        }
    })
}

/// Log a message on behalf of the host
///
/// # Safety
/// `message` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mb_log_message(severity_value: i32, message: *const c_char) {
    guard_void("mb_log_message", || {
        let message = unsafe { str_arg(message, "message") }?;
        mediabridge_logging::log_message(severity(severity_value)?, message);
        Ok(())
    })
}
