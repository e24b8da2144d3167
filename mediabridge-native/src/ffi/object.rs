//! Functions shared by every object family
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


use super::{copy_to_buffer, guard, guard_value, guard_void, object, str_arg, write_out};
use crate::error::ResultCode;
use crate::handle::{self, Handle};
use std::ffi::{c_char, c_void};

/// Add one reference to any object
#[no_mangle]
pub extern "C" fn mb_object_add_ref(handle: Handle) {
    // SAFETY: the handle is validated against the live-object registry.
    guard_void("mb_object_add_ref", || unsafe { handle::add_ref(handle) })
}

/// Release one reference to any object, destroying it with the last one
#[no_mangle]
pub extern "C" fn mb_object_remove_ref(handle: Handle) {
    // SAFETY: the handle is validated against the live-object registry.
    guard_void("mb_object_remove_ref", || unsafe { handle::remove_ref(handle) })
}

/// Type tag of an object, see `ObjectType`
///
/// # Safety
///
/// `object_type` must be null or point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn mb_object_get_type(handle: Handle, object_type: *mut u32) -> ResultCode {
    guard("mb_object_get_type", || {
        let object = object(handle)?;
        unsafe { write_out(object_type, object.object_type() as u32) }
    })
}

/// Rename an object
///
/// # Safety
///
/// `name` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mb_object_set_name(handle: Handle, name: *const c_char) -> ResultCode {
    guard("mb_object_set_name", || {
        let object = object(handle)?;
        let name = unsafe { str_arg(name, "name") }?;
        object.set_name(name.to_string());
        Ok(())
    })
}

/// Copy the object name into `buffer`
///
/// `buffer_size` holds the buffer capacity and always receives the size
/// needed, terminator included. Returns `BufferTooSmall` when the name does
/// not fit.
///
/// # Safety
///
/// `buffer` must be null or valid for `*buffer_size` bytes, and
/// `buffer_size` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn mb_object_get_name(
    handle: Handle,
    buffer: *mut c_char,
    buffer_size: *mut u64,
) -> ResultCode {
    guard("mb_object_get_name", || {
        let object = object(handle)?;
        unsafe { copy_to_buffer(&object.name(), buffer, buffer_size) }
    })
}

#[no_mangle]
pub extern "C" fn mb_object_set_user_data(handle: Handle, user_data: *mut c_void) {
    guard_void("mb_object_set_user_data", || {
        object(handle)?.set_user_data(user_data);
        Ok(())
    })
}

/// User data stored on the object, null when unset or invalid
#[no_mangle]
pub extern "C" fn mb_object_get_user_data(handle: Handle) -> *mut c_void {
    guard_value("mb_object_get_user_data", std::ptr::null_mut(), || {
        Ok(object(handle)?.user_data())
    })
}
