//! C ABI
//!
//! Every exported function runs its body inside [`guard`] (or one of its
//! variants) so that no panic unwinds into the caller. Fallible functions
//! return a [`ResultCode`]; functions without a result log a warning on
//! invalid input and do nothing.
//!
//! Handles are not type-checked: passing a handle to a function of another
//! object family is a caller error, reported as `InvalidNativeHandle` when
//! it is detected.
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


pub mod data_channel;
pub mod enumeration;
pub mod library;
pub mod logging;
pub mod object;
pub mod peer_connection;
pub mod track;
pub mod track_source;
pub mod transceiver;

use crate::error::{InteropError, InteropResult, ResultCode};
use crate::handle::{object_from_handle, Handle};
use crate::tracked_object::TrackedObject;
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Boolean crossing the ABI: zero is false, anything else is true
pub type MbBool = i32;

pub const MB_FALSE: MbBool = 0;
pub const MB_TRUE: MbBool = 1;

pub(crate) fn to_mb_bool(value: bool) -> MbBool {
    if value {
        MB_TRUE
    } else {
        MB_FALSE
    }
}

/// Opaque pointer handed back to the caller's callbacks
#[derive(Debug, Clone, Copy)]
pub(crate) struct UserData(*mut c_void);

// SAFETY: the pointer is never dereferenced here; the caller guarantees it
// may be used from the threads its callbacks are invoked on.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    pub(crate) fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub(crate) fn get(self) -> *mut c_void {
        self.0
    }
}

/// Run a fallible ABI function body, converting errors and panics
pub(crate) fn guard<F>(function: &'static str, body: F) -> ResultCode
where
    F: FnOnce() -> InteropResult<()>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => ResultCode::Success,
        Ok(Err(e)) => {
            debug!(function, error = %e, "Call failed");
            e.code()
        }
        Err(_) => {
            error!(function, "Panic caught at the ABI boundary");
            ResultCode::UnknownError
        }
    }
}

/// Run an ABI function body that reports no result
pub(crate) fn guard_void<F>(function: &'static str, body: F)
where
    F: FnOnce() -> InteropResult<()>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(function, error = %e, "Call ignored"),
        Err(_) => error!(function, "Panic caught at the ABI boundary"),
    }
}

/// Run an ABI function body returning a plain value, `fallback` on failure
pub(crate) fn guard_value<T, F>(function: &'static str, fallback: T, body: F) -> T
where
    F: FnOnce() -> InteropResult<T>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!(function, error = %e, "Call failed");
            fallback
        }
        Err(_) => {
            error!(function, "Panic caught at the ABI boundary");
            fallback
        }
    }
}

/// Object behind a handle, for the duration of a call
pub(crate) fn object(handle: Handle) -> InteropResult<Arc<TrackedObject>> {
    // SAFETY: handles are validated against the live-object registry; the
    // remaining misuse (concurrent release) is a documented caller error.
    unsafe { object_from_handle(handle) }
}

/// Required UTF-8 string argument
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> InteropResult<&'a str> {
    if ptr.is_null() {
        return Err(InteropError::InvalidParameter(format!("{} is null", what)));
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| InteropError::InvalidParameter(format!("{} is not valid UTF-8", what)))
}

/// Optional UTF-8 string argument, `None` when null
///
/// # Safety
/// Same as [`str_arg`].
pub(crate) unsafe fn opt_str_arg<'a>(ptr: *const c_char, what: &str) -> InteropResult<Option<&'a str>> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { str_arg(ptr, what) }.map(Some)
}

/// Store `value` into a caller-provided out parameter
///
/// # Safety
/// `out` must be null or valid for writes.
pub(crate) unsafe fn write_out<T>(out: *mut T, value: T) -> InteropResult<()> {
    if out.is_null() {
        return Err(InteropError::InvalidParameter("output pointer is null".to_string()));
    }
    // SAFETY: non-null and writable per the caller contract.
    unsafe { out.write(value) };
    Ok(())
}

/// String passed to a foreign callback; interior NULs are removed
pub(crate) fn to_cstring(value: &str) -> CString {
    CString::new(value.replace('\0', "")).unwrap_or_default()
}

/// Copy `value` into a caller buffer as a NUL-terminated string
///
/// `size` holds the buffer capacity on input and always receives the size
/// required, terminator included.
///
/// # Safety
/// `buffer` must be valid for `*size` bytes of writes and `size` valid for
/// reads and writes.
pub(crate) unsafe fn copy_to_buffer(value: &str, buffer: *mut c_char, size: *mut u64) -> InteropResult<()> {
    if size.is_null() {
        return Err(InteropError::InvalidParameter("size must not be null".to_string()));
    }
    let bytes = value.as_bytes();
    let required = bytes.len() + 1;
    // SAFETY: checked non-null above.
    let capacity = if buffer.is_null() { 0 } else { (unsafe { size.read() }) as usize };
    unsafe { size.write(required as u64) };
    if capacity < required {
        return Err(InteropError::BufferTooSmall { required });
    }
    // SAFETY: the buffer holds at least `required` bytes.
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer as *mut u8, bytes.len());
        buffer.add(bytes.len()).write(0);
    }
    Ok(())
}

/// Declare the reference counting pair of an object family
macro_rules! ref_functions {
    ($add_ref:ident, $remove_ref:ident) => {
        /// Add one reference; null or unknown handles are ignored
        #[no_mangle]
        pub extern "C" fn $add_ref(handle: $crate::handle::Handle) {
            $crate::ffi::object::mb_object_add_ref(handle)
        }

        /// Release one reference; null or unknown handles are ignored
        #[no_mangle]
        pub extern "C" fn $remove_ref(handle: $crate::handle::Handle) {
            $crate::ffi::object::mb_object_remove_ref(handle)
        }
    };
}

pub(crate) use ref_functions;
