//! Conversion between tracked objects and raw ABI handles
//!
//! A handle is the pointer produced by `Arc::into_raw` on a tracked object
//! and owns exactly one strong reference. Every function here checks the
//! address against the live-object registry of the process-wide factory
//! before touching it, which rejects null handles and handles released
//! earlier on the same object.
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


use crate::error::{InteropError, InteropResult};
use crate::global_factory::GlobalFactory;
use crate::tracked_object::TrackedObject;
use std::ffi::c_void;
use std::sync::Arc;

/// Opaque object handle crossing the ABI
pub type Handle = *mut c_void;

/// Turn one owned reference into a handle
pub fn into_handle(object: Arc<TrackedObject>) -> Handle {
    Arc::into_raw(object) as Handle
}

/// Same as [`into_handle`] for optional objects, null for `None`
pub fn into_handle_or_null(object: Option<Arc<TrackedObject>>) -> Handle {
    object.map_or(std::ptr::null_mut(), into_handle)
}

/// Handle value of an object, without transferring a reference
pub fn borrowed_handle(object: &Arc<TrackedObject>) -> Handle {
    Arc::as_ptr(object) as Handle
}

fn validate(handle: Handle) -> InteropResult<*const TrackedObject> {
    if handle.is_null() {
        return Err(InteropError::InvalidNativeHandle("null handle".to_string()));
    }
    if !GlobalFactory::global().is_live_address(handle as usize) {
        return Err(InteropError::InvalidNativeHandle(format!(
            "{:p} is not a live object",
            handle
        )));
    }
    Ok(handle as *const TrackedObject)
}

/// New owned reference to the object behind `handle`
///
/// # Safety
/// `handle` must be null or a handle produced by this library whose
/// reference has not been released concurrently with this call.
pub unsafe fn object_from_handle(handle: Handle) -> InteropResult<Arc<TrackedObject>> {
    let ptr = validate(handle)?;
    // SAFETY: the registry confirmed the object is alive and the caller
    // owns at least one reference through `handle`.
    unsafe {
        Arc::increment_strong_count(ptr);
        Ok(Arc::from_raw(ptr))
    }
}

/// Add one reference to the object behind `handle`
///
/// # Safety
/// Same contract as [`object_from_handle`].
pub unsafe fn add_ref(handle: Handle) -> InteropResult<()> {
    let ptr = validate(handle)?;
    // SAFETY: see `object_from_handle`.
    unsafe { Arc::increment_strong_count(ptr) };
    Ok(())
}

/// Release one reference owned through `handle`, destroying the object when
/// it was the last one
///
/// # Safety
/// Same contract as [`object_from_handle`]; the caller gives up the
/// reference it releases.
pub unsafe fn remove_ref(handle: Handle) -> InteropResult<()> {
    let ptr = validate(handle)?;
    // SAFETY: the caller transfers one owned reference back to us.
    drop(unsafe { Arc::from_raw(ptr) });
    Ok(())
}
