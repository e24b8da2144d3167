//! Transceiver functions
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


use super::{guard, guard_void, object, to_mb_bool, write_out, MbBool, UserData};
use crate::callback::Callback;
use crate::engine::TransceiverDirection;
use crate::error::{InteropError, InteropResult, ResultCode};
use crate::handle::{into_handle_or_null, Handle};
use crate::tracked_object::TrackedObject;
use crate::transceiver::TransceiverStateUpdate;
use std::ffi::c_void;
use std::sync::Arc;

super::ref_functions!(mb_transceiver_add_ref, mb_transceiver_remove_ref);

#[repr(C)]
pub struct MbTransceiverState {
    pub direction: i32,
    pub has_local_track: MbBool,
    pub has_remote_track: MbBool,
}

pub type MbTransceiverStateUpdatedCallback =
    unsafe extern "C" fn(user_data: *mut c_void, state: *const MbTransceiverState);

fn transceiver(handle: Handle) -> InteropResult<Arc<TrackedObject>> {
    let object = object(handle)?;
    object.as_transceiver()?;
    Ok(object)
}

/// Media kind of the transceiver, see `MediaKind`
///
/// # Safety
/// `kind` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_transceiver_get_media_kind(handle: Handle, kind: *mut u32) -> ResultCode {
    guard("mb_transceiver_get_media_kind", || {
        let object = transceiver(handle)?;
        let media_kind = object.as_transceiver()?.kind();
        unsafe { write_out(kind, media_kind as u32) }
    })
}

/// Attach a local track, or detach the current one with a null handle
///
/// Fails with `InvalidMediaKind` when the track kind differs from the
/// transceiver kind.
#[no_mangle]
pub extern "C" fn mb_transceiver_set_local_track(handle: Handle, track: Handle) -> ResultCode {
    guard("mb_transceiver_set_local_track", || {
        let object = transceiver(handle)?;
        let track = if track.is_null() {
            None
        } else {
            Some(object_of_track(track)?)
        };
        object.as_transceiver()?.set_local_track(track)
    })
}

fn object_of_track(handle: Handle) -> InteropResult<Arc<TrackedObject>> {
    let track = object(handle)?;
    track.as_media_track()?;
    Ok(track)
}

/// Local track as a new reference, or null when none is attached
///
/// # Safety
/// `track` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_transceiver_get_local_track(handle: Handle, track: *mut Handle) -> ResultCode {
    guard("mb_transceiver_get_local_track", || {
        let object = transceiver(handle)?;
        let local = object.as_transceiver()?.local_track();
        unsafe { write_out(track, into_handle_or_null(local)) }
    })
}

/// Remote track as a new reference, or null when none is attached
///
/// # Safety
/// `track` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_transceiver_get_remote_track(handle: Handle, track: *mut Handle) -> ResultCode {
    guard("mb_transceiver_get_remote_track", || {
        let object = transceiver(handle)?;
        let remote = object.as_transceiver()?.remote_track();
        unsafe { write_out(track, into_handle_or_null(remote)) }
    })
}

#[no_mangle]
pub extern "C" fn mb_transceiver_set_direction(handle: Handle, direction: i32) -> ResultCode {
    guard("mb_transceiver_set_direction", || {
        let object = transceiver(handle)?;
        let direction = TransceiverDirection::from_raw(direction)
            .ok_or_else(|| InteropError::InvalidParameter(format!("unknown direction {}", direction)))?;
        object.as_transceiver()?.set_direction(direction)
    })
}

/// # Safety
/// `direction` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_transceiver_get_direction(handle: Handle, direction: *mut i32) -> ResultCode {
    guard("mb_transceiver_get_direction", || {
        let object = transceiver(handle)?;
        let current = object.as_transceiver()?.direction();
        unsafe { write_out(direction, current as i32) }
    })
}

#[no_mangle]
pub extern "C" fn mb_transceiver_register_state_updated_callback(
    handle: Handle,
    callback: Option<MbTransceiverStateUpdatedCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    guard_void("mb_transceiver_register_state_updated_callback", || {
        let object = transceiver(handle)?;
        object
            .as_transceiver()?
            .register_state_updated_callback(callback.map(|callback| {
                Arc::new(move |update: &TransceiverStateUpdate| {
                    let state = MbTransceiverState {
                        direction: update.direction as i32,
                        has_local_track: to_mb_bool(update.has_local_track),
                        has_remote_track: to_mb_bool(update.has_remote_track),
                    };
                    unsafe { callback(user.get(), &state) }
                }) as Callback<TransceiverStateUpdate>
            }));
        Ok(())
    })
}
