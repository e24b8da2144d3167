//! Media track functions
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


use super::track_source::MbVideoFrame;
use super::{guard, guard_void, object, opt_str_arg, to_mb_bool, write_out, MbBool, UserData, MB_FALSE};
use crate::callback::Callback;
use crate::engine::VideoFrame;
use crate::error::{InteropError, InteropResult, ResultCode};
use crate::global_factory::GlobalFactory;
use crate::handle::{into_handle, Handle};
use crate::media_track::create_local_track;
use crate::tracked_object::TrackedObject;
use std::ffi::{c_char, c_void};
use std::sync::Arc;

super::ref_functions!(mb_media_track_add_ref, mb_media_track_remove_ref);

pub type MbFrameReadyCallback = unsafe extern "C" fn(user_data: *mut c_void, frame: *const MbVideoFrame);

fn media_track(handle: Handle) -> InteropResult<Arc<TrackedObject>> {
    let object = object(handle)?;
    object.as_media_track()?;
    Ok(object)
}

/// Create a local track fed by `source`; its kind follows the source
///
/// # Safety
/// `name` must be null or a NUL-terminated string; `track` must be valid
/// for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_local_track_create(
    source: Handle,
    name: *const c_char,
    track: *mut Handle,
) -> ResultCode {
    guard("mb_local_track_create", || {
        if track.is_null() {
            return Err(InteropError::InvalidParameter("track is null".to_string()));
        }
        let source = object(source)?;
        let name = unsafe { opt_str_arg(name, "name") }?.map(str::to_string);
        let factory = GlobalFactory::instance_ptr()?;
        let created = create_local_track(factory, source, name)?;
        unsafe { write_out(track, into_handle(created)) }
    })
}

/// # Safety
/// `kind` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_media_track_get_kind(handle: Handle, kind: *mut u32) -> ResultCode {
    guard("mb_media_track_get_kind", || {
        let object = media_track(handle)?;
        let media_kind = object.as_media_track()?.kind();
        unsafe { write_out(kind, media_kind as u32) }
    })
}

/// # Safety
/// `enabled` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_media_track_is_enabled(handle: Handle, enabled: *mut MbBool) -> ResultCode {
    guard("mb_media_track_is_enabled", || {
        let object = media_track(handle)?;
        let value = to_mb_bool(object.as_media_track()?.enabled());
        unsafe { write_out(enabled, value) }
    })
}

/// A disabled track delivers no frames
#[no_mangle]
pub extern "C" fn mb_media_track_set_enabled(handle: Handle, enabled: MbBool) -> ResultCode {
    guard("mb_media_track_set_enabled", || {
        media_track(handle)?.as_media_track()?.set_enabled(enabled != MB_FALSE);
        Ok(())
    })
}

/// Frame data is only valid for the duration of the callback
#[no_mangle]
pub extern "C" fn mb_media_track_register_frame_callback(
    handle: Handle,
    callback: Option<MbFrameReadyCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    guard_void("mb_media_track_register_frame_callback", || {
        let object = media_track(handle)?;
        object
            .as_media_track()?
            .register_frame_callback(callback.map(|callback| {
                Arc::new(move |frame: &VideoFrame| {
                    let raw = MbVideoFrame::from_frame(frame);
                    unsafe { callback(user.get(), &raw) }
                }) as Callback<VideoFrame>
            }));
        Ok(())
    })
}
