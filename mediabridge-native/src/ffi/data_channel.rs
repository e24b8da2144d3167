//! Data channel functions
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


use super::{guard, guard_void, object, write_out, UserData};
use crate::callback::Callback;
use crate::data_channel::BufferingEvent;
use crate::engine::DataChannelState;
use crate::error::{InteropError, InteropResult, ResultCode};
use crate::handle::Handle;
use crate::tracked_object::TrackedObject;
use bytes::Bytes;
use std::ffi::c_void;
use std::sync::Arc;

super::ref_functions!(mb_data_channel_add_ref, mb_data_channel_remove_ref);

pub type MbDataChannelMessageCallback =
    unsafe extern "C" fn(user_data: *mut c_void, data: *const u8, size: u64);
pub type MbDataChannelBufferingCallback =
    unsafe extern "C" fn(user_data: *mut c_void, previous: u64, current: u64, limit: u64);
pub type MbDataChannelStateCallback = unsafe extern "C" fn(user_data: *mut c_void, state: i32, id: i32);

fn data_channel(handle: Handle) -> InteropResult<Arc<TrackedObject>> {
    let object = object(handle)?;
    object.as_data_channel()?;
    Ok(object)
}

/// Send a binary message; fails with `InvalidOperation` unless the channel
/// is open
///
/// # Safety
/// `data` must be valid for `size` bytes of reads.
#[no_mangle]
pub unsafe extern "C" fn mb_data_channel_send_message(handle: Handle, data: *const u8, size: u64) -> ResultCode {
    guard("mb_data_channel_send_message", || {
        let object = data_channel(handle)?;
        if data.is_null() && size > 0 {
            return Err(InteropError::InvalidParameter("data is null".to_string()));
        }
        let message: &[u8] = if size == 0 {
            &[]
        } else {
            // SAFETY: non-null and readable for `size` bytes per the contract.
            unsafe { std::slice::from_raw_parts(data, size as usize) }
        };
        object.as_data_channel()?.send(message)
    })
}

/// # Safety
/// `id` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_data_channel_get_id(handle: Handle, id: *mut i32) -> ResultCode {
    guard("mb_data_channel_get_id", || {
        let object = data_channel(handle)?;
        let value = object.as_data_channel()?.id() as i32;
        unsafe { write_out(id, value) }
    })
}

/// Message data is only valid for the duration of the callback
#[no_mangle]
pub extern "C" fn mb_data_channel_register_message_callback(
    handle: Handle,
    callback: Option<MbDataChannelMessageCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    guard_void("mb_data_channel_register_message_callback", || {
        data_channel(handle)?
            .as_data_channel()?
            .register_message_callback(callback.map(|callback| {
                Arc::new(move |data: &Bytes| unsafe {
                    callback(user.get(), data.as_ptr(), data.len() as u64)
                }) as Callback<Bytes>
            }));
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn mb_data_channel_register_buffering_callback(
    handle: Handle,
    callback: Option<MbDataChannelBufferingCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    guard_void("mb_data_channel_register_buffering_callback", || {
        data_channel(handle)?
            .as_data_channel()?
            .register_buffering_callback(callback.map(|callback| {
                Arc::new(move |event: &BufferingEvent| unsafe {
                    callback(user.get(), event.previous, event.current, event.limit)
                }) as Callback<BufferingEvent>
            }));
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn mb_data_channel_register_state_callback(
    handle: Handle,
    callback: Option<MbDataChannelStateCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    guard_void("mb_data_channel_register_state_callback", || {
        let object = data_channel(handle)?;
        let channel = object.as_data_channel()?;
        let id = channel.id() as i32;
        channel.register_state_callback(callback.map(|callback| {
            Arc::new(move |state: &DataChannelState| unsafe { callback(user.get(), *state as i32, id) })
                as Callback<DataChannelState>
        }));
        Ok(())
    })
}
