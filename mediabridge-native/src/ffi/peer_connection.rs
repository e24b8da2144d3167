//! Peer connection functions
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


use super::{guard, guard_void, object, opt_str_arg, str_arg, to_cstring, write_out, MbBool, UserData, MB_FALSE};
use crate::callback::Callback;
use crate::engine::{
    ConnectionConfig, DataChannelConfig, IceCandidate, IceConnectionState, IceGatheringState,
    MediaKind, SdpType, TransceiverDirection,
};
use crate::error::{InteropError, InteropResult, ResultCode};
use crate::global_factory::GlobalFactory;
use crate::handle::{borrowed_handle, into_handle, Handle};
use crate::peer_connection::{create_peer_connection, decode_ice_servers, LocalSdp, PeerConnection, TrackEvent};
use crate::tracked_object::TrackedObject;
use std::ffi::{c_char, c_void};
use std::sync::Arc;

super::ref_functions!(mb_peer_connection_add_ref, mb_peer_connection_remove_ref);

#[repr(C)]
pub struct MbPeerConnectionConfig {
    /// ICE servers separated by a blank line; one URL per line plus
    /// optional `username:` and `password:` lines. May be null.
    pub encoded_ice_servers: *const c_char,
    /// Diagnostic name, random when null or empty
    pub name: *const c_char,
}

#[repr(C)]
pub struct MbIceCandidate {
    pub sdp_mid: *const c_char,
    pub candidate: *const c_char,
    pub sdp_mline_index: i32,
}

#[repr(C)]
pub struct MbTransceiverInit {
    pub name: *const c_char,
    /// `MediaKind` value
    pub media_kind: u32,
    /// `TransceiverDirection` value
    pub direction: i32,
}

#[repr(C)]
pub struct MbDataChannelConfig {
    /// Negotiated id, or -1 to let the engine pick one
    pub id: i32,
    pub label: *const c_char,
    pub ordered: MbBool,
    pub reliable: MbBool,
}

/// Remote track announced by the peer; handles are borrowed for the
/// duration of the callback
#[repr(C)]
pub struct MbTrackInfo {
    pub track: Handle,
    pub transceiver: Handle,
    pub media_kind: u32,
    pub name: *const c_char,
}

/// Data channel added or removed; the handle is borrowed for the duration
/// of the callback
#[repr(C)]
pub struct MbDataChannelInfo {
    pub data_channel: Handle,
    pub id: i32,
    pub label: *const c_char,
}

pub type MbConnectedCallback = unsafe extern "C" fn(user_data: *mut c_void);
pub type MbIceStateChangedCallback = unsafe extern "C" fn(user_data: *mut c_void, state: i32);
pub type MbIceGatheringStateChangedCallback = unsafe extern "C" fn(user_data: *mut c_void, state: i32);
pub type MbRenegotiationNeededCallback = unsafe extern "C" fn(user_data: *mut c_void);
pub type MbIceCandidateReadyCallback =
    unsafe extern "C" fn(user_data: *mut c_void, candidate: *const MbIceCandidate);
pub type MbLocalSdpReadyCallback =
    unsafe extern "C" fn(user_data: *mut c_void, sdp_type: i32, sdp: *const c_char);
pub type MbTrackCallback = unsafe extern "C" fn(user_data: *mut c_void, info: *const MbTrackInfo);
pub type MbDataChannelCallback = unsafe extern "C" fn(user_data: *mut c_void, info: *const MbDataChannelInfo);

fn peer_connection(handle: Handle) -> InteropResult<Arc<TrackedObject>> {
    let object = object(handle)?;
    object.as_peer_connection()?;
    Ok(object)
}

/// Register a callback on the peer connection behind `handle`
fn register(handle: Handle, function: &'static str, apply: impl FnOnce(&PeerConnection)) {
    guard_void(function, || {
        let object = peer_connection(handle)?;
        apply(object.as_peer_connection()?);
        Ok(())
    })
}

/// Create a peer connection
///
/// # Safety
/// `config` must be null or point to a valid configuration, and `handle`
/// must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_peer_connection_create(
    config: *const MbPeerConnectionConfig,
    handle: *mut Handle,
) -> ResultCode {
    guard("mb_peer_connection_create", || {
        if handle.is_null() {
            return Err(InteropError::InvalidParameter("handle is null".to_string()));
        }
        let (ice_servers, name) = match unsafe { config.as_ref() } {
            Some(config) => (
                unsafe { opt_str_arg(config.encoded_ice_servers, "encoded_ice_servers") }?
                    .map(decode_ice_servers)
                    .unwrap_or_default(),
                unsafe { opt_str_arg(config.name, "name") }?.map(str::to_string),
            ),
            None => (Vec::new(), None),
        };
        let factory = GlobalFactory::instance_ptr()?;
        let pc = create_peer_connection(factory, &ConnectionConfig { ice_servers }, name)?;
        unsafe { write_out(handle, into_handle(pc)) }
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_register_connected_callback(
    handle: Handle,
    callback: Option<MbConnectedCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(handle, "mb_peer_connection_register_connected_callback", |pc| {
        pc.register_connected_callback(callback.map(|callback| {
            Arc::new(move |_: &()| unsafe { callback(user.get()) }) as Callback<()>
        }))
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_register_ice_state_changed_callback(
    handle: Handle,
    callback: Option<MbIceStateChangedCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(handle, "mb_peer_connection_register_ice_state_changed_callback", |pc| {
        pc.register_ice_state_changed_callback(callback.map(|callback| {
            Arc::new(move |state: &IceConnectionState| unsafe { callback(user.get(), *state as i32) })
                as Callback<IceConnectionState>
        }))
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_register_ice_gathering_state_changed_callback(
    handle: Handle,
    callback: Option<MbIceGatheringStateChangedCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(
        handle,
        "mb_peer_connection_register_ice_gathering_state_changed_callback",
        |pc| {
            pc.register_ice_gathering_state_changed_callback(callback.map(|callback| {
                Arc::new(move |state: &IceGatheringState| unsafe { callback(user.get(), *state as i32) })
                    as Callback<IceGatheringState>
            }))
        },
    )
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_register_renegotiation_needed_callback(
    handle: Handle,
    callback: Option<MbRenegotiationNeededCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(handle, "mb_peer_connection_register_renegotiation_needed_callback", |pc| {
        pc.register_renegotiation_needed_callback(callback.map(|callback| {
            Arc::new(move |_: &()| unsafe { callback(user.get()) }) as Callback<()>
        }))
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_register_ice_candidate_ready_callback(
    handle: Handle,
    callback: Option<MbIceCandidateReadyCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(handle, "mb_peer_connection_register_ice_candidate_ready_callback", |pc| {
        pc.register_ice_candidate_ready_callback(callback.map(|callback| {
            Arc::new(move |candidate: &IceCandidate| {
                let sdp_mid = to_cstring(&candidate.sdp_mid);
                let text = to_cstring(&candidate.candidate);
                let raw = MbIceCandidate {
                    sdp_mid: sdp_mid.as_ptr(),
                    candidate: text.as_ptr(),
                    sdp_mline_index: candidate.sdp_mline_index,
                };
                unsafe { callback(user.get(), &raw) }
            }) as Callback<IceCandidate>
        }))
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_register_local_sdp_ready_callback(
    handle: Handle,
    callback: Option<MbLocalSdpReadyCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(handle, "mb_peer_connection_register_local_sdp_ready_callback", |pc| {
        pc.register_local_sdp_ready_callback(callback.map(|callback| {
            Arc::new(move |local: &LocalSdp| {
                let sdp = to_cstring(&local.sdp);
                unsafe { callback(user.get(), local.sdp_type as i32, sdp.as_ptr()) }
            }) as Callback<LocalSdp>
        }))
    })
}

fn track_callback(callback: MbTrackCallback, user: UserData) -> Callback<TrackEvent> {
    Arc::new(move |event: &TrackEvent| {
        let name = to_cstring(&event.track.name());
        let media_kind = event
            .track
            .as_media_track()
            .map(|track| track.kind())
            .unwrap_or(MediaKind::Audio);
        let info = MbTrackInfo {
            track: borrowed_handle(&event.track),
            transceiver: borrowed_handle(&event.transceiver),
            media_kind: media_kind as u32,
            name: name.as_ptr(),
        };
        unsafe { callback(user.get(), &info) }
    })
}

fn data_channel_callback(
    callback: MbDataChannelCallback,
    user: UserData,
) -> Callback<Arc<TrackedObject>> {
    Arc::new(move |channel: &Arc<TrackedObject>| {
        let (id, label) = match channel.as_data_channel() {
            Ok(dc) => (dc.id() as i32, dc.label()),
            Err(_) => (-1, String::new()),
        };
        let label = to_cstring(&label);
        let info = MbDataChannelInfo {
            data_channel: borrowed_handle(channel),
            id,
            label: label.as_ptr(),
        };
        unsafe { callback(user.get(), &info) }
    })
}

/// The track and transceiver handles are borrowed; add a reference to keep
/// them past the callback
#[no_mangle]
pub extern "C" fn mb_peer_connection_register_track_added_callback(
    handle: Handle,
    callback: Option<MbTrackCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(handle, "mb_peer_connection_register_track_added_callback", |pc| {
        pc.register_track_added_callback(callback.map(|callback| track_callback(callback, user)))
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_register_track_removed_callback(
    handle: Handle,
    callback: Option<MbTrackCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(handle, "mb_peer_connection_register_track_removed_callback", |pc| {
        pc.register_track_removed_callback(callback.map(|callback| track_callback(callback, user)))
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_register_data_channel_added_callback(
    handle: Handle,
    callback: Option<MbDataChannelCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(handle, "mb_peer_connection_register_data_channel_added_callback", |pc| {
        pc.register_data_channel_added_callback(
            callback.map(|callback| data_channel_callback(callback, user)),
        )
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_register_data_channel_removed_callback(
    handle: Handle,
    callback: Option<MbDataChannelCallback>,
    user_data: *mut c_void,
) {
    let user = UserData::new(user_data);
    register(handle, "mb_peer_connection_register_data_channel_removed_callback", |pc| {
        pc.register_data_channel_removed_callback(
            callback.map(|callback| data_channel_callback(callback, user)),
        )
    })
}

/// Add a transceiver; `transceiver` receives a new reference
///
/// # Safety
/// `init` must point to a valid structure and `transceiver` must be valid
/// for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_peer_connection_add_transceiver(
    handle: Handle,
    init: *const MbTransceiverInit,
    transceiver: *mut Handle,
) -> ResultCode {
    guard("mb_peer_connection_add_transceiver", || {
        let object = peer_connection(handle)?;
        let init = unsafe { init.as_ref() }
            .ok_or_else(|| InteropError::InvalidParameter("init is null".to_string()))?;
        if transceiver.is_null() {
            return Err(InteropError::InvalidParameter("transceiver is null".to_string()));
        }
        let kind = MediaKind::from_raw(init.media_kind).ok_or_else(|| {
            InteropError::InvalidParameter(format!("unknown media kind {}", init.media_kind))
        })?;
        let direction = TransceiverDirection::from_raw(init.direction).ok_or_else(|| {
            InteropError::InvalidParameter(format!("unknown direction {}", init.direction))
        })?;
        let name = unsafe { opt_str_arg(init.name, "name") }?.map(str::to_string);
        let created = object
            .as_peer_connection()?
            .add_transceiver(&object, kind, name, direction)?;
        unsafe { write_out(transceiver, into_handle(created)) }
    })
}

/// Create a data channel; `data_channel` receives a new reference
///
/// # Safety
/// `config` must point to a valid structure and `data_channel` must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn mb_peer_connection_add_data_channel(
    handle: Handle,
    config: *const MbDataChannelConfig,
    data_channel: *mut Handle,
) -> ResultCode {
    guard("mb_peer_connection_add_data_channel", || {
        let object = peer_connection(handle)?;
        let config = unsafe { config.as_ref() }
            .ok_or_else(|| InteropError::InvalidParameter("config is null".to_string()))?;
        if data_channel.is_null() {
            return Err(InteropError::InvalidParameter("data_channel is null".to_string()));
        }
        let id = match config.id {
            -1 => None,
            id => Some(u16::try_from(id).map_err(|_| {
                InteropError::OutOfRange(format!("data channel id {}", id))
            })?),
        };
        let label = unsafe { opt_str_arg(config.label, "label") }?
            .unwrap_or_default()
            .to_string();
        let created = object.as_peer_connection()?.add_data_channel(
            &object,
            &DataChannelConfig {
                id,
                label,
                ordered: config.ordered != MB_FALSE,
                reliable: config.reliable != MB_FALSE,
            },
        )?;
        unsafe { write_out(data_channel, into_handle(created)) }
    })
}

/// Close a data channel; the caller still owns its references
#[no_mangle]
pub extern "C" fn mb_peer_connection_remove_data_channel(handle: Handle, data_channel: Handle) -> ResultCode {
    guard("mb_peer_connection_remove_data_channel", || {
        let object = peer_connection(handle)?;
        let channel = super::object(data_channel)?;
        object.as_peer_connection()?.remove_data_channel(&channel)
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_create_offer(handle: Handle) -> ResultCode {
    guard("mb_peer_connection_create_offer", || {
        peer_connection(handle)?.as_peer_connection()?.create_offer()
    })
}

#[no_mangle]
pub extern "C" fn mb_peer_connection_create_answer(handle: Handle) -> ResultCode {
    guard("mb_peer_connection_create_answer", || {
        peer_connection(handle)?.as_peer_connection()?.create_answer()
    })
}

/// # Safety
/// `sdp` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mb_peer_connection_set_remote_description(
    handle: Handle,
    sdp_type: i32,
    sdp: *const c_char,
) -> ResultCode {
    guard("mb_peer_connection_set_remote_description", || {
        let object = peer_connection(handle)?;
        let sdp_type = SdpType::from_raw(sdp_type)
            .ok_or_else(|| InteropError::InvalidParameter(format!("unknown SDP type {}", sdp_type)))?;
        let sdp = unsafe { str_arg(sdp, "sdp") }?;
        object.as_peer_connection()?.set_remote_description(sdp_type, sdp)
    })
}

/// # Safety
/// `candidate` must point to a valid structure.
#[no_mangle]
pub unsafe extern "C" fn mb_peer_connection_add_ice_candidate(
    handle: Handle,
    candidate: *const MbIceCandidate,
) -> ResultCode {
    guard("mb_peer_connection_add_ice_candidate", || {
        let object = peer_connection(handle)?;
        let candidate = unsafe { candidate.as_ref() }
            .ok_or_else(|| InteropError::InvalidParameter("candidate is null".to_string()))?;
        let candidate = IceCandidate {
            sdp_mid: unsafe { opt_str_arg(candidate.sdp_mid, "sdp_mid") }?
                .unwrap_or_default()
                .to_string(),
            candidate: unsafe { str_arg(candidate.candidate, "candidate") }?.to_string(),
            sdp_mline_index: candidate.sdp_mline_index,
        };
        object.as_peer_connection()?.add_ice_candidate(&candidate)
    })
}

/// Close the connection; the handle stays valid until released
#[no_mangle]
pub extern "C" fn mb_peer_connection_close(handle: Handle) -> ResultCode {
    guard("mb_peer_connection_close", || {
        peer_connection(handle)?.as_peer_connection()?.close();
        Ok(())
    })
}
