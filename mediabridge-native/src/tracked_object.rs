//! Reference-counted objects exposed through the ABI
//!
//! Every peer connection, transceiver, track, track source and data channel
//! is a [`TrackedObject`] living in an `Arc`. The strong count of that `Arc`
//! is the object's reference count; handles are raw `Arc` pointers (see
//! `handle.rs`). Construction registers the object with its factory and
//! holds a factory reference; destruction disconnects the engine first,
//! then deregisters, then releases the factory reference.
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


use crate::data_channel::DataChannel;
use crate::engine::{EngineEvent, EngineEventSink, SinkRef};
use crate::error::{InteropError, InteropResult};
use crate::global_factory::FactoryRef;
use crate::media_track::MediaTrack;
use crate::peer_connection::PeerConnection;
use crate::registry::ObjectKey;
use crate::track_source::TrackSource;
use crate::transceiver::Transceiver;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Type tag of a tracked object
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    PeerConnection = 0,
    LocalAudioTrack = 1,
    LocalVideoTrack = 2,
    RemoteAudioTrack = 3,
    RemoteVideoTrack = 4,
    DataChannel = 5,
    AudioTransceiver = 6,
    VideoTransceiver = 7,
    DeviceAudioTrackSource = 8,
    DeviceVideoTrackSource = 9,
    ExternalVideoTrackSource = 10,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Type and name of an object, shared with the registry
pub struct ObjectLabel {
    object_type: ObjectType,
    name: Mutex<String>,
}

impl ObjectLabel {
    pub fn new(object_type: ObjectType, name: String) -> Self {
        Self {
            object_type,
            name: Mutex::new(name),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.lock() = name;
    }
}

/// Family-specific state of a tracked object
pub enum ObjectPayload {
    PeerConnection(PeerConnection),
    Transceiver(Transceiver),
    MediaTrack(MediaTrack),
    TrackSource(TrackSource),
    DataChannel(DataChannel),
}

impl ObjectPayload {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectPayload::PeerConnection(_) => ObjectType::PeerConnection,
            ObjectPayload::Transceiver(transceiver) => transceiver.object_type(),
            ObjectPayload::MediaTrack(track) => track.object_type(),
            ObjectPayload::TrackSource(source) => source.object_type(),
            ObjectPayload::DataChannel(_) => ObjectType::DataChannel,
        }
    }

    /// Start receiving engine events
    fn connect(&self, sink: SinkRef) {
        match self {
            ObjectPayload::PeerConnection(pc) => pc.connect(sink),
            ObjectPayload::MediaTrack(track) => track.connect(sink),
            ObjectPayload::DataChannel(channel) => channel.connect(sink),
            ObjectPayload::Transceiver(_) | ObjectPayload::TrackSource(_) => {}
        }
    }

    /// Stop receiving engine events and close every callback slot
    fn disconnect(&self) {
        match self {
            ObjectPayload::PeerConnection(pc) => pc.disconnect(),
            ObjectPayload::Transceiver(transceiver) => transceiver.disconnect(),
            ObjectPayload::MediaTrack(track) => track.disconnect(),
            ObjectPayload::DataChannel(channel) => channel.disconnect(),
            ObjectPayload::TrackSource(_) => {}
        }
    }

    fn teardown(&self) {
        match self {
            ObjectPayload::PeerConnection(pc) => pc.teardown(),
            ObjectPayload::DataChannel(channel) => channel.teardown(),
            ObjectPayload::Transceiver(_)
            | ObjectPayload::MediaTrack(_)
            | ObjectPayload::TrackSource(_) => {}
        }
    }
}

/// Object shared with the calling layer through a handle
pub struct TrackedObject {
    label: Arc<ObjectLabel>,
    user_data: AtomicPtr<c_void>,
    key: ObjectKey,
    address: usize,
    payload: ObjectPayload,
    /// Declared last so it is released after everything else is torn down
    factory: FactoryRef,
}

impl TrackedObject {
    /// Register a new object with the factory of `factory` and connect it
    /// to its engine events
    ///
    /// An empty or missing name is replaced by a random one.
    pub fn create(factory: FactoryRef, name: Option<String>, payload: ObjectPayload) -> Arc<Self> {
        let object_type = payload.object_type();
        let name = name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let label = Arc::new(ObjectLabel::new(object_type, name));

        let object = Arc::new_cyclic(|weak| {
            let address = weak.as_ptr() as usize;
            let key = factory
                .factory()
                .add_object(Arc::clone(&label), weak.clone(), address);
            TrackedObject {
                label,
                user_data: AtomicPtr::new(std::ptr::null_mut()),
                key,
                address,
                payload,
                factory,
            }
        });

        let weak = Arc::downgrade(&object);
        let sink: SinkRef = weak;
        object.payload.connect(sink);
        debug!(object = %object, "Object created");
        object
    }

    pub fn object_type(&self) -> ObjectType {
        self.label.object_type()
    }

    pub fn name(&self) -> String {
        self.label.name()
    }

    pub fn set_name(&self, name: String) {
        self.label.set_name(name);
    }

    pub fn user_data(&self) -> *mut c_void {
        self.user_data.load(Ordering::Acquire)
    }

    pub fn set_user_data(&self, user_data: *mut c_void) {
        self.user_data.store(user_data, Ordering::Release);
    }

    /// Best-effort reference count, for diagnostics only
    pub fn approx_ref_count(self: &Arc<Self>) -> usize {
        Arc::strong_count(self)
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn factory(&self) -> &FactoryRef {
        &self.factory
    }

    pub fn payload(&self) -> &ObjectPayload {
        &self.payload
    }

    pub fn as_peer_connection(&self) -> InteropResult<&PeerConnection> {
        match &self.payload {
            ObjectPayload::PeerConnection(pc) => Ok(pc),
            _ => Err(self.wrong_family("peer connection")),
        }
    }

    pub fn as_transceiver(&self) -> InteropResult<&Transceiver> {
        match &self.payload {
            ObjectPayload::Transceiver(transceiver) => Ok(transceiver),
            _ => Err(self.wrong_family("transceiver")),
        }
    }

    pub fn as_media_track(&self) -> InteropResult<&MediaTrack> {
        match &self.payload {
            ObjectPayload::MediaTrack(track) => Ok(track),
            _ => Err(self.wrong_family("media track")),
        }
    }

    pub fn as_track_source(&self) -> InteropResult<&TrackSource> {
        match &self.payload {
            ObjectPayload::TrackSource(source) => Ok(source),
            _ => Err(self.wrong_family("track source")),
        }
    }

    pub fn as_data_channel(&self) -> InteropResult<&DataChannel> {
        match &self.payload {
            ObjectPayload::DataChannel(channel) => Ok(channel),
            _ => Err(self.wrong_family("data channel")),
        }
    }

    fn wrong_family(&self, expected: &str) -> InteropError {
        InteropError::InvalidNativeHandle(format!("{} is not a {}", self, expected))
    }
}

impl EngineEventSink for TrackedObject {
    fn on_engine_event(&self, event: EngineEvent) {
        match &self.payload {
            ObjectPayload::PeerConnection(pc) => pc.handle_event(self, event),
            ObjectPayload::MediaTrack(track) => track.handle_event(event),
            ObjectPayload::DataChannel(channel) => channel.handle_event(event),
            ObjectPayload::Transceiver(_) | ObjectPayload::TrackSource(_) => {
                debug!(object = %self, ?event, "Ignoring engine event");
            }
        }
    }
}

impl Drop for TrackedObject {
    fn drop(&mut self) {
        // No callback may run once destruction has started.
        self.payload.disconnect();
        self.payload.teardown();
        self.factory.factory().remove_object(self.key, self.address);
        debug!(object = %self, "Object destroyed");
    }
}

impl fmt::Display for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.object_type(), self.name())
    }
}

impl fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedObject")
            .field("object_type", &self.object_type())
            .field("name", &self.name())
            .field("address", &format_args!("{:#x}", self.address))
            .finish()
    }
}
