//! Seam to the external media engine
//!
//! The interop layer never implements media transport. It drives an engine
//! through these traits: an [`EngineProvider`] builds the engine factory once
//! the background queues exist, and the factory creates connections, data
//! channels and track sources. Engine objects report back through a weakly
//! held [`EngineEventSink`], so an event racing with the destruction of its
//! wrapper object is simply dropped.
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


pub mod loopback;

pub use loopback::LoopbackProvider;

use crate::backend::{EngineQueues, TaskQueue};
use crate::error::InteropResult;
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Weak};

/// Kind of media carried by a track or transceiver
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio = 0,
    Video = 1,
}

impl MediaKind {
    pub fn from_raw(value: u32) -> Option<MediaKind> {
        match value {
            0 => Some(MediaKind::Audio),
            1 => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransceiverDirection {
    #[default]
    SendRecv = 0,
    SendOnly = 1,
    RecvOnly = 2,
    Inactive = 3,
}

impl TransceiverDirection {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::SendRecv),
            1 => Some(Self::SendOnly),
            2 => Some(Self::RecvOnly),
            3 => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New = 0,
    Checking = 1,
    Connected = 2,
    Completed = 3,
    Failed = 4,
    Disconnected = 5,
    Closed = 6,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New = 0,
    Gathering = 1,
    Complete = 2,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer = 1,
    Answer = 2,
}

impl SdpType {
    pub fn from_raw(value: i32) -> Option<SdpType> {
        match value {
            1 => Some(SdpType::Offer),
            2 => Some(SdpType::Answer),
            _ => None,
        }
    }
}

/// STUN or TURN server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelConfig {
    /// Negotiated id, or `None` to let the engine pick one
    pub id: Option<u16>,
    pub label: String,
    pub ordered: bool,
    pub reliable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub sdp_mid: String,
    pub candidate: String,
    pub sdp_mline_index: i32,
}

/// Pixel layout of a video frame
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    I420 = 0,
    Argb32 = 1,
}

impl FrameFormat {
    pub fn from_raw(value: u32) -> Option<FrameFormat> {
        match value {
            0 => Some(FrameFormat::I420),
            1 => Some(FrameFormat::Argb32),
            _ => None,
        }
    }

    /// Minimum buffer size for a frame of this format
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            FrameFormat::I420 => {
                let chroma = (width as usize).div_ceil(2) * (height as usize).div_ceil(2);
                pixels + 2 * chroma
            }
            FrameFormat::Argb32 => pixels * 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCaptureDevice {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoCaptureFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    /// FOURCC code of the native pixel format
    pub fourcc: u32,
}

/// Notification raised by an engine object
#[derive(Clone)]
pub enum EngineEvent {
    Connected,
    IceStateChanged(IceConnectionState),
    IceGatheringStateChanged(IceGatheringState),
    RenegotiationNeeded,
    IceCandidateReady(IceCandidate),
    LocalSdpReady { sdp_type: SdpType, sdp: String },
    TrackAdded { kind: MediaKind, name: String, mline_index: u32 },
    TrackRemoved { name: String },
    /// Channel opened by the remote peer
    DataChannelAdded(Arc<dyn EngineDataChannel>),
    DataChannelRemoved { id: u16 },
    DataChannelState(DataChannelState),
    DataChannelMessage(Bytes),
    DataChannelBuffering { previous: u64, current: u64, limit: u64 },
    Frame(VideoFrame),
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::DataChannelAdded(channel) => f
                .debug_tuple("DataChannelAdded")
                .field(&channel.id())
                .finish(),
            EngineEvent::DataChannelMessage(data) => {
                f.debug_tuple("DataChannelMessage").field(&data.len()).finish()
            }
            EngineEvent::Frame(frame) => f
                .debug_tuple("Frame")
                .field(&(frame.width, frame.height))
                .finish(),
            EngineEvent::Connected => write!(f, "Connected"),
            EngineEvent::IceStateChanged(state) => f.debug_tuple("IceStateChanged").field(state).finish(),
            EngineEvent::IceGatheringStateChanged(state) => {
                f.debug_tuple("IceGatheringStateChanged").field(state).finish()
            }
            EngineEvent::RenegotiationNeeded => write!(f, "RenegotiationNeeded"),
            EngineEvent::IceCandidateReady(candidate) => {
                f.debug_tuple("IceCandidateReady").field(candidate).finish()
            }
            EngineEvent::LocalSdpReady { sdp_type, .. } => {
                f.debug_struct("LocalSdpReady").field("sdp_type", sdp_type).finish()
            }
            EngineEvent::TrackAdded { kind, name, .. } => f
                .debug_struct("TrackAdded")
                .field("kind", kind)
                .field("name", name)
                .finish(),
            EngineEvent::TrackRemoved { name } => f.debug_struct("TrackRemoved").field("name", name).finish(),
            EngineEvent::DataChannelRemoved { id } => {
                f.debug_struct("DataChannelRemoved").field("id", id).finish()
            }
            EngineEvent::DataChannelState(state) => f.debug_tuple("DataChannelState").field(state).finish(),
            EngineEvent::DataChannelBuffering { current, .. } => {
                f.debug_struct("DataChannelBuffering").field("current", current).finish()
            }
        }
    }
}

/// Receiver of engine events, held weakly by engine objects
pub trait EngineEventSink: Send + Sync {
    fn on_engine_event(&self, event: EngineEvent);
}

pub type SinkRef = Weak<dyn EngineEventSink>;

/// Deliver `event` to `sink` on `queue`, if the sink is still alive by then
pub fn deliver(queue: &dyn TaskQueue, sink: &SinkRef, event: EngineEvent) {
    let sink = sink.clone();
    queue.post(Box::new(move || {
        if let Some(sink) = sink.upgrade() {
            sink.on_engine_event(event);
        }
    }));
}

/// Builds the engine factory on top of started background queues
pub trait EngineProvider: Send + Sync {
    fn name(&self) -> &str;

    fn create_factory(&self, queues: &EngineQueues) -> InteropResult<Arc<dyn EngineFactory>>;
}

/// Engine-side factory for every media object
pub trait EngineFactory: Send + Sync {
    fn create_connection(&self, config: &ConnectionConfig) -> InteropResult<Arc<dyn EngineConnection>>;

    fn create_device_audio_source(&self) -> InteropResult<Arc<dyn EngineTrackSource>>;

    /// `None` selects the first available device
    fn create_device_video_source(
        &self,
        device_id: Option<&str>,
    ) -> InteropResult<Arc<dyn EngineTrackSource>>;

    fn create_external_video_source(&self) -> InteropResult<Arc<dyn EngineTrackSource>>;

    fn video_capture_devices(&self) -> InteropResult<Vec<VideoCaptureDevice>>;

    fn video_capture_formats(&self, device_id: &str) -> InteropResult<Vec<VideoCaptureFormat>>;
}

pub trait EngineConnection: Send + Sync {
    fn attach(&self, sink: SinkRef);

    /// Stop delivering events. Events already queued are dropped once the
    /// sink can no longer be upgraded.
    fn detach(&self);

    /// Returns the media line index of the new transceiver
    fn add_transceiver(&self, kind: MediaKind, name: &str) -> InteropResult<u32>;

    fn set_transceiver_direction(&self, mline_index: u32, direction: TransceiverDirection) -> InteropResult<()>;

    fn create_data_channel(&self, config: &DataChannelConfig) -> InteropResult<Arc<dyn EngineDataChannel>>;

    fn create_offer(&self) -> InteropResult<()>;

    fn create_answer(&self) -> InteropResult<()>;

    fn set_remote_description(&self, sdp_type: SdpType, sdp: &str) -> InteropResult<()>;

    fn add_ice_candidate(&self, candidate: &IceCandidate) -> InteropResult<()>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

pub trait EngineDataChannel: Send + Sync {
    fn id(&self) -> u16;

    fn label(&self) -> String;

    fn ordered(&self) -> bool;

    fn reliable(&self) -> bool;

    fn attach(&self, sink: SinkRef);

    fn detach(&self);

    fn state(&self) -> DataChannelState;

    fn send(&self, data: &[u8]) -> InteropResult<()>;

    fn close(&self);
}

pub trait EngineTrackSource: Send + Sync {
    fn kind(&self) -> MediaKind;

    /// Register a frame consumer, returns its subscription id
    fn subscribe(&self, sink: SinkRef) -> u64;

    fn unsubscribe(&self, subscription: u64);

    /// Inject a frame; only external sources accept frames
    fn push_frame(&self, frame: VideoFrame) -> InteropResult<()>;
}
