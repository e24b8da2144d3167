//! In-process loopback engine
//!
//! Default engine provider. It performs no networking: offers and answers
//! are synthesized from the local transceiver list, remote descriptions
//! announce one remote track per media line, data channels echo what they
//! send, and external video sources forward pushed frames to subscribers.
//! Every event is delivered asynchronously on the engine queues, like a
//! real engine would.
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


use super::{
    deliver, ConnectionConfig, DataChannelConfig, DataChannelState, EngineConnection,
    EngineDataChannel, EngineEvent, EngineFactory, EngineProvider, EngineTrackSource,
    IceCandidate, IceConnectionState, IceGatheringState, MediaKind, SdpType, SinkRef,
    TransceiverDirection, VideoCaptureDevice, VideoCaptureFormat, VideoFrame,
};
use crate::backend::EngineQueues;
use crate::error::{InteropError, InteropResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

const DEVICE_ID: &str = "loopback-camera-0";
const DEVICE_NAME: &str = "Loopback Camera";
const FOURCC_I420: u32 = u32::from_le_bytes(*b"I420");
/// Buffering limit reported by data channels
const DATA_CHANNEL_BUFFER_LIMIT: u64 = 16 * 1024 * 1024;

/// Provider of the loopback engine
#[derive(Debug, Default, Clone)]
pub struct LoopbackProvider;

impl EngineProvider for LoopbackProvider {
    fn name(&self) -> &str {
        "loopback"
    }

    fn create_factory(&self, queues: &EngineQueues) -> InteropResult<Arc<dyn EngineFactory>> {
        Ok(Arc::new(LoopbackFactory {
            queues: queues.clone(),
        }))
    }
}

struct LoopbackFactory {
    queues: EngineQueues,
}

impl EngineFactory for LoopbackFactory {
    fn create_connection(&self, config: &ConnectionConfig) -> InteropResult<Arc<dyn EngineConnection>> {
        for server in &config.ice_servers {
            if server.urls.is_empty() {
                return Err(InteropError::InvalidParameter(
                    "ICE server without any URL".to_string(),
                ));
            }
        }
        debug!(ice_servers = config.ice_servers.len(), "Creating loopback connection");
        Ok(Arc::new(LoopbackConnection {
            queues: self.queues.clone(),
            sink: Mutex::new(None),
            state: Mutex::new(ConnectionState::default()),
        }))
    }

    fn create_device_audio_source(&self) -> InteropResult<Arc<dyn EngineTrackSource>> {
        Ok(Arc::new(LoopbackTrackSource::new(
            self.queues.clone(),
            MediaKind::Audio,
            false,
        )))
    }

    fn create_device_video_source(
        &self,
        device_id: Option<&str>,
    ) -> InteropResult<Arc<dyn EngineTrackSource>> {
        match device_id {
            None | Some(DEVICE_ID) => Ok(Arc::new(LoopbackTrackSource::new(
                self.queues.clone(),
                MediaKind::Video,
                false,
            ))),
            Some(other) => Err(InteropError::NotFound(format!(
                "video capture device '{}'",
                other
            ))),
        }
    }

    fn create_external_video_source(&self) -> InteropResult<Arc<dyn EngineTrackSource>> {
        Ok(Arc::new(LoopbackTrackSource::new(
            self.queues.clone(),
            MediaKind::Video,
            true,
        )))
    }

    fn video_capture_devices(&self) -> InteropResult<Vec<VideoCaptureDevice>> {
        Ok(vec![VideoCaptureDevice {
            id: DEVICE_ID.to_string(),
            name: DEVICE_NAME.to_string(),
        }])
    }

    fn video_capture_formats(&self, device_id: &str) -> InteropResult<Vec<VideoCaptureFormat>> {
        if device_id != DEVICE_ID {
            return Err(InteropError::NotFound(format!(
                "video capture device '{}'",
                device_id
            )));
        }
        Ok([(640, 480), (1280, 720), (1920, 1080)]
            .into_iter()
            .map(|(width, height)| VideoCaptureFormat {
                width,
                height,
                framerate: 30.0,
                fourcc: FOURCC_I420,
            })
            .collect())
    }
}

#[derive(Default)]
struct ConnectionState {
    closed: bool,
    transceivers: Vec<(MediaKind, String, TransceiverDirection)>,
    next_channel_id: u16,
    offer_sent: bool,
    remote_offer: bool,
    remote_tracks: usize,
}

struct LoopbackConnection {
    queues: EngineQueues,
    sink: Mutex<Option<SinkRef>>,
    state: Mutex<ConnectionState>,
}

impl LoopbackConnection {
    fn emit(&self, event: EngineEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            deliver(self.queues.signaling.as_ref(), &sink, event);
        }
    }

    fn open_state(&self) -> InteropResult<parking_lot::MutexGuard<'_, ConnectionState>> {
        let state = self.state.lock();
        if state.closed {
            return Err(InteropError::PeerConnectionClosed);
        }
        Ok(state)
    }

    fn local_description(transceivers: &[(MediaKind, String, TransceiverDirection)]) -> String {
        let mut sdp = String::from("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n");
        for (mid, (kind, name, direction)) in transceivers.iter().enumerate() {
            let (media, payload) = match kind {
                MediaKind::Audio => ("audio", 111),
                MediaKind::Video => ("video", 96),
            };
            let direction = match direction {
                TransceiverDirection::SendRecv => "sendrecv",
                TransceiverDirection::SendOnly => "sendonly",
                TransceiverDirection::RecvOnly => "recvonly",
                TransceiverDirection::Inactive => "inactive",
            };
            let _ = write!(
                sdp,
                "m={} 9 UDP/TLS/RTP/SAVPF {}\r\na=mid:{}\r\na={}\r\na=msid:- {}\r\n",
                media, payload, mid, direction, name
            );
        }
        sdp
    }

    fn gather_candidates(&self, media_lines: usize) {
        self.emit(EngineEvent::IceGatheringStateChanged(IceGatheringState::Gathering));
        for mline in 0..media_lines.max(1) {
            self.emit(EngineEvent::IceCandidateReady(IceCandidate {
                sdp_mid: mline.to_string(),
                candidate: format!(
                    "candidate:{} 1 udp 2122260223 127.0.0.1 {} typ host",
                    mline + 1,
                    50000 + mline
                ),
                sdp_mline_index: mline as i32,
            }));
        }
        self.emit(EngineEvent::IceGatheringStateChanged(IceGatheringState::Complete));
    }

    fn connect(&self) {
        self.emit(EngineEvent::IceStateChanged(IceConnectionState::Checking));
        self.emit(EngineEvent::IceStateChanged(IceConnectionState::Connected));
        self.emit(EngineEvent::Connected);
    }
}

impl EngineConnection for LoopbackConnection {
    fn attach(&self, sink: SinkRef) {
        *self.sink.lock() = Some(sink);
    }

    fn detach(&self) {
        self.sink.lock().take();
    }

    fn add_transceiver(&self, kind: MediaKind, name: &str) -> InteropResult<u32> {
        let mline_index = {
            let mut state = self.open_state()?;
            state
                .transceivers
                .push((kind, name.to_string(), TransceiverDirection::SendRecv));
            (state.transceivers.len() - 1) as u32
        };
        self.emit(EngineEvent::RenegotiationNeeded);
        Ok(mline_index)
    }

    fn set_transceiver_direction(&self, mline_index: u32, direction: TransceiverDirection) -> InteropResult<()> {
        let changed = {
            let mut state = self.open_state()?;
            let transceiver = state
                .transceivers
                .get_mut(mline_index as usize)
                .ok_or_else(|| InteropError::NotFound(format!("media line {}", mline_index)))?;
            let changed = transceiver.2 != direction;
            transceiver.2 = direction;
            changed
        };
        if changed {
            self.emit(EngineEvent::RenegotiationNeeded);
        }
        Ok(())
    }

    fn create_data_channel(&self, config: &DataChannelConfig) -> InteropResult<Arc<dyn EngineDataChannel>> {
        let id = {
            let mut state = self.open_state()?;
            match config.id {
                Some(id) => id,
                None => {
                    let id = state.next_channel_id;
                    state.next_channel_id = state.next_channel_id.wrapping_add(1);
                    id
                }
            }
        };
        Ok(Arc::new(LoopbackDataChannel {
            id,
            label: config.label.clone(),
            ordered: config.ordered,
            reliable: config.reliable,
            queues: self.queues.clone(),
            sink: Mutex::new(None),
            state: Mutex::new(DataChannelState::Connecting),
        }))
    }

    fn create_offer(&self) -> InteropResult<()> {
        let (sdp, media_lines) = {
            let mut state = self.open_state()?;
            state.offer_sent = true;
            (
                Self::local_description(&state.transceivers),
                state.transceivers.len(),
            )
        };
        self.emit(EngineEvent::LocalSdpReady {
            sdp_type: SdpType::Offer,
            sdp,
        });
        self.gather_candidates(media_lines);
        Ok(())
    }

    fn create_answer(&self) -> InteropResult<()> {
        let (sdp, media_lines) = {
            let mut state = self.open_state()?;
            if !state.remote_offer {
                return Err(InteropError::InvalidOperation(
                    "cannot create an answer without a remote offer".to_string(),
                ));
            }
            state.remote_offer = false;
            (
                Self::local_description(&state.transceivers),
                state.transceivers.len(),
            )
        };
        self.emit(EngineEvent::LocalSdpReady {
            sdp_type: SdpType::Answer,
            sdp,
        });
        self.gather_candidates(media_lines);
        self.connect();
        Ok(())
    }

    fn set_remote_description(&self, sdp_type: SdpType, sdp: &str) -> InteropResult<()> {
        let media = parse_media_lines(sdp)?;
        let (new_tracks, connected) = {
            let mut state = self.open_state()?;
            let connected = match sdp_type {
                SdpType::Offer => {
                    state.remote_offer = true;
                    // Media lines the local side does not have yet get a
                    // receive-only transceiver, keeping indexes aligned.
                    let existing = state.transceivers.len();
                    for (kind, name) in media.iter().skip(existing) {
                        state
                            .transceivers
                            .push((*kind, name.clone(), TransceiverDirection::RecvOnly));
                    }
                    false
                }
                SdpType::Answer => {
                    if !state.offer_sent {
                        return Err(InteropError::InvalidOperation(
                            "received an answer without a pending offer".to_string(),
                        ));
                    }
                    state.offer_sent = false;
                    true
                }
            };
            let known = state.remote_tracks;
            state.remote_tracks = state.remote_tracks.max(media.len());
            (media.into_iter().enumerate().skip(known).collect::<Vec<_>>(), connected)
        };

        for (mline_index, (kind, name)) in new_tracks {
            self.emit(EngineEvent::TrackAdded {
                kind,
                name,
                mline_index: mline_index as u32,
            });
        }
        if connected {
            self.connect();
        }
        Ok(())
    }

    fn add_ice_candidate(&self, candidate: &IceCandidate) -> InteropResult<()> {
        let _state = self.open_state()?;
        if candidate.candidate.is_empty() {
            return Err(InteropError::InvalidParameter("empty ICE candidate".to_string()));
        }
        Ok(())
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.emit(EngineEvent::IceStateChanged(IceConnectionState::Closed));
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Media lines of a session description, with their track names
fn parse_media_lines(sdp: &str) -> InteropResult<Vec<(MediaKind, String)>> {
    if !sdp.starts_with("v=0") {
        return Err(InteropError::InvalidParameter(
            "session description must start with 'v=0'".to_string(),
        ));
    }
    let mut media: Vec<(MediaKind, String)> = Vec::new();
    for line in sdp.lines().map(str::trim_end) {
        if let Some(rest) = line.strip_prefix("m=") {
            let kind = if rest.starts_with("audio") {
                MediaKind::Audio
            } else if rest.starts_with("video") {
                MediaKind::Video
            } else {
                continue;
            };
            let name = format!("remote_{}_{}", kind, media.len());
            media.push((kind, name));
        } else if let Some(msid) = line.strip_prefix("a=msid:") {
            if let (Some(last), Some(track)) = (media.last_mut(), msid.split_whitespace().nth(1)) {
                last.1 = track.to_string();
            }
        }
    }
    Ok(media)
}

struct LoopbackDataChannel {
    id: u16,
    label: String,
    ordered: bool,
    reliable: bool,
    queues: EngineQueues,
    sink: Mutex<Option<SinkRef>>,
    state: Mutex<DataChannelState>,
}

impl LoopbackDataChannel {
    fn emit(&self, event: EngineEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            deliver(self.queues.signaling.as_ref(), &sink, event);
        }
    }
}

impl EngineDataChannel for LoopbackDataChannel {
    fn id(&self) -> u16 {
        self.id
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn ordered(&self) -> bool {
        self.ordered
    }

    fn reliable(&self) -> bool {
        self.reliable
    }

    fn attach(&self, sink: SinkRef) {
        *self.sink.lock() = Some(sink);
        let opened = {
            let mut state = self.state.lock();
            let opened = *state == DataChannelState::Connecting;
            if opened {
                *state = DataChannelState::Open;
            }
            opened
        };
        if opened {
            self.emit(EngineEvent::DataChannelState(DataChannelState::Open));
        }
    }

    fn detach(&self) {
        self.sink.lock().take();
    }

    fn state(&self) -> DataChannelState {
        *self.state.lock()
    }

    fn send(&self, data: &[u8]) -> InteropResult<()> {
        if *self.state.lock() != DataChannelState::Open {
            return Err(InteropError::InvalidOperation(format!(
                "data channel {} is not open",
                self.id
            )));
        }
        let size = data.len() as u64;
        self.emit(EngineEvent::DataChannelBuffering {
            previous: 0,
            current: size,
            limit: DATA_CHANNEL_BUFFER_LIMIT,
        });
        self.emit(EngineEvent::DataChannelMessage(Bytes::copy_from_slice(data)));
        self.emit(EngineEvent::DataChannelBuffering {
            previous: size,
            current: 0,
            limit: DATA_CHANNEL_BUFFER_LIMIT,
        });
        Ok(())
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == DataChannelState::Closed {
                return;
            }
            *state = DataChannelState::Closed;
        }
        self.emit(EngineEvent::DataChannelState(DataChannelState::Closed));
    }
}

struct LoopbackTrackSource {
    queues: EngineQueues,
    kind: MediaKind,
    external: bool,
    subscribers: Mutex<Subscribers>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    sinks: Vec<(u64, SinkRef)>,
}

impl LoopbackTrackSource {
    fn new(queues: EngineQueues, kind: MediaKind, external: bool) -> Self {
        Self {
            queues,
            kind,
            external,
            subscribers: Mutex::new(Subscribers {
                next_id: 1,
                sinks: Vec::new(),
            }),
        }
    }
}

impl EngineTrackSource for LoopbackTrackSource {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn subscribe(&self, sink: SinkRef) -> u64 {
        let mut subscribers = self.subscribers.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.sinks.push((id, sink));
        id
    }

    fn unsubscribe(&self, subscription: u64) {
        self.subscribers
            .lock()
            .sinks
            .retain(|(id, _)| *id != subscription);
    }

    fn push_frame(&self, frame: VideoFrame) -> InteropResult<()> {
        if !self.external {
            return Err(InteropError::Unsupported(
                "only external sources accept frames".to_string(),
            ));
        }
        let required = frame.format.frame_size(frame.width, frame.height);
        if frame.width == 0 || frame.height == 0 || frame.data.len() < required {
            return Err(InteropError::InvalidParameter(format!(
                "{}x{} frame needs {} bytes, got {}",
                frame.width,
                frame.height,
                required,
                frame.data.len()
            )));
        }
        let sinks: Vec<SinkRef> = self
            .subscribers
            .lock()
            .sinks
            .iter()
            .map(|(_, sink)| sink.clone())
            .collect();
        for sink in sinks {
            deliver(self.queues.worker.as_ref(), &sink, EngineEvent::Frame(frame.clone()));
        }
        Ok(())
    }
}
