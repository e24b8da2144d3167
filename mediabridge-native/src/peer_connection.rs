//! Peer connections
//!
//! A peer connection owns the transceivers, remote tracks and data channels
//! created through it or announced by the remote peer. Those children are
//! tracked objects of their own; the connection keeps one reference to each
//! until it is closed or destroyed.
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


use crate::callback::{Callback, CallbackSlot};
use crate::data_channel::DataChannel;
use crate::engine::{
    ConnectionConfig, DataChannelConfig, EngineConnection, EngineDataChannel, EngineEvent,
    IceCandidate, IceConnectionState, IceGatheringState, IceServer, MediaKind, SdpType, SinkRef,
    TransceiverDirection,
};
use crate::error::{InteropError, InteropResult};
use crate::global_factory::FactoryRef;
use crate::media_track::MediaTrack;
use crate::tracked_object::{ObjectPayload, TrackedObject};
use crate::transceiver::Transceiver;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Local session description produced by an offer or answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSdp {
    pub sdp_type: SdpType,
    pub sdp: String,
}

/// Remote track together with the transceiver carrying it
///
/// Both objects are borrowed for the duration of the callback.
#[derive(Clone)]
pub struct TrackEvent {
    pub track: Arc<TrackedObject>,
    pub transceiver: Arc<TrackedObject>,
}

/// Callback slots of a peer connection
#[derive(Default)]
pub struct PeerConnectionCallbacks {
    pub connected: CallbackSlot<()>,
    pub ice_state_changed: CallbackSlot<IceConnectionState>,
    pub ice_gathering_state_changed: CallbackSlot<IceGatheringState>,
    pub renegotiation_needed: CallbackSlot<()>,
    pub ice_candidate_ready: CallbackSlot<IceCandidate>,
    pub local_sdp_ready: CallbackSlot<LocalSdp>,
    pub track_added: CallbackSlot<TrackEvent>,
    pub track_removed: CallbackSlot<TrackEvent>,
    pub data_channel_added: CallbackSlot<Arc<TrackedObject>>,
    pub data_channel_removed: CallbackSlot<Arc<TrackedObject>>,
}

impl PeerConnectionCallbacks {
    fn close_all(&self) {
        self.connected.close();
        self.ice_state_changed.close();
        self.ice_gathering_state_changed.close();
        self.renegotiation_needed.close();
        self.ice_candidate_ready.close();
        self.local_sdp_ready.close();
        self.track_added.close();
        self.track_removed.close();
        self.data_channel_added.close();
        self.data_channel_removed.close();
    }
}

#[derive(Default)]
struct Children {
    transceivers: Vec<Arc<TrackedObject>>,
    remote_tracks: Vec<Arc<TrackedObject>>,
    data_channels: Vec<Arc<TrackedObject>>,
}

pub struct PeerConnection {
    engine: Arc<dyn EngineConnection>,
    callbacks: PeerConnectionCallbacks,
    children: Mutex<Children>,
}

impl PeerConnection {
    pub fn new(factory: &FactoryRef, config: &ConnectionConfig) -> InteropResult<Self> {
        Ok(Self {
            engine: factory.engine().create_connection(config)?,
            callbacks: PeerConnectionCallbacks::default(),
            children: Mutex::new(Children::default()),
        })
    }

    pub fn callbacks(&self) -> &PeerConnectionCallbacks {
        &self.callbacks
    }

    pub fn register_connected_callback(&self, callback: Option<Callback<()>>) {
        self.callbacks.connected.set(callback);
    }

    pub fn register_ice_state_changed_callback(&self, callback: Option<Callback<IceConnectionState>>) {
        self.callbacks.ice_state_changed.set(callback);
    }

    pub fn register_ice_gathering_state_changed_callback(
        &self,
        callback: Option<Callback<IceGatheringState>>,
    ) {
        self.callbacks.ice_gathering_state_changed.set(callback);
    }

    pub fn register_renegotiation_needed_callback(&self, callback: Option<Callback<()>>) {
        self.callbacks.renegotiation_needed.set(callback);
    }

    pub fn register_ice_candidate_ready_callback(&self, callback: Option<Callback<IceCandidate>>) {
        self.callbacks.ice_candidate_ready.set(callback);
    }

    pub fn register_local_sdp_ready_callback(&self, callback: Option<Callback<LocalSdp>>) {
        self.callbacks.local_sdp_ready.set(callback);
    }

    pub fn register_track_added_callback(&self, callback: Option<Callback<TrackEvent>>) {
        self.callbacks.track_added.set(callback);
    }

    pub fn register_track_removed_callback(&self, callback: Option<Callback<TrackEvent>>) {
        self.callbacks.track_removed.set(callback);
    }

    pub fn register_data_channel_added_callback(&self, callback: Option<Callback<Arc<TrackedObject>>>) {
        self.callbacks.data_channel_added.set(callback);
    }

    pub fn register_data_channel_removed_callback(&self, callback: Option<Callback<Arc<TrackedObject>>>) {
        self.callbacks.data_channel_removed.set(callback);
    }

    /// Add a transceiver and return a new reference to it
    ///
    /// `owner` is the tracked object wrapping this connection.
    pub fn add_transceiver(
        &self,
        owner: &TrackedObject,
        kind: MediaKind,
        name: Option<String>,
        direction: TransceiverDirection,
    ) -> InteropResult<Arc<TrackedObject>> {
        Self::ensure_current(owner)?;
        let name = name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let mline_index = self.engine.add_transceiver(kind, &name)?;
        if direction != TransceiverDirection::SendRecv {
            self.engine.set_transceiver_direction(mline_index, direction)?;
        }
        let transceiver = Transceiver::new(kind, mline_index, direction, Arc::clone(&self.engine));
        let object = TrackedObject::create(
            owner.factory().clone(),
            Some(name),
            ObjectPayload::Transceiver(transceiver),
        );
        self.children.lock().transceivers.push(Arc::clone(&object));
        Ok(object)
    }

    /// Transceivers in media line order, as new references
    pub fn transceivers(&self) -> Vec<Arc<TrackedObject>> {
        self.children.lock().transceivers.clone()
    }

    /// Create a data channel and return a new reference to it
    pub fn add_data_channel(
        &self,
        owner: &TrackedObject,
        config: &DataChannelConfig,
    ) -> InteropResult<Arc<TrackedObject>> {
        Self::ensure_current(owner)?;
        let channel = self.engine.create_data_channel(config)?;
        let object = self.wrap_data_channel(owner, channel);
        self.callbacks.data_channel_added.fire(&object);
        Ok(object)
    }

    /// Close and forget a data channel created by this connection
    pub fn remove_data_channel(&self, channel: &TrackedObject) -> InteropResult<()> {
        let id = channel.as_data_channel()?.id();
        let removed = self.take_data_channel(id).ok_or_else(|| {
            InteropError::NotFound(format!("{} on this peer connection", channel))
        })?;
        removed.as_data_channel()?.teardown();
        self.callbacks.data_channel_removed.fire(&removed);
        Ok(())
    }

    pub fn data_channels(&self) -> Vec<Arc<TrackedObject>> {
        self.children.lock().data_channels.clone()
    }

    pub fn create_offer(&self) -> InteropResult<()> {
        self.engine.create_offer()
    }

    pub fn create_answer(&self) -> InteropResult<()> {
        self.engine.create_answer()
    }

    pub fn set_remote_description(&self, sdp_type: SdpType, sdp: &str) -> InteropResult<()> {
        self.engine.set_remote_description(sdp_type, sdp)
    }

    pub fn add_ice_candidate(&self, candidate: &IceCandidate) -> InteropResult<()> {
        self.engine.add_ice_candidate(candidate)
    }

    /// Close the connection and release its children
    pub fn close(&self) {
        self.engine.close();
        let children = std::mem::take(&mut *self.children.lock());
        for channel in &children.data_channels {
            if let Ok(dc) = channel.as_data_channel() {
                dc.teardown();
            }
        }
        drop(children);
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    pub(crate) fn connect(&self, sink: SinkRef) {
        self.engine.attach(sink);
    }

    pub(crate) fn disconnect(&self) {
        self.engine.detach();
        self.callbacks.close_all();
    }

    pub(crate) fn teardown(&self) {
        self.close();
    }

    pub(crate) fn handle_event(&self, owner: &TrackedObject, event: EngineEvent) {
        match event {
            EngineEvent::Connected => {
                self.callbacks.connected.fire(&());
            }
            EngineEvent::IceStateChanged(state) => {
                self.callbacks.ice_state_changed.fire(&state);
            }
            EngineEvent::IceGatheringStateChanged(state) => {
                self.callbacks.ice_gathering_state_changed.fire(&state);
            }
            EngineEvent::RenegotiationNeeded => {
                self.callbacks.renegotiation_needed.fire(&());
            }
            EngineEvent::IceCandidateReady(candidate) => {
                self.callbacks.ice_candidate_ready.fire(&candidate);
            }
            EngineEvent::LocalSdpReady { sdp_type, sdp } => {
                self.callbacks.local_sdp_ready.fire(&LocalSdp { sdp_type, sdp });
            }
            EngineEvent::TrackAdded {
                kind,
                name,
                mline_index,
            } => self.on_track_added(owner, kind, name, mline_index),
            EngineEvent::TrackRemoved { name } => self.on_track_removed(&name),
            EngineEvent::DataChannelAdded(channel) => {
                if owner.factory().is_stale() {
                    warn!(pc = %owner, "Dropping remote data channel after forced shutdown");
                    return;
                }
                let object = self.wrap_data_channel(owner, channel);
                self.callbacks.data_channel_added.fire(&object);
            }
            EngineEvent::DataChannelRemoved { id } => {
                if let Some(removed) = self.take_data_channel(id) {
                    self.callbacks.data_channel_removed.fire(&removed);
                }
            }
            other => debug!(pc = %owner, event = ?other, "Ignoring engine event"),
        }
    }

    /// Orphans of a forced shutdown cannot create children in the next epoch
    fn ensure_current(owner: &TrackedObject) -> InteropResult<()> {
        if owner.factory().is_stale() {
            return Err(InteropError::InvalidOperation(format!(
                "{} was orphaned by a forced shutdown",
                owner
            )));
        }
        Ok(())
    }

    fn wrap_data_channel(
        &self,
        owner: &TrackedObject,
        channel: Arc<dyn EngineDataChannel>,
    ) -> Arc<TrackedObject> {
        let label = channel.label();
        let object = TrackedObject::create(
            owner.factory().clone(),
            Some(label),
            ObjectPayload::DataChannel(DataChannel::new(channel)),
        );
        self.children.lock().data_channels.push(Arc::clone(&object));
        object
    }

    fn take_data_channel(&self, id: u16) -> Option<Arc<TrackedObject>> {
        let mut children = self.children.lock();
        let position = children
            .data_channels
            .iter()
            .position(|object| matches!(object.as_data_channel(), Ok(dc) if dc.id() == id))?;
        Some(children.data_channels.remove(position))
    }

    fn on_track_added(&self, owner: &TrackedObject, kind: MediaKind, name: String, mline_index: u32) {
        if owner.factory().is_stale() {
            warn!(pc = %owner, track = %name, "Dropping remote track after forced shutdown");
            return;
        }
        let existing = self
            .children
            .lock()
            .transceivers
            .iter()
            .find(|object| matches!(object.as_transceiver(), Ok(t) if t.mline_index() == mline_index))
            .cloned();
        let transceiver = match existing {
            Some(transceiver) => transceiver,
            None => {
                let transceiver = TrackedObject::create(
                    owner.factory().clone(),
                    Some(name.clone()),
                    ObjectPayload::Transceiver(Transceiver::new(
                        kind,
                        mline_index,
                        TransceiverDirection::RecvOnly,
                        Arc::clone(&self.engine),
                    )),
                );
                self.children.lock().transceivers.push(Arc::clone(&transceiver));
                transceiver
            }
        };

        let track = TrackedObject::create(
            owner.factory().clone(),
            Some(name),
            ObjectPayload::MediaTrack(MediaTrack::remote(kind)),
        );
        self.children.lock().remote_tracks.push(Arc::clone(&track));
        if let Ok(t) = transceiver.as_transceiver() {
            drop(t.set_remote_track(Some(Arc::clone(&track))));
        }
        debug!(pc = %owner, track = %track, mline_index, "Remote track added");
        self.callbacks.track_added.fire(&TrackEvent { track, transceiver });
    }

    fn on_track_removed(&self, name: &str) {
        let (track, transceiver) = {
            let mut children = self.children.lock();
            let Some(position) = children.remote_tracks.iter().position(|t| t.name() == name) else {
                return;
            };
            let track = children.remote_tracks.remove(position);
            let transceiver = children
                .transceivers
                .iter()
                .find(|object| {
                    matches!(object.as_transceiver(),
                        Ok(t) if t.remote_track().is_some_and(|remote| Arc::ptr_eq(&remote, &track)))
                })
                .cloned();
            (track, transceiver)
        };
        let Some(transceiver) = transceiver else {
            return;
        };
        if let Ok(t) = transceiver.as_transceiver() {
            drop(t.set_remote_track(None));
        }
        self.callbacks.track_removed.fire(&TrackEvent { track, transceiver });
    }
}

/// Create a peer connection object
pub fn create_peer_connection(
    factory: FactoryRef,
    config: &ConnectionConfig,
    name: Option<String>,
) -> InteropResult<Arc<TrackedObject>> {
    let pc = PeerConnection::new(&factory, config)?;
    Ok(TrackedObject::create(factory, name, ObjectPayload::PeerConnection(pc)))
}

/// Decode ICE servers from their text form
///
/// Servers are separated by a blank line. Each server lists one URL per line
/// and may carry `username:` and `password:` lines.
pub fn decode_ice_servers(encoded: &str) -> Vec<IceServer> {
    let normalized = encoded.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .filter_map(|block| {
            let mut server = IceServer::default();
            for line in block.lines().map(str::trim).filter(|line| !line.is_empty()) {
                if let Some(username) = line.strip_prefix("username:") {
                    server.username = Some(username.to_string());
                } else if let Some(password) = line.strip_prefix("password:") {
                    server.password = Some(password.to_string());
                } else {
                    server.urls.push(line.to_string());
                }
            }
            (!server.urls.is_empty()).then_some(server)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_factory::{FactorySettings, GlobalFactory};
    use crate::tracked_object::ObjectType;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// Event tasks may still hold a reference for a moment after the
    /// callback they ran has returned.
    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn test_factory() -> Arc<GlobalFactory> {
        GlobalFactory::with_settings(FactorySettings {
            thread_name_prefix: "pc-test".to_string(),
            ..FactorySettings::default()
        })
    }

    #[test]
    fn test_decode_ice_servers() {
        let servers = decode_ice_servers(
            "stun:stun.example.org\n\nturn:turn.example.org\nturns:turn.example.org\nusername:alice\npassword:secret\n",
        );
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:stun.example.org"]);
        assert_eq!(servers[0].username, None);
        assert_eq!(servers[1].urls.len(), 2);
        assert_eq!(servers[1].username.as_deref(), Some("alice"));
        assert_eq!(servers[1].password.as_deref(), Some("secret"));
        assert!(decode_ice_servers("").is_empty());
    }

    #[test]
    fn test_renegotiation_needed_on_new_transceiver() {
        let factory = test_factory();
        let pc = create_peer_connection(factory.acquire().unwrap(), &Default::default(), None).unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        pc.as_peer_connection()
            .unwrap()
            .register_renegotiation_needed_callback(Some(Arc::new(move |_: &()| {
                let _ = tx.lock().send(());
            })));
        pc.as_peer_connection()
            .unwrap()
            .add_transceiver(&pc, MediaKind::Audio, None, TransceiverDirection::SendRecv)
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_remote_offer_creates_tracks_and_transceivers() {
        let factory = test_factory();
        let offerer = create_peer_connection(factory.acquire().unwrap(), &Default::default(), None).unwrap();
        let answerer = create_peer_connection(factory.acquire().unwrap(), &Default::default(), None).unwrap();

        let (sdp_tx, sdp_rx) = mpsc::channel();
        let sdp_tx = Mutex::new(sdp_tx);
        offerer
            .as_peer_connection()
            .unwrap()
            .register_local_sdp_ready_callback(Some(Arc::new(move |sdp: &LocalSdp| {
                let _ = sdp_tx.lock().send(sdp.clone());
            })));
        let (track_tx, track_rx) = mpsc::channel();
        let track_tx = Mutex::new(track_tx);
        answerer
            .as_peer_connection()
            .unwrap()
            .register_track_added_callback(Some(Arc::new(move |event: &TrackEvent| {
                let _ = track_tx
                    .lock()
                    .send((event.track.object_type(), event.track.name(), event.transceiver.object_type()));
            })));

        let pc = offerer.as_peer_connection().unwrap();
        pc.add_transceiver(&offerer, MediaKind::Video, Some("camera".into()), TransceiverDirection::SendOnly)
            .unwrap();
        pc.create_offer().unwrap();
        let offer = sdp_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);

        answerer
            .as_peer_connection()
            .unwrap()
            .set_remote_description(SdpType::Offer, &offer.sdp)
            .unwrap();
        let (track_type, track_name, transceiver_type) = track_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(track_type, ObjectType::RemoteVideoTrack);
        assert_eq!(track_name, "camera");
        assert_eq!(transceiver_type, ObjectType::VideoTransceiver);

        let transceivers = answerer.as_peer_connection().unwrap().transceivers();
        assert_eq!(transceivers.len(), 1);
        let t = transceivers[0].as_transceiver().unwrap();
        assert_eq!(t.direction(), TransceiverDirection::RecvOnly);
        assert!(t.remote_track().is_some());
        drop(transceivers);

        // offerer, answerer, offerer transceiver, answerer transceiver, remote track
        assert_eq!(factory.live_object_count(), 5);
        drop(offerer);
        drop(answerer);
        assert!(wait_until(|| !factory.is_initialized()));
        assert_eq!(factory.live_object_count(), 0);
    }

    #[test]
    fn test_closed_connection_rejects_operations() {
        let factory = test_factory();
        let pc = create_peer_connection(factory.acquire().unwrap(), &Default::default(), None).unwrap();
        let connection = pc.as_peer_connection().unwrap();
        connection
            .add_data_channel(
                &pc,
                &DataChannelConfig {
                    id: None,
                    label: "chat".to_string(),
                    ordered: true,
                    reliable: true,
                },
            )
            .unwrap();
        connection.close();
        assert!(connection.is_closed());
        assert!(connection.data_channels().is_empty());
        assert!(matches!(
            connection.create_offer(),
            Err(InteropError::PeerConnectionClosed)
        ));
    }
}
