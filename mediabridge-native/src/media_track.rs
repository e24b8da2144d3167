//! Local and remote media tracks
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
use crate::engine::{EngineEvent, MediaKind, SinkRef, VideoFrame};
use crate::error::InteropResult;
use crate::global_factory::FactoryRef;
use crate::tracked_object::{ObjectPayload, ObjectType, TrackedObject};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

enum Origin {
    /// Fed by a track source, which the track keeps alive
    Local {
        source: Arc<TrackedObject>,
        subscription: Mutex<Option<u64>>,
    },
    /// Received from the remote peer
    Remote,
}

pub struct MediaTrack {
    kind: MediaKind,
    origin: Origin,
    enabled: AtomicBool,
    frame_ready: CallbackSlot<VideoFrame>,
}

impl MediaTrack {
    /// Track fed by `source`, which must be a track source object
    pub fn local(source: Arc<TrackedObject>) -> InteropResult<Self> {
        let kind = source.as_track_source()?.media_kind();
        Ok(Self {
            kind,
            origin: Origin::Local {
                source,
                subscription: Mutex::new(None),
            },
            enabled: AtomicBool::new(true),
            frame_ready: CallbackSlot::new(),
        })
    }

    pub fn remote(kind: MediaKind) -> Self {
        Self {
            kind,
            origin: Origin::Remote,
            enabled: AtomicBool::new(true),
            frame_ready: CallbackSlot::new(),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match (self.is_local(), self.kind) {
            (true, MediaKind::Audio) => ObjectType::LocalAudioTrack,
            (true, MediaKind::Video) => ObjectType::LocalVideoTrack,
            (false, MediaKind::Audio) => ObjectType::RemoteAudioTrack,
            (false, MediaKind::Video) => ObjectType::RemoteVideoTrack,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_local(&self) -> bool {
        matches!(self.origin, Origin::Local { .. })
    }

    /// Source feeding a local track
    pub fn source(&self) -> Option<&Arc<TrackedObject>> {
        match &self.origin {
            Origin::Local { source, .. } => Some(source),
            Origin::Remote => None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// A disabled track delivers no frames
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn register_frame_callback(&self, callback: Option<Callback<VideoFrame>>) {
        self.frame_ready.set(callback);
    }

    pub(crate) fn connect(&self, sink: SinkRef) {
        if let Origin::Local {
            source,
            subscription,
        } = &self.origin
        {
            if let Ok(track_source) = source.as_track_source() {
                *subscription.lock() = Some(track_source.engine().subscribe(sink));
            }
        }
    }

    pub(crate) fn disconnect(&self) {
        self.frame_ready.close();
        if let Origin::Local {
            source,
            subscription,
        } = &self.origin
        {
            let subscription = subscription.lock().take();
            if let (Some(id), Ok(track_source)) = (subscription, source.as_track_source()) {
                track_source.engine().unsubscribe(id);
            }
        }
    }

    pub(crate) fn handle_event(&self, event: EngineEvent) {
        if let EngineEvent::Frame(frame) = event {
            if self.enabled() {
                self.frame_ready.fire(&frame);
            }
        }
    }
}

/// Create a local track fed by `source`
pub fn create_local_track(
    factory: FactoryRef,
    source: Arc<TrackedObject>,
    name: Option<String>,
) -> InteropResult<Arc<TrackedObject>> {
    let track = MediaTrack::local(source)?;
    Ok(TrackedObject::create(factory, name, ObjectPayload::MediaTrack(track)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FrameFormat;
    use crate::global_factory::{FactorySettings, GlobalFactory};
    use crate::track_source::create_external_video_source;
    use bytes::Bytes;
    use std::sync::mpsc;
    use std::time::Duration;

    fn frame() -> VideoFrame {
        VideoFrame {
            width: 2,
            height: 2,
            format: FrameFormat::I420,
            data: Bytes::from(vec![1u8; 6]),
        }
    }

    #[test]
    fn test_local_track_receives_pushed_frames() {
        let factory = GlobalFactory::with_settings(FactorySettings::default());
        let source = create_external_video_source(factory.acquire().unwrap(), None).unwrap();
        let track = create_local_track(factory.acquire().unwrap(), Arc::clone(&source), Some("cam".into())).unwrap();
        assert_eq!(track.object_type(), ObjectType::LocalVideoTrack);

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        track
            .as_media_track()
            .unwrap()
            .register_frame_callback(Some(Arc::new(move |frame: &VideoFrame| {
                let _ = tx.lock().send(frame.width);
            })));

        source.as_track_source().unwrap().push_frame(frame()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);

        track.as_media_track().unwrap().set_enabled(false);
        source.as_track_source().unwrap().push_frame(frame()).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_track_keeps_source_alive() {
        let factory = GlobalFactory::with_settings(FactorySettings::default());
        let source = create_external_video_source(factory.acquire().unwrap(), None).unwrap();
        let track = create_local_track(factory.acquire().unwrap(), Arc::clone(&source), None).unwrap();
        drop(source);
        assert_eq!(factory.live_object_count(), 2);
        drop(track);
        assert_eq!(factory.live_object_count(), 0);
    }

    #[test]
    fn test_track_from_non_source_fails() {
        let factory = GlobalFactory::with_settings(FactorySettings::default());
        let source = create_external_video_source(factory.acquire().unwrap(), None).unwrap();
        let track = create_local_track(factory.acquire().unwrap(), Arc::clone(&source), None).unwrap();
        assert!(create_local_track(factory.acquire().unwrap(), track, None).is_err());
    }
}
