//! Track sources: capture devices and application-fed video
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


use crate::engine::{EngineTrackSource, MediaKind, VideoFrame};
use crate::error::{InteropError, InteropResult};
use crate::global_factory::FactoryRef;
use crate::tracked_object::{ObjectPayload, ObjectType, TrackedObject};
use std::sync::Arc;

/// Origin of the media produced by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    DeviceAudio,
    DeviceVideo,
    /// Frames pushed by the application
    ExternalVideo,
}

pub struct TrackSource {
    kind: SourceKind,
    engine: Arc<dyn EngineTrackSource>,
}

impl TrackSource {
    pub fn device_audio(factory: &FactoryRef) -> InteropResult<Self> {
        Ok(Self {
            kind: SourceKind::DeviceAudio,
            engine: factory.engine().create_device_audio_source()?,
        })
    }

    pub fn device_video(factory: &FactoryRef, device_id: Option<&str>) -> InteropResult<Self> {
        Ok(Self {
            kind: SourceKind::DeviceVideo,
            engine: factory.engine().create_device_video_source(device_id)?,
        })
    }

    pub fn external_video(factory: &FactoryRef) -> InteropResult<Self> {
        Ok(Self {
            kind: SourceKind::ExternalVideo,
            engine: factory.engine().create_external_video_source()?,
        })
    }

    pub fn object_type(&self) -> ObjectType {
        match self.kind {
            SourceKind::DeviceAudio => ObjectType::DeviceAudioTrackSource,
            SourceKind::DeviceVideo => ObjectType::DeviceVideoTrackSource,
            SourceKind::ExternalVideo => ObjectType::ExternalVideoTrackSource,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        self.kind
    }

    pub fn media_kind(&self) -> MediaKind {
        self.engine.kind()
    }

    pub fn engine(&self) -> &Arc<dyn EngineTrackSource> {
        &self.engine
    }

    /// Feed a frame to every track using this source
    pub fn push_frame(&self, frame: VideoFrame) -> InteropResult<()> {
        if self.kind != SourceKind::ExternalVideo {
            return Err(InteropError::Unsupported(format!(
                "{:?} sources produce their own frames",
                self.kind
            )));
        }
        self.engine.push_frame(frame)
    }
}

pub fn create_device_audio_source(factory: FactoryRef, name: Option<String>) -> InteropResult<Arc<TrackedObject>> {
    let source = TrackSource::device_audio(&factory)?;
    Ok(TrackedObject::create(factory, name, ObjectPayload::TrackSource(source)))
}

pub fn create_device_video_source(
    factory: FactoryRef,
    device_id: Option<&str>,
    name: Option<String>,
) -> InteropResult<Arc<TrackedObject>> {
    let source = TrackSource::device_video(&factory, device_id)?;
    Ok(TrackedObject::create(factory, name, ObjectPayload::TrackSource(source)))
}

pub fn create_external_video_source(factory: FactoryRef, name: Option<String>) -> InteropResult<Arc<TrackedObject>> {
    let source = TrackSource::external_video(&factory)?;
    Ok(TrackedObject::create(factory, name, ObjectPayload::TrackSource(source)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FrameFormat;
    use crate::global_factory::{FactorySettings, GlobalFactory};
    use bytes::Bytes;

    #[test]
    fn test_device_sources_reject_frames() {
        let factory = GlobalFactory::with_settings(FactorySettings::default());
        let audio = create_device_audio_source(factory.acquire().unwrap(), None).unwrap();
        let video = create_device_video_source(factory.acquire().unwrap(), None, None).unwrap();
        assert_eq!(audio.object_type(), ObjectType::DeviceAudioTrackSource);
        assert_eq!(video.as_track_source().unwrap().media_kind(), MediaKind::Video);

        let frame = VideoFrame {
            width: 2,
            height: 2,
            format: FrameFormat::Argb32,
            data: Bytes::from(vec![0u8; 16]),
        };
        let result = video.as_track_source().unwrap().push_frame(frame);
        assert!(matches!(result, Err(InteropError::Unsupported(_))));
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let factory = GlobalFactory::with_settings(FactorySettings::default());
        let result = create_device_video_source(factory.acquire().unwrap(), Some("nope"), None);
        assert!(matches!(result, Err(InteropError::NotFound(_))));
        assert_eq!(factory.live_object_count(), 0);
        assert!(!factory.is_initialized());
    }
}
