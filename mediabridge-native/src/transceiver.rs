//! Transceivers: one media line of a peer connection
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
use crate::engine::{EngineConnection, MediaKind, TransceiverDirection};
use crate::error::{InteropError, InteropResult};
use crate::tracked_object::{ObjectType, TrackedObject};
use parking_lot::Mutex;
use std::sync::Arc;

/// Snapshot passed to the state-updated callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransceiverStateUpdate {
    pub direction: TransceiverDirection,
    pub has_local_track: bool,
    pub has_remote_track: bool,
}

struct TransceiverState {
    direction: TransceiverDirection,
    local_track: Option<Arc<TrackedObject>>,
    remote_track: Option<Arc<TrackedObject>>,
}

impl TransceiverState {
    fn snapshot(&self) -> TransceiverStateUpdate {
        TransceiverStateUpdate {
            direction: self.direction,
            has_local_track: self.local_track.is_some(),
            has_remote_track: self.remote_track.is_some(),
        }
    }
}

pub struct Transceiver {
    kind: MediaKind,
    mline_index: u32,
    engine: Arc<dyn EngineConnection>,
    state: Mutex<TransceiverState>,
    state_updated: CallbackSlot<TransceiverStateUpdate>,
}

impl Transceiver {
    pub fn new(
        kind: MediaKind,
        mline_index: u32,
        direction: TransceiverDirection,
        engine: Arc<dyn EngineConnection>,
    ) -> Self {
        Self {
            kind,
            mline_index,
            engine,
            state: Mutex::new(TransceiverState {
                direction,
                local_track: None,
                remote_track: None,
            }),
            state_updated: CallbackSlot::new(),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self.kind {
            MediaKind::Audio => ObjectType::AudioTransceiver,
            MediaKind::Video => ObjectType::VideoTransceiver,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn mline_index(&self) -> u32 {
        self.mline_index
    }

    pub fn direction(&self) -> TransceiverDirection {
        self.state.lock().direction
    }

    pub fn set_direction(&self, direction: TransceiverDirection) -> InteropResult<()> {
        self.engine
            .set_transceiver_direction(self.mline_index, direction)?;
        let update = {
            let mut state = self.state.lock();
            if state.direction == direction {
                return Ok(());
            }
            state.direction = direction;
            state.snapshot()
        };
        self.state_updated.fire(&update);
        Ok(())
    }

    /// Attach a local track, or detach it with `None`
    ///
    /// The track must be a local track of the same media kind.
    pub fn set_local_track(&self, track: Option<Arc<TrackedObject>>) -> InteropResult<()> {
        if let Some(track) = &track {
            let media_track = track.as_media_track()?;
            if !media_track.is_local() {
                return Err(InteropError::InvalidParameter(format!(
                    "{} is not a local track",
                    track
                )));
            }
            if media_track.kind() != self.kind {
                return Err(InteropError::InvalidMediaKind {
                    expected: self.kind.to_string(),
                    actual: media_track.kind().to_string(),
                });
            }
        }
        let (previous, update) = {
            let mut state = self.state.lock();
            let previous = std::mem::replace(&mut state.local_track, track);
            (previous, state.snapshot())
        };
        drop(previous);
        self.state_updated.fire(&update);
        Ok(())
    }

    /// Local track, as a new reference
    pub fn local_track(&self) -> Option<Arc<TrackedObject>> {
        self.state.lock().local_track.clone()
    }

    /// Remote track, as a new reference
    pub fn remote_track(&self) -> Option<Arc<TrackedObject>> {
        self.state.lock().remote_track.clone()
    }

    pub(crate) fn set_remote_track(&self, track: Option<Arc<TrackedObject>>) -> Option<Arc<TrackedObject>> {
        let (previous, update) = {
            let mut state = self.state.lock();
            let previous = std::mem::replace(&mut state.remote_track, track);
            (previous, state.snapshot())
        };
        self.state_updated.fire(&update);
        previous
    }

    pub fn register_state_updated_callback(&self, callback: Option<Callback<TransceiverStateUpdate>>) {
        self.state_updated.set(callback);
    }

    pub(crate) fn disconnect(&self) {
        self.state_updated.close();
    }
}
