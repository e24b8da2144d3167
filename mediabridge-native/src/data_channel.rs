//! Data channels
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
use crate::engine::{DataChannelState, EngineDataChannel, EngineEvent, SinkRef};
use crate::error::InteropResult;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Change of the amount of data queued for sending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferingEvent {
    pub previous: u64,
    pub current: u64,
    pub limit: u64,
}

pub struct DataChannel {
    engine: Arc<dyn EngineDataChannel>,
    message: CallbackSlot<Bytes>,
    buffering: CallbackSlot<BufferingEvent>,
    state_changed: CallbackSlot<DataChannelState>,
}

impl DataChannel {
    pub fn new(engine: Arc<dyn EngineDataChannel>) -> Self {
        Self {
            engine,
            message: CallbackSlot::new(),
            buffering: CallbackSlot::new(),
            state_changed: CallbackSlot::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.engine.id()
    }

    pub fn label(&self) -> String {
        self.engine.label()
    }

    pub fn ordered(&self) -> bool {
        self.engine.ordered()
    }

    pub fn reliable(&self) -> bool {
        self.engine.reliable()
    }

    pub fn state(&self) -> DataChannelState {
        self.engine.state()
    }

    /// Queue `data` for sending; fails unless the channel is open
    pub fn send(&self, data: &[u8]) -> InteropResult<()> {
        self.engine.send(data)
    }

    pub fn register_message_callback(&self, callback: Option<Callback<Bytes>>) {
        self.message.set(callback);
    }

    pub fn register_buffering_callback(&self, callback: Option<Callback<BufferingEvent>>) {
        self.buffering.set(callback);
    }

    pub fn register_state_callback(&self, callback: Option<Callback<DataChannelState>>) {
        self.state_changed.set(callback);
    }

    pub(crate) fn connect(&self, sink: SinkRef) {
        self.engine.attach(sink);
    }

    pub(crate) fn disconnect(&self) {
        self.engine.detach();
        self.message.close();
        self.buffering.close();
        self.state_changed.close();
    }

    pub(crate) fn teardown(&self) {
        self.engine.close();
    }

    pub(crate) fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::DataChannelMessage(data) => {
                self.message.fire(&data);
            }
            EngineEvent::DataChannelBuffering {
                previous,
                current,
                limit,
            } => {
                self.buffering.fire(&BufferingEvent {
                    previous,
                    current,
                    limit,
                });
            }
            EngineEvent::DataChannelState(state) => {
                self.state_changed.fire(&state);
            }
            other => debug!(channel = self.id(), event = ?other, "Ignoring engine event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DataChannelConfig;
    use crate::global_factory::{FactorySettings, GlobalFactory};
    use crate::peer_connection::create_peer_connection;
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_message_echo_and_state() {
        let factory = GlobalFactory::with_settings(FactorySettings::default());
        let pc = create_peer_connection(factory.acquire().unwrap(), &Default::default(), None).unwrap();
        let channel = pc
            .as_peer_connection()
            .unwrap()
            .add_data_channel(
                &pc,
                &DataChannelConfig {
                    id: Some(3),
                    label: "chat".to_string(),
                    ordered: true,
                    reliable: false,
                },
            )
            .unwrap();
        let dc = channel.as_data_channel().unwrap();
        assert_eq!(dc.id(), 3);
        assert_eq!(dc.label(), "chat");
        assert!(dc.ordered());
        assert!(!dc.reliable());
        assert_eq!(dc.state(), DataChannelState::Open);

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        dc.register_message_callback(Some(Arc::new(move |data: &Bytes| {
            let _ = tx.lock().send(data.clone());
        })));
        let peak = Arc::new(Mutex::new(0u64));
        let observed = Arc::clone(&peak);
        dc.register_buffering_callback(Some(Arc::new(move |event: &BufferingEvent| {
            let mut peak = observed.lock();
            *peak = (*peak).max(event.current);
        })));

        dc.send(b"ping").unwrap();
        let echoed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(&echoed[..], b"ping");
        // Buffering is reported on the same queue, ahead of the echo.
        assert_eq!(*peak.lock(), 4);
    }
}
