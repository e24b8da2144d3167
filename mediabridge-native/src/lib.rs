//! Media Bridge Native Library
//!
//! C ABI interop layer over an external real-time media engine:
//! - Process-wide factory with lazy initialization and ref-counted shutdown
//! - Reference-counted objects exposed as opaque handles
//! - Dedicated-thread or host-dispatcher execution backends
//! - Live-object diagnostics
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


pub mod backend;
pub mod callback;
pub mod data_channel;
pub mod engine;
pub mod enumeration;
pub mod error;
pub mod ffi;
pub mod global_factory;
pub mod handle;
pub mod media_track;
pub mod peer_connection;
pub mod registry;
pub mod track_source;
pub mod tracked_object;
pub mod transceiver;

pub use error::{InteropError, InteropResult, ResultCode};
pub use global_factory::{FactoryRef, FactorySettings, GlobalFactory, ShutdownAction, ShutdownOptions, ShutdownOutcome};
pub use tracked_object::{ObjectType, TrackedObject};
