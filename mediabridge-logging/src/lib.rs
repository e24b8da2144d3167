//! Structured logging setup for the media bridge
//!
//! Besides the usual subscriber bootstrap, this crate keeps a process-wide
//! list of foreign log sinks. A host that cannot read stdout (a managed
//! runtime, a game editor) registers a sink and receives every event at or
//! above its minimum severity.
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


pub mod sink;

pub use sink::{add_sink, log_message, remove_sink, sink_count, ForeignSinkLayer, Severity, SinkId};

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INTEROP_LOGGING: OnceLock<bool> = OnceLock::new();

/// Initialize logging for a library loaded into a foreign host process
///
/// This never panics when a global subscriber already exists: the host may
/// have installed its own. The foreign sink layer is installed alongside the
/// formatter so registered sinks receive events. Returns whether our
/// subscriber is the active one.
pub fn init_interop_logging(service_name: &str, default_level: &str, json: bool) -> bool {
    *INTEROP_LOGGING.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let installed = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(true))
                .with(ForeignSinkLayer::default())
                .try_init()
                .is_ok()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(true))
                .with(ForeignSinkLayer::default())
                .try_init()
                .is_ok()
        };

        if installed {
            tracing::info!(
                service = service_name,
                "Interop logging initialized"
            );
        }
        installed
    })
}
