//! Process-wide factory owning the engine and its background threads
//!
//! The factory is lazily initialized by the first object creation and shuts
//! itself down when the last reference is released. References are handed
//! out as [`FactoryRef`] values; every tracked object holds one for its whole
//! lifetime.
//!
//! Two locks protect the state. The init lock serializes initialization and
//! shutdown. The diagnostics lock guards the live-object registry and the
//! shutdown options, and is only ever taken briefly, after the init lock when
//! both are needed. The reference count itself is an atomic packed with a
//! shutdown epoch: references taken before a forced shutdown become stale and
//! no longer affect the count.
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


use crate::backend::{
    Backend, DispatcherBackend, EngineQueues, EngineThreads, StopMode, TaskQueue, ThreadsBackend,
};
use crate::engine::{EngineFactory, EngineProvider, LoopbackProvider};
use crate::error::{InteropError, InteropResult};
use crate::registry::{LiveObject, ObjectKey, Registry};
use crate::tracked_object::{ObjectLabel, TrackedObject};
use bitflags::bitflags;
use mediabridge_config::{BackendKind, LibraryConfig};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

bitflags! {
    /// Diagnostic behavior when shutting down with live objects
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShutdownOptions: u32 {
        /// Log a report of the live objects
        const LOG_LIVE_OBJECTS = 0x1;
        /// Break into the debugger on a forced shutdown with live objects
        const DEBUG_BREAK_ON_FORCE_SHUTDOWN = 0x2;
        /// Report a forced shutdown with live objects as a failure
        const FAIL_ON_LIVE_OBJECTS = 0x4;
    }
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        ShutdownOptions::LOG_LIVE_OBJECTS
    }
}

impl ShutdownOptions {
    /// Parse option names such as `log_live_objects`
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut options = ShutdownOptions::empty();
        for name in names {
            match name.as_ref() {
                "log_live_objects" => options |= ShutdownOptions::LOG_LIVE_OBJECTS,
                "debug_break_on_force_shutdown" => {
                    options |= ShutdownOptions::DEBUG_BREAK_ON_FORCE_SHUTDOWN
                }
                "fail_on_live_objects" => options |= ShutdownOptions::FAIL_ON_LIVE_OBJECTS,
                other => warn!(option = %other, "Ignoring unknown shutdown option"),
            }
        }
        options
    }
}

/// How a shutdown attempt treats live objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownAction {
    /// Shut down only if no reference and no object is alive
    TryIfSafe,
    /// Shut down unconditionally
    Force,
    /// Unconditional shutdown from the factory destructor
    FromDestructor,
}

/// Result of a shutdown attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The factory was not initialized
    AlreadyShutDown,
    ShutDown,
    /// Torn down while references or objects were still alive
    ForcedWithLiveObjects { refs: u32, live_objects: usize },
    /// Not safe to shut down, still initialized
    Deferred { refs: u32, live_objects: usize },
}

/// Engine factory and queues of one initialization
pub struct EngineContext {
    engine: Arc<dyn EngineFactory>,
    queues: EngineQueues,
}

impl EngineContext {
    pub fn engine(&self) -> &dyn EngineFactory {
        self.engine.as_ref()
    }

    pub fn queues(&self) -> &EngineQueues {
        &self.queues
    }
}

/// Settings applied on the next initialization
#[derive(Clone)]
pub struct FactorySettings {
    pub backend: BackendKind,
    /// Host dispatcher used by the dispatcher backend
    pub dispatcher: Option<Arc<dyn TaskQueue>>,
    pub provider: Arc<dyn EngineProvider>,
    pub thread_name_prefix: String,
    pub dispatcher_setup_timeout: Duration,
    pub shutdown_options: ShutdownOptions,
}

impl FactorySettings {
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self {
            backend: config.backend,
            dispatcher: None,
            provider: Arc::new(LoopbackProvider),
            thread_name_prefix: config.thread_name_prefix.clone(),
            dispatcher_setup_timeout: Duration::from_millis(config.dispatcher_setup_timeout_ms),
            shutdown_options: ShutdownOptions::from_names(&config.shutdown_option_names()),
        }
    }
}

impl Default for FactorySettings {
    fn default() -> Self {
        Self::from_config(&LibraryConfig::default())
    }
}

impl fmt::Debug for FactorySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactorySettings")
            .field("backend", &self.backend)
            .field("dispatcher", &self.dispatcher.as_ref().map(|d| d.name().to_string()))
            .field("provider", &self.provider.name())
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("shutdown_options", &self.shutdown_options)
            .finish()
    }
}

struct Runtime {
    backend: Box<dyn Backend>,
    threads: EngineThreads,
    context: Arc<EngineContext>,
}

/// Runtime taken out of the factory, stopped once the init lock is released
struct PendingStop {
    runtime: Runtime,
    mode: StopMode,
}

impl PendingStop {
    fn run(self) {
        let Runtime {
            backend,
            threads,
            context,
        } = self.runtime;
        drop(context);
        backend.stop(threads, self.mode);
        debug!(backend = backend.name(), mode = ?self.mode, "Engine threads stopped");
    }
}

struct InitState {
    runtime: Option<Runtime>,
    settings: FactorySettings,
}

struct Diagnostics {
    registry: Registry,
    options: ShutdownOptions,
}

const COUNT_BITS: u32 = 32;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

fn pack(epoch: u32, count: u32) -> u64 {
    ((epoch as u64) << COUNT_BITS) | count as u64
}

fn unpack(state: u64) -> (u32, u32) {
    ((state >> COUNT_BITS) as u32, (state & COUNT_MASK) as u32)
}

static GLOBAL: OnceLock<Arc<GlobalFactory>> = OnceLock::new();

/// Owner of the engine factory and its background threads
pub struct GlobalFactory {
    init: Mutex<InitState>,
    /// Shutdown epoch in the high half, reference count in the low half
    state: AtomicU64,
    diagnostics: Mutex<Diagnostics>,
    initializations: AtomicUsize,
}

impl GlobalFactory {
    /// Create a standalone factory, independent of the process-wide one
    pub fn with_settings(settings: FactorySettings) -> Arc<Self> {
        let options = settings.shutdown_options;
        Arc::new(Self {
            init: Mutex::new(InitState {
                runtime: None,
                settings,
            }),
            state: AtomicU64::new(pack(0, 0)),
            diagnostics: Mutex::new(Diagnostics {
                registry: Registry::new(),
                options,
            }),
            initializations: AtomicUsize::new(0),
        })
    }

    /// The process-wide factory, configured from the environment on first use
    ///
    /// This only creates the bookkeeping; the engine and its threads start
    /// with the first [`GlobalFactory::instance_ptr`].
    pub fn global() -> &'static Arc<GlobalFactory> {
        GLOBAL.get_or_init(|| {
            let loaded = LibraryConfig::from_env();
            let config = loaded.as_ref().cloned().unwrap_or_default();
            mediabridge_logging::init_interop_logging(
                "mediabridge-native",
                config.log_level(),
                config.json_logs,
            );
            if let Err(e) = loaded {
                warn!(error = %e, "Invalid library configuration, using defaults");
            }
            info!(
                backend = %config.backend,
                thread_name_prefix = %config.thread_name_prefix,
                "Global factory created"
            );
            GlobalFactory::with_settings(FactorySettings::from_config(&config))
        })
    }

    /// Reference to the process-wide factory, initializing it if needed
    pub fn instance_ptr() -> InteropResult<FactoryRef> {
        Self::global().acquire()
    }

    /// Reference to the process-wide factory if it is already initialized
    pub fn instance_ptr_if_exist() -> Option<FactoryRef> {
        GLOBAL.get()?.acquire_existing()
    }

    /// Take a reference, initializing the factory if needed
    ///
    /// Concurrent first calls are serialized on the init lock: exactly one of
    /// them initializes, the others observe its result. On failure the
    /// factory stays uninitialized.
    pub fn acquire(self: &Arc<Self>) -> InteropResult<FactoryRef> {
        let mut init = self.init.lock();
        if init.runtime.is_none() {
            let runtime = self.initialize_locked(&init.settings)?;
            init.runtime = Some(runtime);
        }
        let context = match &init.runtime {
            Some(runtime) => Arc::clone(&runtime.context),
            None => return Err(InteropError::NotInitialized),
        };
        Ok(self.take_ref_locked(context))
    }

    /// Take a reference only if the factory is already initialized
    pub fn acquire_existing(self: &Arc<Self>) -> Option<FactoryRef> {
        let init = self.init.lock();
        let context = Arc::clone(&init.runtime.as_ref()?.context);
        Some(self.take_ref_locked(context))
    }

    fn take_ref_locked(self: &Arc<Self>, context: Arc<EngineContext>) -> FactoryRef {
        let previous = self.state.fetch_add(1, Ordering::SeqCst);
        let (epoch, _) = unpack(previous);
        FactoryRef {
            factory: Arc::clone(self),
            epoch,
            context,
        }
    }

    fn initialize_locked(&self, settings: &FactorySettings) -> InteropResult<Runtime> {
        let backend: Box<dyn Backend> = match settings.backend {
            BackendKind::Threads => Box::new(ThreadsBackend::new(settings.thread_name_prefix.clone())),
            BackendKind::Dispatcher => {
                let dispatcher = settings.dispatcher.clone().ok_or_else(|| {
                    InteropError::InvalidOperation(
                        "dispatcher backend selected but no dispatcher was registered".to_string(),
                    )
                })?;
                Box::new(DispatcherBackend::new(
                    dispatcher,
                    settings.thread_name_prefix.clone(),
                    settings.dispatcher_setup_timeout,
                ))
            }
        };

        let threads = backend.start().map_err(|e| {
            error!(backend = backend.name(), error = %e, "Failed to start engine threads");
            e
        })?;
        let engine = match settings.provider.create_factory(threads.queues()) {
            Ok(engine) => engine,
            Err(e) => {
                error!(provider = %settings.provider.name(), error = %e, "Failed to create engine factory");
                backend.stop(threads, StopMode::Join);
                return Err(e);
            }
        };

        let context = Arc::new(EngineContext {
            engine,
            queues: threads.queues().clone(),
        });
        self.initializations.fetch_add(1, Ordering::SeqCst);
        info!(
            backend = backend.name(),
            provider = %settings.provider.name(),
            "Global factory initialized"
        );
        Ok(Runtime {
            backend,
            threads,
            context,
        })
    }

    /// Release one reference taken in `epoch`
    fn release(&self, epoch: u32) {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            let (current_epoch, count) = unpack(current);
            if current_epoch != epoch || count == 0 {
                return;
            }
            if count == 1 {
                break;
            }
            match self.state.compare_exchange_weak(
                current,
                pack(current_epoch, count - 1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }

        // Possibly the last reference: decide under the init lock so that a
        // concurrent initialization cannot interleave with the shutdown.
        let pending = {
            let mut init = self.init.lock();
            let mut current = self.state.load(Ordering::SeqCst);
            let remaining = loop {
                let (current_epoch, count) = unpack(current);
                if current_epoch != epoch || count == 0 {
                    return;
                }
                match self.state.compare_exchange_weak(
                    current,
                    pack(current_epoch, count - 1),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => break count - 1,
                    Err(actual) => current = actual,
                }
            };
            if remaining > 0 {
                return;
            }
            self.shutdown_locked(&mut init, ShutdownAction::TryIfSafe).1
        };
        if let Some(pending) = pending {
            pending.run();
        }
    }

    fn shutdown_locked(
        &self,
        init: &mut InitState,
        action: ShutdownAction,
    ) -> (ShutdownOutcome, Option<PendingStop>) {
        if init.runtime.is_none() {
            return (ShutdownOutcome::AlreadyShutDown, None);
        }

        let (epoch, refs) = unpack(self.state.load(Ordering::SeqCst));
        let (live_objects, options) = {
            let diagnostics = self.diagnostics.lock();
            (diagnostics.registry.len(), diagnostics.options)
        };

        let mut outcome = ShutdownOutcome::ShutDown;
        if refs > 0 || live_objects > 0 {
            if action == ShutdownAction::TryIfSafe {
                debug!(refs, live_objects, "Global factory still in use, staying initialized");
                return (ShutdownOutcome::Deferred { refs, live_objects }, None);
            }
            error!(
                refs,
                live_objects,
                from_destructor = action == ShutdownAction::FromDestructor,
                "Force-shutting down the global factory while objects are still alive; \
                 their destruction will run against stopped engine threads"
            );
            if options.contains(ShutdownOptions::LOG_LIVE_OBJECTS) {
                self.report_live_objects();
            }
            if options.contains(ShutdownOptions::DEBUG_BREAK_ON_FORCE_SHUTDOWN) {
                debug_break();
            }
            // Leaked objects must not keep the registry non-empty or interact
            // with the next initialization.
            self.diagnostics.lock().registry.clear();
            outcome = ShutdownOutcome::ForcedWithLiveObjects { refs, live_objects };
        }

        self.state.store(pack(epoch.wrapping_add(1), 0), Ordering::SeqCst);
        let runtime = init.runtime.take();
        let mode = match action {
            ShutdownAction::TryIfSafe => StopMode::Join,
            ShutdownAction::Force | ShutdownAction::FromDestructor => StopMode::Detach,
        };
        info!(?action, "Global factory shut down");
        (outcome, runtime.map(|runtime| PendingStop { runtime, mode }))
    }

    fn shutdown(&self, action: ShutdownAction) -> ShutdownOutcome {
        let (outcome, pending) = {
            let mut init = self.init.lock();
            self.shutdown_locked(&mut init, action)
        };
        if let Some(pending) = pending {
            pending.run();
        }
        outcome
    }

    /// Shut down only if nothing is alive. Returns whether the factory is
    /// uninitialized afterwards.
    pub fn try_shutdown(&self) -> bool {
        matches!(
            self.shutdown(ShutdownAction::TryIfSafe),
            ShutdownOutcome::ShutDown | ShutdownOutcome::AlreadyShutDown
        )
    }

    /// Tear down the engine and its threads regardless of live objects
    ///
    /// Fails with `InvalidOperation` when objects were alive and
    /// [`ShutdownOptions::FAIL_ON_LIVE_OBJECTS`] is set; the teardown happens
    /// in both cases.
    pub fn force_shutdown(&self) -> InteropResult<ShutdownOutcome> {
        let outcome = self.shutdown(ShutdownAction::Force);
        if let ShutdownOutcome::ForcedWithLiveObjects { live_objects, .. } = outcome {
            if self.shutdown_options().contains(ShutdownOptions::FAIL_ON_LIVE_OBJECTS) {
                return Err(InteropError::InvalidOperation(format!(
                    "forced shutdown with {} live objects",
                    live_objects
                )));
            }
        }
        Ok(outcome)
    }

    pub fn is_initialized(&self) -> bool {
        self.init.lock().runtime.is_some()
    }

    /// Approximate number of outstanding references
    pub fn ref_count(&self) -> u32 {
        unpack(self.state.load(Ordering::SeqCst)).1
    }

    /// Number of successful initializations since creation
    pub fn initialization_count(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn shutdown_options(&self) -> ShutdownOptions {
        self.diagnostics.lock().options
    }

    pub fn set_shutdown_options(&self, options: ShutdownOptions) {
        self.diagnostics.lock().options = options;
    }

    /// Change the settings used by the next initialization
    ///
    /// Fails with `InvalidOperation` while initialized.
    pub fn update_settings<F>(&self, update: F) -> InteropResult<()>
    where
        F: FnOnce(&mut FactorySettings),
    {
        let mut init = self.init.lock();
        if init.runtime.is_some() {
            return Err(InteropError::InvalidOperation(
                "settings cannot change while the library is initialized".to_string(),
            ));
        }
        update(&mut init.settings);
        Ok(())
    }

    pub fn settings(&self) -> FactorySettings {
        self.init.lock().settings.clone()
    }

    pub(crate) fn add_object(
        &self,
        label: Arc<ObjectLabel>,
        object: Weak<TrackedObject>,
        address: usize,
    ) -> ObjectKey {
        self.diagnostics.lock().registry.insert(label, object, address)
    }

    pub(crate) fn remove_object(&self, key: ObjectKey, address: usize) {
        self.diagnostics.lock().registry.remove(key, address);
    }

    /// Whether `address` is the address of an object created by this factory
    /// and not destroyed yet
    pub fn is_live_address(&self, address: usize) -> bool {
        self.diagnostics.lock().registry.is_live_address(address)
    }

    pub fn live_object_count(&self) -> usize {
        self.diagnostics.lock().registry.len()
    }

    pub fn live_objects(&self) -> Vec<LiveObject> {
        self.diagnostics.lock().registry.snapshot()
    }

    /// Log every live object and return how many there are
    pub fn report_live_objects(&self) -> usize {
        let live = self.live_objects();
        info!(count = live.len(), "Live objects report");
        for object in &live {
            info!(
                object_type = %object.object_type,
                name = %object.name,
                ref_count = object.ref_count,
                "Live object"
            );
        }
        live.len()
    }
}

impl Drop for GlobalFactory {
    fn drop(&mut self) {
        self.shutdown(ShutdownAction::FromDestructor);
    }
}

fn debug_break() {
    #[cfg(unix)]
    {
        // SAFETY: raising a signal on the current process has no memory
        // safety requirements.
        unsafe {
            libc::raise(libc::SIGTRAP);
        }
    }
    #[cfg(not(unix))]
    warn!("Debug break requested but not supported on this platform");
}

/// Counted reference to an initialized [`GlobalFactory`]
///
/// Dropping the last reference of an epoch attempts a safe shutdown.
pub struct FactoryRef {
    factory: Arc<GlobalFactory>,
    epoch: u32,
    context: Arc<EngineContext>,
}

impl FactoryRef {
    pub fn factory(&self) -> &Arc<GlobalFactory> {
        &self.factory
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn engine(&self) -> &dyn EngineFactory {
        self.context.engine()
    }

    pub fn queues(&self) -> &EngineQueues {
        self.context.queues()
    }

    /// Whether a forced shutdown happened since this reference was taken
    pub fn is_stale(&self) -> bool {
        unpack(self.factory.state.load(Ordering::SeqCst)).0 != self.epoch
    }
}

impl Clone for FactoryRef {
    fn clone(&self) -> Self {
        let mut current = self.factory.state.load(Ordering::SeqCst);
        loop {
            let (epoch, count) = unpack(current);
            if epoch != self.epoch {
                break;
            }
            match self.factory.state.compare_exchange_weak(
                current,
                pack(epoch, count + 1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        Self {
            factory: Arc::clone(&self.factory),
            epoch: self.epoch,
            context: Arc::clone(&self.context),
        }
    }
}

impl Drop for FactoryRef {
    fn drop(&mut self) {
        self.factory.release(self.epoch);
    }
}

impl fmt::Debug for FactoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRef")
            .field("epoch", &self.epoch)
            .field("stale", &self.is_stale())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WorkerThread;
    use std::thread;

    /// Provider counting how many engine factories it built
    #[derive(Default)]
    struct CountingProvider {
        created: AtomicUsize,
    }

    impl EngineProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn create_factory(&self, queues: &EngineQueues) -> InteropResult<Arc<dyn EngineFactory>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            LoopbackProvider.create_factory(queues)
        }
    }

    fn factory_with(provider: Arc<CountingProvider>) -> Arc<GlobalFactory> {
        GlobalFactory::with_settings(FactorySettings {
            provider,
            thread_name_prefix: "factory-test".to_string(),
            ..FactorySettings::default()
        })
    }

    #[test]
    fn test_pack_roundtrip() {
        assert_eq!(unpack(pack(7, 3)), (7, 3));
        assert_eq!(unpack(pack(u32::MAX, u32::MAX)), (u32::MAX, u32::MAX));
    }

    #[test]
    fn test_last_release_shuts_down() {
        let provider = Arc::new(CountingProvider::default());
        let factory = factory_with(Arc::clone(&provider));
        assert!(!factory.is_initialized());

        let first = factory.acquire().unwrap();
        let second = first.clone();
        assert_eq!(factory.ref_count(), 2);
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);

        drop(first);
        assert!(factory.is_initialized());
        drop(second);
        assert!(!factory.is_initialized());
        assert_eq!(factory.ref_count(), 0);
    }

    #[test]
    fn test_concurrent_first_acquire_initializes_once() {
        let provider = Arc::new(CountingProvider::default());
        let factory = factory_with(Arc::clone(&provider));

        let refs: Vec<FactoryRef> = (0..8)
            .map(|_| {
                let factory = Arc::clone(&factory);
                thread::spawn(move || factory.acquire().unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(provider.created.load(Ordering::SeqCst), 1);
        assert_eq!(factory.initialization_count(), 1);
        let engine = refs[0].engine() as *const dyn EngineFactory as *const ();
        for r in &refs {
            assert_eq!(r.engine() as *const dyn EngineFactory as *const (), engine);
        }
        drop(refs);
        assert!(!factory.is_initialized());
    }

    #[test]
    fn test_try_shutdown_defers_while_referenced() {
        let factory = factory_with(Arc::default());
        let held = factory.acquire().unwrap();
        assert!(!factory.try_shutdown());
        assert!(factory.is_initialized());
        drop(held);
        assert!(factory.try_shutdown());
    }

    #[test]
    fn test_force_shutdown_makes_refs_stale() {
        let factory = factory_with(Arc::default());
        factory.set_shutdown_options(ShutdownOptions::empty());
        let held = factory.acquire().unwrap();

        let outcome = factory.force_shutdown().unwrap();
        assert_eq!(
            outcome,
            ShutdownOutcome::ForcedWithLiveObjects {
                refs: 1,
                live_objects: 0
            }
        );
        assert!(!factory.is_initialized());
        assert!(held.is_stale());

        // A fresh initialization is not disturbed by the stale reference
        let fresh = factory.acquire().unwrap();
        let stale_clone = held.clone();
        drop(held);
        drop(stale_clone);
        assert_eq!(factory.ref_count(), 1);
        assert!(factory.is_initialized());
        drop(fresh);
        assert!(!factory.is_initialized());
    }

    #[test]
    fn test_fail_on_live_objects() {
        let factory = factory_with(Arc::default());
        factory.set_shutdown_options(ShutdownOptions::FAIL_ON_LIVE_OBJECTS);
        let _held = factory.acquire().unwrap();
        assert!(matches!(
            factory.force_shutdown(),
            Err(InteropError::InvalidOperation(_))
        ));
        assert!(!factory.is_initialized());
        assert_eq!(factory.force_shutdown(), Ok(ShutdownOutcome::AlreadyShutDown));
    }

    #[test]
    fn test_acquire_existing_never_initializes() {
        let factory = factory_with(Arc::default());
        assert!(factory.acquire_existing().is_none());
        let held = factory.acquire().unwrap();
        assert!(factory.acquire_existing().is_some());
        drop(held);
    }

    #[test]
    fn test_settings_locked_while_initialized() {
        let factory = factory_with(Arc::default());
        let held = factory.acquire().unwrap();
        assert!(factory
            .update_settings(|s| s.backend = BackendKind::Dispatcher)
            .is_err());
        drop(held);
        assert!(factory
            .update_settings(|s| s.backend = BackendKind::Dispatcher)
            .is_ok());

        // No dispatcher registered
        assert!(matches!(
            factory.acquire(),
            Err(InteropError::InvalidOperation(_))
        ));
        assert!(!factory.is_initialized());
    }

    #[test]
    fn test_dispatcher_backend_rejects_dispatcher_thread() {
        let host = WorkerThread::spawn("factory-test host").unwrap();
        let factory = factory_with(Arc::default());
        factory
            .update_settings(|s| {
                s.backend = BackendKind::Dispatcher;
                s.dispatcher = Some(host.queue());
            })
            .unwrap();

        let on_host = Arc::clone(&factory);
        let result = crate::backend::invoke(host.queue().as_ref(), move || {
            on_host.acquire().map(drop)
        })
        .unwrap();
        assert!(matches!(result, Err(InteropError::WrongThread(_))));
        assert!(!factory.is_initialized());

        let held = factory.acquire().unwrap();
        assert!(factory.is_initialized());
        drop(held);
        host.stop(StopMode::Join);
    }

    #[test]
    fn test_shutdown_options_from_names() {
        let options = ShutdownOptions::from_names(&["log_live_objects", "fail_on_live_objects", "bogus"]);
        assert_eq!(
            options,
            ShutdownOptions::LOG_LIVE_OBJECTS | ShutdownOptions::FAIL_ON_LIVE_OBJECTS
        );
    }
}
