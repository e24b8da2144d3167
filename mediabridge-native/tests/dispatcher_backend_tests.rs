//! Host dispatcher backend driven through the C ABI
//!
//! The host dispatcher is a plain thread draining a channel, standing in for
//! an application UI loop.

mod common;

use common::*;
use mediabridge_native::ffi::library::{mb_library_set_dispatcher, mb_library_use_backend, MbTaskRunner};
use mediabridge_native::ffi::object::mb_object_remove_ref;
use mediabridge_native::ffi::peer_connection::*;
use mediabridge_native::ffi::track_source::mb_external_video_track_source_create;
use mediabridge_native::ffi::{MbBool, MB_FALSE, MB_TRUE};
use mediabridge_native::handle::Handle;
use mediabridge_native::ResultCode;
use parking_lot::Mutex;
use serial_test::serial;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send>;

struct HostDispatcher {
    sender: Mutex<mpsc::Sender<Job>>,
    thread_id: ThreadId,
    executed: AtomicUsize,
}

impl HostDispatcher {
    fn start() -> &'static HostDispatcher {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("host dispatcher".to_string())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })
            .unwrap();
        Box::leak(Box::new(HostDispatcher {
            sender: Mutex::new(sender),
            thread_id: worker.thread().id(),
            executed: AtomicUsize::new(0),
        }))
    }

    fn run(&self, job: impl FnOnce() + Send + 'static) {
        self.sender.lock().send(Box::new(job)).unwrap();
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

unsafe extern "C" fn post(user_data: *mut c_void, run: MbTaskRunner, task: *mut c_void) {
    let host: &'static HostDispatcher = unsafe { &*(user_data as *const HostDispatcher) };
    let task = task as usize;
    host.run(move || {
        host.executed.fetch_add(1, Ordering::SeqCst);
        unsafe { run(task as *mut c_void) };
    });
}

unsafe extern "C" fn has_thread_access(user_data: *mut c_void) -> MbBool {
    let host = unsafe { &*(user_data as *const HostDispatcher) };
    if host.is_current() {
        MB_TRUE
    } else {
        MB_FALSE
    }
}

static HOST: OnceLock<&'static HostDispatcher> = OnceLock::new();

/// Install the host dispatcher once; the library must be shut down
fn install_dispatcher() -> &'static HostDispatcher {
    reset_library();
    let host = *HOST.get_or_init(HostDispatcher::start);
    let name = cstring("test dispatcher");
    let result = unsafe {
        mb_library_set_dispatcher(
            Some(post),
            Some(has_thread_access),
            host as *const HostDispatcher as *mut c_void,
            name.as_ptr(),
        )
    };
    assert_eq!(result, ResultCode::Success);
    host
}

#[derive(Default)]
struct Calls {
    on_dispatcher: AtomicUsize,
    elsewhere: AtomicUsize,
}

unsafe extern "C" fn on_renegotiation_needed(user_data: *mut c_void) {
    let calls = unsafe { &*(user_data as *const Calls) };
    let host = HOST.get().unwrap();
    if host.is_current() {
        calls.on_dispatcher.fetch_add(1, Ordering::SeqCst);
    } else {
        calls.elsewhere.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
#[serial]
fn test_signaling_callbacks_run_on_dispatcher() {
    let host = install_dispatcher();
    let before = host.executed.load(Ordering::SeqCst);

    let mut pc: Handle = std::ptr::null_mut();
    assert_eq!(unsafe { mb_peer_connection_create(std::ptr::null(), &mut pc) }, ResultCode::Success);
    assert!(is_initialized());
    // Initialization waited for the dispatcher to run a first task.
    assert!(host.executed.load(Ordering::SeqCst) > before);

    let calls = Calls::default();
    mb_peer_connection_register_renegotiation_needed_callback(
        pc,
        Some(on_renegotiation_needed),
        &calls as *const Calls as *mut c_void,
    );
    let name = cstring("mic");
    let init = MbTransceiverInit {
        name: name.as_ptr(),
        media_kind: 0,
        direction: 0,
    };
    let mut transceiver: Handle = std::ptr::null_mut();
    assert_eq!(
        unsafe { mb_peer_connection_add_transceiver(pc, &init, &mut transceiver) },
        ResultCode::Success
    );
    assert!(wait_until(Duration::from_secs(5), || calls.on_dispatcher.load(Ordering::SeqCst) == 1));
    assert_eq!(calls.elsewhere.load(Ordering::SeqCst), 0);

    mb_object_remove_ref(transceiver);
    mb_object_remove_ref(pc);
    assert!(wait_for_shutdown());
}

#[test]
#[serial]
fn test_initialization_on_dispatcher_thread_is_wrong_thread() {
    let host = install_dispatcher();
    let (tx, rx) = mpsc::channel();
    host.run(move || {
        let name = cstring("too early");
        let mut source: Handle = std::ptr::null_mut();
        let result = unsafe { mb_external_video_track_source_create(name.as_ptr(), &mut source) };
        tx.send((result, source.is_null(), is_initialized())).unwrap();
    });

    let (result, null_handle, initialized) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result, ResultCode::WrongThread);
    assert!(null_handle);
    assert!(!initialized);

    // The same call succeeds from any other thread.
    let source = create_external_source("on time");
    assert!(is_initialized());
    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
}

#[test]
#[serial]
fn test_last_release_on_dispatcher_thread() {
    let host = install_dispatcher();
    let source = create_external_source("released remotely");
    let address = source as usize;

    let (tx, rx) = mpsc::channel();
    host.run(move || {
        mb_object_remove_ref(address as Handle);
        tx.send(()).unwrap();
    });
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(wait_for_shutdown());

    // Back to dedicated threads for the next initialization.
    assert_eq!(mb_library_use_backend(0), ResultCode::Success);
    let source = create_external_source("threads again");
    mb_object_remove_ref(source);
    assert!(wait_for_shutdown());
}
