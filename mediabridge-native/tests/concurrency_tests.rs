//! Concurrent access to the process-wide factory

mod common;

use common::*;
use mediabridge_native::ffi::library::mb_library_report_live_objects;
use mediabridge_native::ffi::object::mb_object_remove_ref;
use mediabridge_native::GlobalFactory;
use serial_test::serial;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
#[serial]
fn test_global_factory_is_unique() {
    let addresses: Vec<usize> = (0..16)
        .map(|_| thread::spawn(|| Arc::as_ptr(GlobalFactory::global()) as usize))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();
    assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
#[serial]
fn test_concurrent_first_use_initializes_once() {
    reset_library();
    let factory = GlobalFactory::global();
    let before = factory.initialization_count();

    let barrier = Arc::new(Barrier::new(8));
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                create_external_source(&format!("racer {}", i)) as usize
            })
        })
        .collect();
    let handles: Vec<usize> = workers.into_iter().map(|worker| worker.join().unwrap()).collect();

    assert_eq!(factory.initialization_count(), before + 1);
    assert_eq!(mb_library_report_live_objects(), 8);

    for handle in handles {
        mb_object_remove_ref(handle as _);
    }
    assert!(wait_for_shutdown());
    assert_eq!(factory.ref_count(), 0);
}

#[test]
#[serial]
fn test_create_and_release_from_many_threads() {
    reset_library();
    let workers: Vec<_> = (0..8)
        .map(|i| {
            thread::spawn(move || {
                for round in 0..50 {
                    let source = create_external_source(&format!("worker {} round {}", i, round));
                    mb_object_remove_ref(source);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(wait_for_shutdown());
    assert_eq!(mb_library_report_live_objects(), 0);
}

#[test]
#[serial]
fn test_instance_ptr_if_exist_never_initializes() {
    reset_library();
    assert!(GlobalFactory::instance_ptr_if_exist().is_none());
    assert!(!is_initialized());

    let source = create_external_source("present");
    let factory_ref = GlobalFactory::instance_ptr_if_exist().unwrap();
    assert!(!factory_ref.is_stale());
    mb_object_remove_ref(source);
    // The extra reference keeps the library up.
    assert!(is_initialized());
    drop(factory_ref);
    assert!(wait_for_shutdown());
}
