// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Parameter and file service scenarios from spec.md §8 (S5, S6, properties 6
// and 8): unknown parameter type, single in-flight rejection, file read past
// EOF, and append-write growing a file.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{fast_config, wire_pair, FaultAction};
use rdt_link::error::ServiceError;
use rdt_link::fs_port::StdFileSystem;
use rdt_link::proto::file_service::FileService;
use rdt_link::proto::param_service::{ParamDescriptor, ParamService};

fn tmp_dir(tag: &str) -> std::path::PathBuf {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut dir = std::env::temp_dir();
    dir.push(format!("rdt-link-services-test-{tag}-{}-{}", std::process::id(), n));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn s5_unknown_parameter_type_reports_unknown() {
    let (engine_a, engine_b) = wire_pair(fast_config(), fast_config(), |_, _| FaultAction::Pass, |_, _| FaultAction::Pass);
    let client = ParamService::new(engine_a);
    let _server = ParamService::new(engine_b);

    let err = client.get(0x7E, 32, Duration::from_secs(1)).unwrap_err();
    assert_eq!(err, ServiceError::Protocol(rdt_link::error::return_code::param::UNKNOWN));
}

#[test]
fn parameter_get_and_set_round_trip_through_registry() {
    let (engine_a, engine_b) = wire_pair(fast_config(), fast_config(), |_, _| FaultAction::Pass, |_, _| FaultAction::Pass);
    let client = ParamService::new(engine_a);
    let server = ParamService::new(engine_b);

    let stored = Arc::new(Mutex::new(vec![1u8, 2, 3]));
    let stored_read = stored.clone();
    let stored_write = stored.clone();
    server.register(
        0x10,
        ParamDescriptor {
            read: Some(Box::new(move || stored_read.lock().unwrap().clone())),
            write: Some(Box::new(move |data| {
                *stored_write.lock().unwrap() = data.to_vec();
                true
            })),
        },
    );

    let got = client.get(0x10, 32, Duration::from_secs(1)).unwrap();
    assert_eq!(got, vec![1, 2, 3]);

    client.set(0x10, &[9, 9], Duration::from_secs(1)).unwrap();
    assert_eq!(*stored.lock().unwrap(), vec![9, 9]);

    let got_after_set = client.get(0x10, 32, Duration::from_secs(1)).unwrap();
    assert_eq!(got_after_set, vec![9, 9]);
}

#[test]
fn property6_second_request_while_one_in_flight_is_rejected() {
    let (engine_a, engine_b) = wire_pair(fast_config(), fast_config(), |_, _| FaultAction::Pass, |_, _| FaultAction::Pass);
    let client = Arc::new(ParamService::new(engine_a));
    let server = ParamService::new(engine_b);

    // A slow read handler keeps the client's single in-flight slot occupied
    // long enough for a second call to observe it.
    server.register(
        0x20,
        ParamDescriptor {
            read: Some(Box::new(|| {
                std::thread::sleep(Duration::from_millis(150));
                vec![0x42]
            })),
            write: None,
        },
    );

    let client_bg = client.clone();
    let handle = std::thread::spawn(move || client_bg.get(0x20, 8, Duration::from_millis(500)));
    std::thread::sleep(Duration::from_millis(30));

    let second = client.get(0x20, 8, Duration::from_millis(500));
    assert_eq!(second.unwrap_err(), ServiceError::RequestInProgress);

    let first = handle.join().unwrap();
    assert_eq!(first.unwrap(), vec![0x42]);
}

#[test]
fn s6_read_past_eof_returns_short_slice() {
    let (engine_a, engine_b) = wire_pair(fast_config(), fast_config(), |_, _| FaultAction::Pass, |_, _| FaultAction::Pass);
    let root = tmp_dir("read-eof");
    std::fs::write(root.join("data.bin"), vec![9u8; 100]).unwrap();

    let client = FileService::new(engine_a, None);
    let _server = FileService::new(engine_b, Some(Arc::new(StdFileSystem::new(&root))));

    let got = client.read("data.bin", Some(50), 200, Duration::from_secs(1)).unwrap();
    assert_eq!(got.len(), 50);
    assert!(got.iter().all(|&b| b == 9));
}

#[test]
fn append_write_grows_file_and_offset_read_matches_contents() {
    let (engine_a, engine_b) = wire_pair(fast_config(), fast_config(), |_, _| FaultAction::Pass, |_, _| FaultAction::Pass);
    let root = tmp_dir("append-write");

    let client = FileService::new(engine_a, None);
    let _server = FileService::new(engine_b, Some(Arc::new(StdFileSystem::new(&root))));

    client.write("log.bin", None, b"hello", Duration::from_secs(1)).unwrap();
    client.write("log.bin", None, b" world", Duration::from_secs(1)).unwrap();

    let got = client.read("log.bin", Some(0), 64, Duration::from_secs(1)).unwrap();
    assert_eq!(got, b"hello world");

    let tail = client.read("log.bin", Some(6), 64, Duration::from_secs(1)).unwrap();
    assert_eq!(tail, b"world");
}

#[test]
fn list_directory_round_trips_through_the_wire() {
    let (engine_a, engine_b) = wire_pair(fast_config(), fast_config(), |_, _| FaultAction::Pass, |_, _| FaultAction::Pass);
    let root = tmp_dir("list");
    std::fs::write(root.join("a.txt"), b"x").unwrap();
    std::fs::write(root.join("b.txt"), b"y").unwrap();

    let client = FileService::new(engine_a, None);
    let _server = FileService::new(engine_b, Some(Arc::new(StdFileSystem::new(&root))));

    let listing = client.list(root.to_str().unwrap(), Duration::from_secs(1)).unwrap();
    let listing = String::from_utf8(listing).unwrap();
    assert!(listing.contains("a.txt"));
    assert!(listing.contains("b.txt"));
}
