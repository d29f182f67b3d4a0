//! Round-trip fidelity, unencrypted and encrypted, plus the wrong-key
//! restore failure for the "single-file backup" / "encrypted restore wrong
//! key" concrete scenarios.

mod common;

use std::collections::HashMap;

use tapearc::error::ErrorKind;
use tapearc::restore::{execute_plan, plan_restore, RestoreResult};
use tape_api_types::backup_set::SetStatus;

use common::*;

/// Scenario 1: one 3 MiB file on a blank 10 MiB tape restores byte-identical,
/// and mode/mtime fidelity holds via the catalog entry recorded at write
/// time.
#[test]
fn single_file_backup_round_trips() {
    let payload = seeded_bytes(1, 3 * 1024 * 1024);
    let file = source_file("a.bin", payload.clone());

    let (store, device, uuid) = new_labeled_tape(10 * 1024 * 1024, "DAILY");
    let mut tape_ids = HashMap::new();
    tape_ids.insert(uuid, 1u64);

    let outcome = run_coordinator(device, vec![file], &mut NeverChanger, "DAILY", tape_ids, None, None).unwrap();

    assert_eq!(outcome.backup_sets.len(), 1);
    let set = &outcome.backup_sets[0];
    assert_eq!(set.status, SetStatus::Completed);
    assert_eq!(set.file_count, 1);
    assert!(set.total_bytes >= payload.len() as u64);
    assert_eq!(outcome.entries.len(), 1);
    assert_eq!(outcome.entries[0].mode, 0o644);
    assert_eq!(outcome.entries[0].mtime, 1_700_000_000);

    let mut reader_device = SimulatedTapeDevice::new(store, BLOCK_SIZE);
    let entries = outcome.entries.clone();
    let lookup = move |_set_id: u64| Ok((1u64, entries.clone()));
    let steps = plan_restore(&[(set.id, "a.bin".to_string())], lookup).unwrap();
    let results = execute_plan(&mut reader_device, BLOCK_SIZE, &steps, None, 2).unwrap();

    assert_eq!(results.len(), 1);
    match &results[0] {
        RestoreResult::Ok { path, payload: out } => {
            assert_eq!(path, "a.bin");
            assert_eq!(out, &payload);
        }
        RestoreResult::ChecksumMismatch { .. } => panic!("expected a clean restore"),
    }
}

/// Several files, unencrypted, restore byte-identical.
#[test]
fn multi_file_round_trip_unencrypted() {
    let files = vec![
        source_file("dir/a.txt", seeded_bytes(2, 10_000)),
        source_file("dir/b.txt", seeded_bytes(3, 257)),
        source_file("top.bin", seeded_bytes(4, 1)),
    ];
    let payloads: Vec<Vec<u8>> = files.iter().map(|f| f.payload.clone()).collect();

    let (store, device, uuid) = new_labeled_tape(4 * 1024 * 1024, "DAILY");
    let mut tape_ids = HashMap::new();
    tape_ids.insert(uuid, 1u64);

    let outcome = run_coordinator(device, files.clone(), &mut NeverChanger, "DAILY", tape_ids, None, None).unwrap();
    assert_eq!(outcome.entries.len(), files.len());

    let mut reader_device = SimulatedTapeDevice::new(store, BLOCK_SIZE);
    let entries = outcome.entries.clone();
    let set_id = outcome.backup_sets[0].id;
    let lookup = move |_: u64| Ok((1u64, entries.clone()));
    let requests: Vec<(u64, String)> = files.iter().map(|f| (set_id, f.path.clone())).collect();
    let steps = plan_restore(&requests, lookup).unwrap();
    let results = execute_plan(&mut reader_device, BLOCK_SIZE, &steps, None, 2).unwrap();

    assert_eq!(results.len(), files.len());
    for result in &results {
        match result {
            RestoreResult::Ok { path, payload } => {
                let idx = files.iter().position(|f| &f.path == path).unwrap();
                assert_eq!(payload, &payloads[idx]);
            }
            RestoreResult::ChecksumMismatch { .. } => panic!("expected a clean restore"),
        }
    }
}

/// Scenario 5: a set written under one key restores cleanly under that key,
/// and fails with `BadKey` (no payload bytes) under a different one.
#[test]
fn encrypted_round_trip_and_wrong_key_failure() {
    let key_a = [7u8; 32];
    let key_b = [9u8; 32];
    let payload = seeded_bytes(5, 64 * 1024);
    let file = source_file("secret.bin", payload.clone());

    let (store, device, uuid) = new_labeled_tape(4 * 1024 * 1024, "OFFSITE");
    let mut tape_ids = HashMap::new();
    tape_ids.insert(uuid, 1u64);

    let outcome = run_coordinator(device, vec![file], &mut NeverChanger, "OFFSITE", tape_ids, Some(key_a), Some(1)).unwrap();
    let set = &outcome.backup_sets[0];
    assert!(set.encrypted);
    assert_eq!(set.encryption_key_id, Some(1));

    // Correct key restores cleanly.
    {
        let mut reader_device = SimulatedTapeDevice::new(store.clone(), BLOCK_SIZE);
        let entries = outcome.entries.clone();
        let lookup = move |_: u64| Ok((1u64, entries.clone()));
        let steps = plan_restore(&[(set.id, "secret.bin".to_string())], lookup).unwrap();
        let results = execute_plan(&mut reader_device, BLOCK_SIZE, &steps, Some(key_a), 0).unwrap();
        match &results[0] {
            RestoreResult::Ok { payload: out, .. } => assert_eq!(out, &payload),
            RestoreResult::ChecksumMismatch { .. } => panic!("expected a clean restore"),
        }
    }

    // Wrong key fails with BadKey and never reaches `RestoreResult::Ok`.
    {
        let mut reader_device = SimulatedTapeDevice::new(store, BLOCK_SIZE);
        let entries = outcome.entries.clone();
        let lookup = move |_: u64| Ok((1u64, entries.clone()));
        let steps = plan_restore(&[(set.id, "secret.bin".to_string())], lookup).unwrap();
        let err = execute_plan(&mut reader_device, BLOCK_SIZE, &steps, Some(key_b), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadKey);
    }
}
