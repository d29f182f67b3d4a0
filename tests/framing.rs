//! A single flipped bit inside an encrypted set's ciphertext is caught at
//! restore time rather than silently returning corrupted bytes.

mod common;

use std::collections::HashMap;

use tapearc::error::ErrorKind;
use tapearc::restore::{execute_plan, plan_restore};

use common::*;

#[test]
fn corrupted_ciphertext_fails_closed_with_bad_key() {
    let key = [4u8; 32];
    let payload = seeded_bytes(11, 2_000);
    let file = source_file("secret.bin", payload);

    let (store, device, uuid) = new_labeled_tape(1024 * 1024, "VAULT");
    let mut tape_ids = HashMap::new();
    tape_ids.insert(uuid, 1u64);

    let outcome = run_coordinator(device, vec![file], &mut NeverChanger, "VAULT", tape_ids, Some(key), Some(1)).unwrap();
    let set = &outcome.backup_sets[0];

    // Flip one bit inside the ciphertext of the first content block (block
    // index 0 is the label; index 1 is the first block of the encrypted
    // record, whose framed layout is magic(18) + len(4) + nonce(12) +
    // ciphertext..., so any offset past 34 lands inside the AEAD payload).
    store.lock().unwrap().corrupt_block(1, 100, 0);

    let mut reader_device = SimulatedTapeDevice::new(store, BLOCK_SIZE);
    let entries = outcome.entries.clone();
    let lookup = move |_: u64| Ok((1u64, entries.clone()));
    let steps = plan_restore(&[(set.id, "secret.bin".to_string())], lookup).unwrap();
    let err = execute_plan(&mut reader_device, BLOCK_SIZE, &steps, Some(key), 0).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadKey);
}

/// A corrupted plaintext checksum (unencrypted set) surfaces per-file as
/// `RestoreResult::ChecksumMismatch` rather than aborting the whole plan.
#[test]
fn corrupted_plaintext_payload_reports_checksum_mismatch() {
    let payload = seeded_bytes(12, 2_000);
    let file = source_file("plain.bin", payload);

    let (store, device, uuid) = new_labeled_tape(1024 * 1024, "VAULT");
    let mut tape_ids = HashMap::new();
    tape_ids.insert(uuid, 1u64);

    let outcome = run_coordinator(device, vec![file], &mut NeverChanger, "VAULT", tape_ids, None, None).unwrap();
    let set = &outcome.backup_sets[0];

    // Unencrypted records start their payload section right after the
    // 512-byte header block, so corrupting a byte well past offset 0 inside
    // block index 2 (header in block 1, payload starts in block 2) flips a
    // payload byte without touching the header's own path/size/checksum.
    store.lock().unwrap().corrupt_block(2, 10, 0);

    let mut reader_device = SimulatedTapeDevice::new(store, BLOCK_SIZE);
    let entries = outcome.entries.clone();
    let lookup = move |_: u64| Ok((1u64, entries.clone()));
    let steps = plan_restore(&[(set.id, "plain.bin".to_string())], lookup).unwrap();
    let results = execute_plan(&mut reader_device, BLOCK_SIZE, &steps, None, 0).unwrap();

    assert_eq!(results.len(), 1);
    match &results[0] {
        tapearc::restore::RestoreResult::ChecksumMismatch { path } => assert_eq!(path, "plain.bin"),
        tapearc::restore::RestoreResult::Ok { .. } => panic!("expected a checksum mismatch"),
    }
}
