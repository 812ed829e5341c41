//! Tests for the Write-Ahead Log
//!
//! These tests verify:
//! - Writer LSN assignment and reopen behavior
//! - Reader iteration over intact logs
//! - Recovery from partial writes (truncated tail)
//! - Recovery with corrupted entries (CRC mismatch)
//! - Verify mode (stats only, file untouched)

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use hgindex::config::WalSyncStrategy;
use hgindex::error::EngineError;
use hgindex::wal::{Record, WalEntry, WalReader, WalRecovery, WalWriter, WriteOp, HEADER_SIZE};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn commit(seq: u64, key: &str, value: Option<&str>) -> Record {
    Record::Commit {
        seq,
        writes: vec![WriteOp {
            namespace: 1,
            key: key.as_bytes().to_vec(),
            value: value.map(|v| v.as_bytes().to_vec()),
        }],
    }
}

/// Write well-formed commits through the writer
fn write_entries_via_writer(path: &PathBuf, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(commit(i as u64 + 1, &format!("key{}", i), Some(&format!("value{}", i))))
            .unwrap();
    }
}

/// Write raw frames directly to a file (for crafting corruption)
fn write_raw_entries(path: &PathBuf, entries: &[WalEntry]) {
    let mut file = File::create(path).unwrap();
    for entry in entries {
        file.write_all(&entry.encode().unwrap()).unwrap();
    }
    file.sync_all().unwrap();
}

fn append_bytes(path: &PathBuf, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Entry Framing Tests
// =============================================================================

#[test]
fn test_entry_frame_layout() {
    let entry = WalEntry::new(7, commit(3, "k", Some("v")));
    let frame = entry.encode().unwrap();

    assert!(frame.len() > HEADER_SIZE);
    assert_eq!(&frame[0..8], &7u64.to_le_bytes());
    let payload_len = u32::from_le_bytes([frame[12], frame[13], frame[14], frame[15]]) as usize;
    assert_eq!(frame.len(), HEADER_SIZE + payload_len);
}

#[test]
fn test_entry_decode_detects_crc_mismatch() {
    let entry = WalEntry::new(1, commit(1, "k", Some("v")));
    let frame = entry.encode().unwrap();
    let crc = u32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]]);

    let mut payload = frame[HEADER_SIZE..].to_vec();
    let last = payload.len() - 1;
    payload[last] ^= 0xFF;

    let result = WalEntry::decode(1, crc, &payload);
    assert!(matches!(result, Err(EngineError::Corruption(_))));
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_write_single_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    let lsn = writer.append(commit(1, "k", Some("v"))).unwrap();

    assert_eq!(lsn, 1);
    assert_eq!(writer.current_lsn(), 2);
    assert!(writer.size() > HEADER_SIZE as u64);
    assert_eq!(writer.path(), wal_path.as_path());
}

#[test]
fn test_writer_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 6);

    let lsn = writer.append(commit(6, "next", None)).unwrap();
    assert_eq!(lsn, 6);
}

#[test]
fn test_writer_batched_sync_is_readable() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 4 }).unwrap();
        for i in 0..10 {
            writer.append(commit(i + 1, "k", Some("v"))).unwrap();
        }
        writer.sync().unwrap();
    }

    let entries: Vec<_> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 10);
}

#[test]
fn test_writer_logs_namespace_records() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer
            .append(Record::CreateNamespace {
                id: 1,
                name: "primitive".to_string(),
            })
            .unwrap();
        writer.append(Record::DropNamespace { id: 1 }).unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();
    let first = reader.next_entry().unwrap().unwrap();
    let second = reader.next_entry().unwrap().unwrap();
    assert!(reader.next_entry().unwrap().is_none());

    assert_eq!(
        first.record,
        Record::CreateNamespace {
            id: 1,
            name: "primitive".to_string()
        }
    );
    assert_eq!(second.record, Record::DropNamespace { id: 1 });
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), 0);
}

#[test]
fn test_reader_preserves_write_ops() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(commit(1, "k1", Some("v1"))).unwrap();
        writer.append(commit(2, "k1", None)).unwrap();
    }

    let entries: Vec<_> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();

    match &entries[1].record {
        Record::Commit { seq, writes } => {
            assert_eq!(*seq, 2);
            assert_eq!(writes[0].key, b"k1".to_vec());
            assert!(writes[0].value.is_none());
        }
        other => panic!("unexpected record {:?}", other),
    }
}

#[test]
fn test_reader_reports_partial_write() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 1);
    append_bytes(&wal_path, &[1, 2, 3]);

    let mut iter = WalReader::open(&wal_path).unwrap().entries();
    assert!(iter.next().unwrap().is_ok());
    assert!(matches!(iter.next(), Some(Err(EngineError::PartialWrite(_)))));
    assert!(iter.next().is_none());
}

// =============================================================================
// Recover: Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 0);
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.last_lsn, 10);
    assert!(!result.was_truncated);

    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.lsn, (i + 1) as u64);
    }
}

// =============================================================================
// Recover: Partial Write Tests (was_truncated = true)
// =============================================================================

#[test]
fn test_recover_partial_header_at_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    let clean_len = std::fs::metadata(&wal_path).unwrap().len();
    append_bytes(&wal_path, &[0xAB; HEADER_SIZE - 4]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.entries_corrupted, 0);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_partial_payload_at_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 1);
    let clean_len = std::fs::metadata(&wal_path).unwrap().len();

    let frame = WalEntry::new(2, commit(2, "torn", Some("value"))).encode().unwrap();
    append_bytes(&wal_path, &frame[..frame.len() - 3]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_writer_appends_cleanly_after_recovery() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    append_bytes(&wal_path, &[9; 5]);

    WalRecovery::recover(&wal_path).unwrap();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        assert_eq!(writer.append(commit(3, "after", Some("x"))).unwrap(), 3);
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 3);
    assert!(!result.was_truncated);
}

// =============================================================================
// Recover: Corruption Tests (CRC mismatch)
// =============================================================================

#[test]
fn test_recover_stops_at_corrupted_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    let entries: Vec<_> = (1..=3)
        .map(|lsn| WalEntry::new(lsn, commit(lsn, "k", Some("v"))))
        .collect();
    write_raw_entries(&wal_path, &entries);

    // Flip the last byte of the final frame's payload
    let mut bytes = std::fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&wal_path, &bytes).unwrap();

    let (recovered, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(recovered.len(), 2);
    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 2);
    assert!(result.was_truncated);
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_with_partial_write() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    append_bytes(&wal_path, &[0u8; 7]);
    let len_before = std::fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.entries_corrupted, 0);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), len_before);
}

#[test]
fn test_recover_and_verify_agree() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 4);
    append_bytes(&wal_path, &[1; 3]);

    let verified = WalRecovery::verify(&wal_path).unwrap();
    let (_, recovered) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(verified, recovered);
}
