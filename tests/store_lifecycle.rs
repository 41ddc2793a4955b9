//! End-to-end store behavior: concurrency, rotation, reopen, clear.

mod common;

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use decoyflow_core::storage::ArchiveReason;
use decoyflow_core::{EventStore, FlowRecord, StoreConfig, StoreError, ValidationError};

use common::{base_time, login, login_at};

fn open(dir: &std::path::Path, threshold: usize) -> Result<EventStore> {
    Ok(EventStore::open(
        StoreConfig::new(dir).with_rotation_threshold(threshold),
    )?)
}

#[test]
fn test_concurrent_appends_get_unique_increasing_ids() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(open(dir.path(), 10_000)?);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        // Writers race, so they share one timestamp.
                        let event = login_at(base_time(), t * 100 + i, "admin", "admin");
                        store.append(event).map(|r| r.id)
                    })
                    .collect::<Result<Vec<u64>, _>>()
            })
        })
        .collect();

    let mut returned = Vec::new();
    for handle in handles {
        let ids = handle.join().expect("writer thread panicked")?;
        // Each writer sees its own ids increase.
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        returned.extend(ids);
    }

    let records = store.read_all();
    assert_eq!(records.len(), 200);
    let stored: Vec<u64> = records.iter().map(|r| r.id).collect();
    assert_eq!(stored, (1..=200).collect::<Vec<u64>>());

    returned.sort_unstable();
    assert_eq!(returned, stored);
    Ok(())
}

#[test]
fn test_rotation_after_threshold_plus_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open(dir.path(), 1000)?;

    let mut appended: Vec<FlowRecord> = Vec::new();
    for n in 0..1001 {
        appended.push(store.append(login(n, "root", "toor"))?);
    }

    assert_eq!(store.len(), 0);
    let archives = store.list_archives()?;
    assert_eq!(archives.len(), 1);

    let archive = store.read_archive(&archives[0])?;
    assert_eq!(archive.reason, ArchiveReason::Rotation);
    assert_eq!(archive.records.len(), 1001);
    assert_eq!(archive.records, appended);
    Ok(())
}

#[test]
fn test_rotation_keeps_arrival_order_across_rounds() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open(dir.path(), 4)?;

    for n in 0..12 {
        store.append(login(n, "admin", ""))?;
        assert!(store.len() <= 4);
    }

    let archives = store.list_archives()?;
    assert_eq!(archives.len(), 2);
    let first = store.read_archive(&archives[0])?;
    let second = store.read_archive(&archives[1])?;
    assert_eq!(first.records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert_eq!(second.records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![6, 7, 8, 9, 10]);
    assert_eq!(store.read_all().iter().map(|r| r.id).collect::<Vec<_>>(), vec![11, 12]);
    Ok(())
}

#[test]
fn test_reopen_after_rotation_keeps_ids_unique() -> Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let store = open(dir.path(), 2)?;
        for n in 0..3 {
            store.append(login(n, "pi", "raspberry"))?;
        }
        assert!(store.is_empty());
    }

    let store = open(dir.path(), 2)?;
    let next = store.append(login(3, "pi", "raspberry"))?;
    assert_eq!(next.id, 4);

    store.clear()?;
    let mut seen = Vec::new();
    for info in store.list_archives()? {
        seen.extend(store.read_archive(&info)?.records.into_iter().map(|r| r.id));
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3, 4]);
    Ok(())
}

#[test]
fn test_clear_empty_store_creates_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open(dir.path(), 1000)?;

    assert!(store.clear()?.is_none());
    assert!(store.clear()?.is_none());
    assert!(store.list_archives()?.is_empty());
    Ok(())
}

#[test]
fn test_append_read_back_is_identical() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let event = common::from_country(login(7, "admin", "p@ss w0rd"), "Germany", "DE");

    let stored = {
        let store = open(dir.path(), 1000)?;
        store.append(event.clone())?
    };
    assert_eq!(stored.event, event);

    let store = open(dir.path(), 1000)?;
    let records = store.read_all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], stored);
    Ok(())
}

#[test]
fn test_active_file_is_always_parseable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open(dir.path(), 1000)?;
    for n in 0..5 {
        store.append(login(n, "admin", "1234"))?;
        let raw = std::fs::read_to_string(dir.path().join("request_log.json"))?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(value["records"].as_array().map(Vec::len), Some(n as usize + 1));
        assert_eq!(value["next_id"], n as u64 + 2);
    }
    Ok(())
}

#[test]
fn test_earlier_event_is_refused() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open(dir.path(), 1000)?;
    let noon = base_time();
    let morning = base_time() - chrono::Duration::hours(5);

    store.append(login_at(noon, 1, "admin", "admin"))?;
    let err = store
        .append(login_at(morning, 2, "root", "root"))
        .expect_err("earlier event must be refused");
    assert!(matches!(
        err,
        StoreError::Malformed(ValidationError::TimestampRegressed { .. })
    ));

    let reopened = open(dir.path(), 1000)?;
    let records = reopened.read_all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].timestamp, noon);
    Ok(())
}

#[test]
fn test_unwritable_archive_retries_on_next_append() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = StoreConfig::new(dir.path()).with_rotation_threshold(2);
    // Archives go to a directory that does not exist yet.
    config.archive_prefix = "pending/requests_".to_string();
    let store = EventStore::open(config)?;

    for n in 0..3 {
        store.append(login(n, "admin", "admin"))?;
    }
    assert_eq!(store.len(), 3);
    assert!(!dir.path().join("pending").exists());

    std::fs::create_dir(dir.path().join("pending"))?;
    let next = store.append(login(3, "admin", "admin"))?;
    assert_eq!(next.id, 4);
    assert!(store.is_empty());

    let archived: Vec<_> = std::fs::read_dir(dir.path().join("pending"))?
        .collect::<std::io::Result<Vec<_>>>()?;
    assert_eq!(archived.len(), 1);
    let raw = std::fs::read_to_string(archived[0].path())?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    assert_eq!(value["record_count"], 4);
    assert_eq!(value["first_id"], 1);
    assert_eq!(value["last_id"], 4);
    Ok(())
}
