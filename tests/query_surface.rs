//! Query surface over a live store fed by the capture pipeline.

mod common;

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use decoyflow_core::security::ProbeClass;
use decoyflow_core::{
    process_captures, CaptureContext, EventStore, ListOrder, QueryOptions, QuerySurface,
    StoreConfig,
};
use serde_json::json;

use common::base_time;

#[test]
fn test_captures_flow_into_bundle() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(EventStore::open(StoreConfig::new(dir.path()))?);
    let ctx = CaptureContext::at("collected_data", base_time() - Duration::minutes(30));

    let payloads: Vec<String> = [
        json!({"ip": "203.0.113.5", "url": "/fake_login", "method": "POST",
               "body": "username=admin&password=admin",
               "geo": {"country": "China", "country_code": "CN", "city": "Beijing",
                       "latitude": 39.9, "longitude": 116.4}}),
        json!({"ip": "203.0.113.5", "url": "/fake_login", "method": "POST",
               "body": {"username": "admin", "password": "123456"}}),
        json!({"ip": "203.0.113.6", "url": "/fake_login", "method": "POST",
               "username": "root", "password": "toor", "status": 401}),
        json!({"ip": "192.0.2.77", "url": "/wp-admin/", "method": "GET",
               "headers": {"user-agent": "Mozilla/5.0"}, "status": 404}),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect();

    let batch = process_captures(&store, &ctx, &payloads);
    assert_eq!(batch.stored_count, 4);

    let query = QuerySurface::with_options(Arc::clone(&store), QueryOptions::default());
    let bundle = query.aggregation_bundle_at(base_time())?;

    assert_eq!(bundle.total, 4);
    assert_eq!(bundle.unique_ips, 3);
    assert_eq!(bundle.credential_attempts, 3);
    assert_eq!(bundle.top_usernames[0].value, "admin");
    assert_eq!(bundle.top_usernames[0].count, 2);
    assert_eq!(bundle.top_usernames[1].value, "root");
    assert_eq!(bundle.top_countries[0].value, "Unknown");
    assert_eq!(bundle.top_countries[0].count, 3);
    assert_eq!(bundle.classification_counts.get(&ProbeClass::PathScan), 1);
    assert_eq!(bundle.status_counts.get(&404), 1);
    assert_eq!(bundle.method_counts.get(&"POST".to_string()), 3);

    // Captures without their own timestamp are stamped at receive time.
    assert_eq!(bundle.timeline.last().map(|b| b.count), Some(4));
    assert_eq!(bundle.last_24h, 4);
    assert_eq!(bundle.today, 4);

    let json = serde_json::to_value(&bundle)?;
    assert_eq!(json["method_counts"]["POST"], 3);
    assert_eq!(json["ip_counts"]["203.0.113.5"], 2);
    assert_eq!(json["classification_counts"]["path_scan"], 1);

    let newest = query.list_records(Some(1), ListOrder::NewestFirst);
    assert_eq!(newest[0].endpoint, "/wp-admin/");
    Ok(())
}

#[test]
fn test_clear_then_bundle_is_empty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(EventStore::open(StoreConfig::new(dir.path()))?);
    store.append(common::login(1, "admin", "admin"))?;

    let query = QuerySurface::new(Arc::clone(&store));
    let outcome = query.clear_data()?;
    assert!(outcome.success);
    assert_eq!(outcome.cleared_count, 1);

    let bundle = query.aggregation_bundle_at(base_time())?;
    assert_eq!(bundle.total, 0);
    assert_eq!(bundle.flow.avg_flow_duration, 0.0);
    assert!(bundle.timeline.iter().all(|b| b.count == 0));
    Ok(())
}

#[test]
fn test_export_matches_listing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(EventStore::open(StoreConfig::new(dir.path()))?);
    for n in 0..3 {
        store.append(common::login(n, "admin", "pass,word"))?;
    }
    let query = QuerySurface::new(Arc::clone(&store));

    let mut out = Vec::new();
    assert_eq!(query.export_csv(&mut out)?, 3);

    let mut reader = csv::Reader::from_reader(out.as_slice());
    assert_eq!(reader.headers()?.len(), decoyflow_core::query::CSV_COLUMNS.len());
    let exported: Vec<u64> = reader
        .records()
        .map(|row| -> Result<u64> { Ok(row?[0].parse()?) })
        .collect::<Result<_>>()?;
    let listed: Vec<u64> = query
        .list_records(None, ListOrder::NewestFirst)
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(exported, listed);
    Ok(())
}
