//! Summary statistics over a snapshot of the active set.
//!
//! Every function here is pure: it takes the records it is given and never
//! touches the store, so callers can run any mix of them over one consistent
//! snapshot.

use std::collections::HashSet;
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::security::classifier::ProbeClass;
use crate::storage::models::FlowRecord;

use super::counts::CountTable;

const SECONDS_PER_HOUR: i64 = 3600;

/// Which half of a credential pair to rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    Username,
    Password,
}

impl CredentialField {
    fn value<'a>(&self, record: &'a FlowRecord) -> Option<&'a str> {
        match self {
            CredentialField::Username => record.username.as_deref(),
            CredentialField::Password => record.password.as_deref(),
        }
    }
}

/// A ranked value and how many records carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedValue {
    pub value: String,
    pub count: u64,
}

/// One hour of the attack timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyBucket {
    pub hour_start: DateTime<Utc>,
    pub count: u64,
}

/// Flow-level averages across a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FlowSummary {
    pub avg_flow_duration: f64,
    pub max_flow_bytes_per_sec: f64,
    pub avg_packet_size: f64,
}

pub fn total_count(records: &[FlowRecord]) -> u64 {
    records.len() as u64
}

/// Records with `timestamp >= cutoff`.
pub fn count_since(records: &[FlowRecord], cutoff: DateTime<Utc>) -> u64 {
    records.iter().filter(|r| r.timestamp >= cutoff).count() as u64
}

pub fn unique_source_ip_count(records: &[FlowRecord]) -> u64 {
    records
        .iter()
        .map(|r| r.source_ip)
        .collect::<HashSet<IpAddr>>()
        .len() as u64
}

/// Most frequent countries. Records without a country name are not ranked.
pub fn top_countries(records: &[FlowRecord], k: usize) -> Vec<RankedValue> {
    let table: CountTable<&str> = records
        .iter()
        .map(|r| r.geo.country.as_str())
        .filter(|country| !country.is_empty())
        .collect();
    ranked(&table, k)
}

/// Most frequent usernames or passwords.
///
/// Records that carry no value for `field` are skipped; an empty string is a
/// value like any other.
pub fn top_credentials(records: &[FlowRecord], field: CredentialField, k: usize) -> Vec<RankedValue> {
    let table: CountTable<&str> = records.iter().filter_map(|r| field.value(r)).collect();
    ranked(&table, k)
}

pub fn most_common_username(records: &[FlowRecord]) -> Option<RankedValue> {
    let table: CountTable<&str> = records
        .iter()
        .filter_map(|r| CredentialField::Username.value(r))
        .collect();
    table.most_common().map(|(value, count)| RankedValue {
        value: value.to_string(),
        count,
    })
}

/// Records that carried a username or a password.
pub fn credential_attempt_count(records: &[FlowRecord]) -> u64 {
    records.iter().filter(|r| r.is_credential_attempt()).count() as u64
}

/// Hourly counts for the `window_hours` hours ending at the next top of the
/// hour after `now` (or at `now` itself when it is already on the hour).
///
/// Buckets are oldest first and always `window_hours` long.
pub fn hourly_timeline(records: &[FlowRecord], window_hours: u32, now: DateTime<Utc>) -> Vec<HourlyBucket> {
    let end = ceil_to_hour(now);
    let start = end - Duration::hours(i64::from(window_hours));

    let mut counts = vec![0u64; window_hours as usize];
    for record in records {
        if record.timestamp < start || record.timestamp >= end {
            continue;
        }
        let offset = (record.timestamp - start).num_seconds() / SECONDS_PER_HOUR;
        if let Some(slot) = counts.get_mut(offset as usize) {
            *slot += 1;
        }
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HourlyBucket {
            hour_start: start + Duration::hours(i as i64),
            count,
        })
        .collect()
}

/// Non-finite metric values are skipped; an empty snapshot gives zeros.
pub fn flow_summary(records: &[FlowRecord]) -> FlowSummary {
    FlowSummary {
        avg_flow_duration: finite_mean(records.iter().map(|r| r.flow.flow_duration)),
        max_flow_bytes_per_sec: finite_max(records.iter().map(|r| r.flow.flow_bytes_per_sec)),
        avg_packet_size: finite_mean(records.iter().map(|r| r.flow.average_packet_size)),
    }
}

pub fn method_counts(records: &[FlowRecord]) -> CountTable<String> {
    records.iter().map(|r| r.method.clone()).collect()
}

/// Records without a response status are not counted.
pub fn status_counts(records: &[FlowRecord]) -> CountTable<u16> {
    records.iter().filter_map(|r| r.status).collect()
}

pub fn ip_counts(records: &[FlowRecord]) -> CountTable<IpAddr> {
    records.iter().map(|r| r.source_ip).collect()
}

pub fn endpoint_counts(records: &[FlowRecord]) -> CountTable<String> {
    records.iter().map(|r| r.endpoint.clone()).collect()
}

/// Unclassified records are counted as `Normal`.
pub fn classification_counts(records: &[FlowRecord]) -> CountTable<ProbeClass> {
    records
        .iter()
        .map(|r| r.classification.unwrap_or(ProbeClass::Normal))
        .collect()
}

pub fn last_record(records: &[FlowRecord]) -> Option<&FlowRecord> {
    records.last()
}

fn ranked(table: &CountTable<&str>, k: usize) -> Vec<RankedValue> {
    table
        .top_k(k)
        .into_iter()
        .map(|(value, count)| RankedValue {
            value: value.to_string(),
            count,
        })
        .collect()
}

fn ceil_to_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let into_hour = Duration::seconds(now.timestamp().rem_euclid(SECONDS_PER_HOUR))
        + Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()));
    if into_hour.is_zero() {
        now
    } else {
        now - into_hour + Duration::hours(1)
    }
}

fn finite_mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0u64), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn finite_max(values: impl Iterator<Item = f64>) -> f64 {
    values
        .filter(|v| v.is_finite())
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))))
        .unwrap_or(0.0)
}
