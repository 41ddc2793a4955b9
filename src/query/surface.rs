//! Read and admin operations exposed to the dashboard layer.
//!
//! Each call works on one snapshot of the store, so a bundle never mixes
//! records from before and after a concurrent append.

use std::io;
use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;

use crate::aggregation::{self, CountTable, CredentialField, FlowSummary, HourlyBucket, RankedValue};
use crate::config::{QueryOptions, MAX_TIMELINE_HOURS};
use crate::logging::structured::LogContext;
use crate::security::classifier::ProbeClass;
use crate::storage::models::FlowRecord;
use crate::storage::store::EventStore;
use crate::{log_error, log_info};

use super::error::QueryError;
use super::export::write_csv;

/// Order of "list records" output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOrder {
    #[default]
    NewestFirst,
    Chronological,
}

/// Every dashboard statistic, computed from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationBundle {
    pub generated_at: DateTime<Utc>,
    pub total: u64,
    /// Records since midnight UTC.
    pub today: u64,
    pub last_24h: u64,
    pub unique_ips: u64,
    /// Records that carried a username or a password.
    pub credential_attempts: u64,
    pub top_countries: Vec<RankedValue>,
    pub top_usernames: Vec<RankedValue>,
    pub top_passwords: Vec<RankedValue>,
    pub most_common_username: Option<RankedValue>,
    pub timeline: Vec<HourlyBucket>,
    pub flow: FlowSummary,
    pub method_counts: CountTable<String>,
    pub status_counts: CountTable<u16>,
    pub ip_counts: CountTable<std::net::IpAddr>,
    pub endpoint_counts: CountTable<String>,
    pub classification_counts: CountTable<ProbeClass>,
    pub last_record: Option<FlowRecord>,
}

/// Result of a "clear data" request, shaped for the admin endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearOutcome {
    pub success: bool,
    pub message: String,
    pub archived_file: Option<String>,
    pub cleared_count: usize,
}

pub struct QuerySurface {
    store: Arc<EventStore>,
    options: QueryOptions,
    log_ctx: LogContext,
}

impl QuerySurface {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self::with_options(store, QueryOptions::default())
    }

    pub fn with_options(store: Arc<EventStore>, options: QueryOptions) -> Self {
        let log_ctx = LogContext::new(&store.config().store_name());
        Self {
            store,
            options,
            log_ctx,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Most recent records, at most `limit` (default from options).
    pub fn list_records(&self, limit: Option<usize>, order: ListOrder) -> Vec<FlowRecord> {
        let limit = limit.unwrap_or(self.options.list_limit);
        let snapshot = self.store.read_all();
        let skip = snapshot.len().saturating_sub(limit);
        let recent = snapshot[skip..].iter().cloned();

        match order {
            ListOrder::Chronological => recent.collect(),
            ListOrder::NewestFirst => recent.rev().collect(),
        }
    }

    pub fn timeline(&self, window_hours: u32, now: DateTime<Utc>) -> Result<Vec<HourlyBucket>, QueryError> {
        check_window(window_hours)?;
        let snapshot = self.store.read_all();
        Ok(aggregation::hourly_timeline(&snapshot, window_hours, now))
    }

    pub fn aggregation_bundle(&self) -> Result<AggregationBundle, QueryError> {
        self.aggregation_bundle_at(Utc::now())
    }

    /// Bundle as of `now`.
    pub fn aggregation_bundle_at(&self, now: DateTime<Utc>) -> Result<AggregationBundle, QueryError> {
        let opts = &self.options;
        check_window(opts.timeline_hours)?;

        let records = self.store.read_all();
        let records = records.as_slice();

        Ok(AggregationBundle {
            generated_at: now,
            total: aggregation::total_count(records),
            today: aggregation::count_since(records, start_of_day(now)),
            last_24h: aggregation::count_since(records, now - Duration::hours(24)),
            unique_ips: aggregation::unique_source_ip_count(records),
            credential_attempts: aggregation::credential_attempt_count(records),
            top_countries: aggregation::top_countries(records, opts.top_countries),
            top_usernames: aggregation::top_credentials(
                records,
                CredentialField::Username,
                opts.top_credentials,
            ),
            top_passwords: aggregation::top_credentials(
                records,
                CredentialField::Password,
                opts.top_credentials,
            ),
            most_common_username: aggregation::most_common_username(records),
            timeline: aggregation::hourly_timeline(records, opts.timeline_hours, now),
            flow: aggregation::flow_summary(records),
            method_counts: aggregation::method_counts(records),
            status_counts: aggregation::status_counts(records),
            ip_counts: aggregation::ip_counts(records),
            endpoint_counts: aggregation::endpoint_counts(records),
            classification_counts: aggregation::classification_counts(records),
            last_record: aggregation::last_record(records).cloned(),
        })
    }

    /// Write the active set to `out` as CSV, newest record first.
    ///
    /// An empty store still produces the header row. Returns the number of
    /// records written.
    pub fn export_csv<W: io::Write>(&self, out: W) -> Result<usize, QueryError> {
        let snapshot = self.store.read_all();
        match write_csv(out, snapshot.iter().rev()) {
            Ok(rows) => {
                log_info!(self.log_ctx, "DATA_EXPORTED", rows = rows);
                Ok(rows)
            }
            Err(err) => {
                log_error!(self.log_ctx, "EXPORT_FAILED", error = err.to_string());
                Err(err.into())
            }
        }
    }

    /// Archive and empty the active set.
    pub fn clear_data(&self) -> Result<ClearOutcome, QueryError> {
        match self.store.clear() {
            Ok(Some(cleared)) => {
                let file = cleared.archive.file_name;
                log_info!(
                    self.log_ctx,
                    "DATA_CLEARED",
                    cleared = cleared.record_count,
                    file = file,
                );
                Ok(ClearOutcome {
                    success: true,
                    message: format!("Data cleared and archived to {}", file),
                    archived_file: Some(file),
                    cleared_count: cleared.record_count,
                })
            }
            Ok(None) => Ok(ClearOutcome {
                success: true,
                message: "No data to clear".to_string(),
                archived_file: None,
                cleared_count: 0,
            }),
            Err(err) => {
                log_error!(self.log_ctx, "CLEAR_FAILED", error = err.to_string());
                Err(err.into())
            }
        }
    }
}

fn check_window(hours: u32) -> Result<(), QueryError> {
    if hours == 0 || hours > MAX_TIMELINE_HOURS {
        return Err(QueryError::InvalidWindow {
            hours,
            max: MAX_TIMELINE_HOURS,
        });
    }
    Ok(())
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(i64::from(now.num_seconds_from_midnight()))
        - Duration::nanoseconds(i64::from(now.nanosecond()))
}
