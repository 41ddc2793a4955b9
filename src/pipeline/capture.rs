//! Capture ingestion pipeline.
//!
//! Turns raw capture payloads from the decoy front end into stored records:
//! 1. Parse the JSON payload
//! 2. Fill in credentials from the body when not given
//! 3. Default the location and derive flow metrics
//! 4. Classify the probe
//! 5. Validate and append

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::extraction::credentials::{extract_credentials, from_json};
use crate::flow::derive::{derive_metrics, FlowObservation};
use crate::logging::structured::LogContext;
use crate::security::classifier::{classify_probe, ProbeClass, ProbeInput};
use crate::storage::error::StoreError;
use crate::storage::models::{CapturedEvent, FlowMetrics, GeoLocation};
use crate::storage::store::EventStore;
use crate::validation::ValidationError;
use crate::{log_info, log_warn};

use super::context::CaptureContext;

/// A captured request as posted by the decoy front end.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCapture {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(alias = "ip")]
    pub source_ip: IpAddr,
    #[serde(default)]
    pub source_port: u16,
    #[serde(alias = "url", alias = "path")]
    pub endpoint: String,
    pub method: String,
    /// JSON object of headers, or the raw header block.
    #[serde(default)]
    pub headers: Option<Value>,
    /// Raw body string, or a body the front end already parsed as JSON.
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default, alias = "userAgent")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, alias = "statusCode")]
    pub status: Option<u16>,
    #[serde(default, alias = "responseTime")]
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub geo: Option<GeoLocation>,
    #[serde(default)]
    pub flow: Option<FlowMetrics>,
    #[serde(default)]
    pub observation: Option<FlowObservation>,
    #[serde(default)]
    pub classification: Option<ProbeClass>,
}

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    Stored {
        id: u64,
        classification: ProbeClass,
    },
    /// Unparseable or invalid payload. Nothing was stored.
    Rejected {
        reason: String,
        content_hash: String,
    },
    /// Valid payload the store could not persist.
    Failed { error: String },
}

/// Result of processing a batch.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureBatchResult {
    pub batch_id: String,
    pub received_count: usize,
    pub stored_count: usize,
    pub rejected_count: usize,
    pub failed_count: usize,
    pub outcomes: Vec<CaptureOutcome>,
}

/// Process a batch of capture payloads in order.
pub fn process_captures(store: &EventStore, ctx: &CaptureContext, payloads: &[String]) -> CaptureBatchResult {
    let mut outcomes = Vec::with_capacity(payloads.len());
    let (mut stored, mut rejected, mut failed) = (0, 0, 0);

    for (index, payload) in payloads.iter().enumerate() {
        let log_ctx = ctx.capture_log_context(index);
        let outcome = process_capture(store, ctx, payload, &log_ctx);
        match outcome {
            CaptureOutcome::Stored { .. } => stored += 1,
            CaptureOutcome::Rejected { .. } => rejected += 1,
            CaptureOutcome::Failed { .. } => failed += 1,
        }
        outcomes.push(outcome);
    }

    log_info!(
        ctx.log_context(),
        "BATCH_COMPLETE",
        received = payloads.len(),
        stored = stored,
        rejected = rejected,
        failed = failed,
    );

    CaptureBatchResult {
        batch_id: ctx.batch_id.clone(),
        received_count: payloads.len(),
        stored_count: stored,
        rejected_count: rejected,
        failed_count: failed,
        outcomes,
    }
}

/// Process one capture payload.
pub fn process_capture(
    store: &EventStore,
    ctx: &CaptureContext,
    payload: &str,
    log_ctx: &LogContext,
) -> CaptureOutcome {
    let raw: RawCapture = match serde_json::from_str(payload) {
        Ok(raw) => raw,
        Err(e) => {
            let content_hash = content_hash(payload);
            log_warn!(log_ctx, "CAPTURE_PARSE_FAILED", error = e.to_string(), hash = content_hash);
            return CaptureOutcome::Rejected {
                reason: format!("JSON parse error: {}", e),
                content_hash,
            };
        }
    };

    let client_stamped = raw.timestamp.is_some();
    let event = match build_event(raw, ctx.received_at, log_ctx) {
        Ok(event) => event,
        Err(reason) => {
            let content_hash = content_hash(payload);
            log_warn!(log_ctx, "CAPTURE_REJECTED", reason = reason.to_string(), hash = content_hash);
            return CaptureOutcome::Rejected {
                reason: reason.to_string(),
                content_hash,
            };
        }
    };
    let classification = event.classification.unwrap_or(ProbeClass::Normal);

    // A client-supplied time is kept as sent and refused if it goes back in
    // time; a receive time is ours to order.
    let appended = if client_stamped {
        store.append(event)
    } else {
        store.append_received(event)
    };

    match appended {
        Ok(record) => {
            log_info!(
                log_ctx,
                "CAPTURE_STORED",
                id = record.id,
                ip = record.source_ip.to_string(),
                endpoint = record.endpoint,
                class = classification,
                credential = record.is_credential_attempt(),
            );
            CaptureOutcome::Stored {
                id: record.id,
                classification,
            }
        }
        Err(StoreError::Malformed(reason)) => CaptureOutcome::Rejected {
            reason: reason.to_string(),
            content_hash: content_hash(payload),
        },
        Err(err) => CaptureOutcome::Failed {
            error: err.to_string(),
        },
    }
}

/// Enrich a raw capture into an event ready for the store.
///
/// Fails when the packet observation cannot be summarised.
pub fn build_event(
    raw: RawCapture,
    received_at: DateTime<Utc>,
    log_ctx: &LogContext,
) -> Result<CapturedEvent, ValidationError> {
    let headers = headers_to_string(raw.headers.as_ref());
    let user_agent = raw
        .user_agent
        .or_else(|| header_value(raw.headers.as_ref(), "user-agent"))
        .unwrap_or_default();

    let (body, body_creds) = match raw.body {
        None | Some(Value::Null) => (None, Default::default()),
        Some(Value::String(s)) => {
            let creds = extract_credentials(&s, log_ctx);
            (Some(s), creds)
        }
        Some(json) => (Some(json.to_string()), from_json(&json)),
    };

    let username = raw.username.or(body_creds.username);
    let password = raw.password.or(body_creds.password);

    let flow = match (raw.flow, raw.observation) {
        (Some(flow), _) => flow,
        (None, Some(obs)) => derive_metrics(&obs)?,
        (None, None) => FlowMetrics::default(),
    };

    let method = raw.method.trim().to_ascii_uppercase();

    let classification = raw.classification.unwrap_or_else(|| {
        classify_probe(
            &ProbeInput {
                method: &method,
                endpoint: &raw.endpoint,
                user_agent: &user_agent,
                query: raw.query.as_deref(),
                body: body.as_deref(),
            },
            log_ctx,
        )
    });

    Ok(CapturedEvent {
        timestamp: raw.timestamp.unwrap_or(received_at),
        source_ip: raw.source_ip,
        source_port: raw.source_port,
        username,
        password,
        endpoint: raw.endpoint,
        method,
        query: raw.query,
        status: raw.status,
        response_time_ms: raw.response_time_ms,
        geo: raw.geo.unwrap_or_default(),
        flow,
        classification: Some(classification),
        headers,
        body,
        user_agent,
    })
}

/// SHA-256 of a payload, hex encoded.
pub fn content_hash(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

fn headers_to_string(headers: Option<&Value>) -> String {
    match headers {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn header_value(headers: Option<&Value>, name: &str) -> Option<String> {
    headers?
        .as_object()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.as_str())
        .map(str::to_string)
}
