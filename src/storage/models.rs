//! Flow record models.
//!
//! These models are the on-disk shape of the active set and of every archive.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::security::classifier::ProbeClass;

/// Country code used when enrichment could not place an address.
pub const UNKNOWN_COUNTRY_CODE: &str = "XX";

/// Geolocation of a source address, filled in by the enrichment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub country_code: String,
    pub city: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl GeoLocation {
    pub fn unknown() -> Self {
        Self {
            country: "Unknown".to_string(),
            country_code: UNKNOWN_COUNTRY_CODE.to_string(),
            city: "Unknown".to_string(),
            latitude: None,
            longitude: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.country_code == UNKNOWN_COUNTRY_CODE
    }
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Per-connection flow statistics (CIC flow feature set).
///
/// Durations and inter-arrival times are in microseconds, rates per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowMetrics {
    pub destination_port: u16,
    pub protocol: u8,
    pub flow_duration: f64,

    pub total_fwd_packets: u64,
    pub total_bwd_packets: u64,
    pub total_length_fwd_packets: u64,
    pub total_length_bwd_packets: u64,

    pub fwd_packet_length_min: f64,
    pub fwd_packet_length_max: f64,
    pub fwd_packet_length_mean: f64,
    pub fwd_packet_length_std: f64,

    pub bwd_packet_length_min: f64,
    pub bwd_packet_length_max: f64,
    pub bwd_packet_length_mean: f64,
    pub bwd_packet_length_std: f64,

    pub flow_bytes_per_sec: f64,
    pub flow_packets_per_sec: f64,

    pub flow_iat_mean: f64,
    pub flow_iat_std: f64,
    pub flow_iat_max: f64,
    pub flow_iat_min: f64,

    pub fwd_iat_mean: f64,
    pub fwd_iat_std: f64,
    pub fwd_iat_max: f64,
    pub fwd_iat_min: f64,

    pub bwd_iat_mean: f64,
    pub bwd_iat_std: f64,
    pub bwd_iat_max: f64,
    pub bwd_iat_min: f64,

    pub syn_flag_count: u32,
    pub ack_flag_count: u32,
    pub psh_flag_count: u32,
    pub fin_flag_count: u32,

    pub down_up_ratio: f64,
    pub average_packet_size: f64,
    pub avg_fwd_segment_size: f64,
    pub avg_bwd_segment_size: f64,

    pub packet_length_mean: f64,
    pub packet_length_std: f64,
    pub packet_length_variance: f64,

    pub label: String,
}

impl Default for FlowMetrics {
    fn default() -> Self {
        Self {
            destination_port: 0,
            protocol: 6,
            flow_duration: 0.0,
            total_fwd_packets: 0,
            total_bwd_packets: 0,
            total_length_fwd_packets: 0,
            total_length_bwd_packets: 0,
            fwd_packet_length_min: 0.0,
            fwd_packet_length_max: 0.0,
            fwd_packet_length_mean: 0.0,
            fwd_packet_length_std: 0.0,
            bwd_packet_length_min: 0.0,
            bwd_packet_length_max: 0.0,
            bwd_packet_length_mean: 0.0,
            bwd_packet_length_std: 0.0,
            flow_bytes_per_sec: 0.0,
            flow_packets_per_sec: 0.0,
            flow_iat_mean: 0.0,
            flow_iat_std: 0.0,
            flow_iat_max: 0.0,
            flow_iat_min: 0.0,
            fwd_iat_mean: 0.0,
            fwd_iat_std: 0.0,
            fwd_iat_max: 0.0,
            fwd_iat_min: 0.0,
            bwd_iat_mean: 0.0,
            bwd_iat_std: 0.0,
            bwd_iat_max: 0.0,
            bwd_iat_min: 0.0,
            syn_flag_count: 0,
            ack_flag_count: 0,
            psh_flag_count: 0,
            fin_flag_count: 0,
            down_up_ratio: 0.0,
            average_packet_size: 0.0,
            avg_fwd_segment_size: 0.0,
            avg_bwd_segment_size: 0.0,
            packet_length_mean: 0.0,
            packet_length_std: 0.0,
            packet_length_variance: 0.0,
            label: String::new(),
        }
    }
}

impl FlowMetrics {
    /// Floating-point metrics by name, for validation and reporting.
    pub fn float_fields(&self) -> [(&'static str, f64); 34] {
        [
            ("flow_duration", self.flow_duration),
            ("fwd_packet_length_min", self.fwd_packet_length_min),
            ("fwd_packet_length_max", self.fwd_packet_length_max),
            ("fwd_packet_length_mean", self.fwd_packet_length_mean),
            ("fwd_packet_length_std", self.fwd_packet_length_std),
            ("bwd_packet_length_min", self.bwd_packet_length_min),
            ("bwd_packet_length_max", self.bwd_packet_length_max),
            ("bwd_packet_length_mean", self.bwd_packet_length_mean),
            ("bwd_packet_length_std", self.bwd_packet_length_std),
            ("flow_bytes_per_sec", self.flow_bytes_per_sec),
            ("flow_packets_per_sec", self.flow_packets_per_sec),
            ("flow_iat_mean", self.flow_iat_mean),
            ("flow_iat_std", self.flow_iat_std),
            ("flow_iat_max", self.flow_iat_max),
            ("flow_iat_min", self.flow_iat_min),
            ("fwd_iat_mean", self.fwd_iat_mean),
            ("fwd_iat_std", self.fwd_iat_std),
            ("fwd_iat_max", self.fwd_iat_max),
            ("fwd_iat_min", self.fwd_iat_min),
            ("bwd_iat_mean", self.bwd_iat_mean),
            ("bwd_iat_std", self.bwd_iat_std),
            ("bwd_iat_max", self.bwd_iat_max),
            ("bwd_iat_min", self.bwd_iat_min),
            ("down_up_ratio", self.down_up_ratio),
            ("average_packet_size", self.average_packet_size),
            ("avg_fwd_segment_size", self.avg_fwd_segment_size),
            ("avg_bwd_segment_size", self.avg_bwd_segment_size),
            ("packet_length_mean", self.packet_length_mean),
            ("packet_length_std", self.packet_length_std),
            ("packet_length_variance", self.packet_length_variance),
            // Integer totals are checked as floats too so one loop covers them.
            ("total_fwd_packets", self.total_fwd_packets as f64),
            ("total_bwd_packets", self.total_bwd_packets as f64),
            ("total_length_fwd_packets", self.total_length_fwd_packets as f64),
            ("total_length_bwd_packets", self.total_length_bwd_packets as f64),
        ]
    }
}

/// One captured interaction as produced by the enrichment step, before the
/// store assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub timestamp: DateTime<Utc>,
    pub source_ip: IpAddr,
    pub source_port: u16,

    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    pub endpoint: String,
    pub method: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub response_time_ms: Option<u64>,

    pub geo: GeoLocation,
    pub flow: FlowMetrics,

    #[serde(default)]
    pub classification: Option<ProbeClass>,

    #[serde(default)]
    pub headers: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user_agent: String,
}

impl CapturedEvent {
    /// A bare probe with unknown location and empty flow metrics.
    pub fn probe(
        timestamp: DateTime<Utc>,
        source_ip: IpAddr,
        source_port: u16,
        method: &str,
        endpoint: &str,
    ) -> Self {
        Self {
            timestamp,
            source_ip,
            source_port,
            username: None,
            password: None,
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            query: None,
            status: None,
            response_time_ms: None,
            geo: GeoLocation::unknown(),
            flow: FlowMetrics::default(),
            classification: None,
            headers: String::new(),
            body: None,
            user_agent: String::new(),
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_geo(mut self, geo: GeoLocation) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_flow(mut self, flow: FlowMetrics) -> Self {
        self.flow = flow;
        self
    }

    pub fn is_credential_attempt(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }
}

/// A persisted flow record: a captured event plus its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub id: u64,
    #[serde(flatten)]
    pub event: CapturedEvent,
}

impl std::ops::Deref for FlowRecord {
    type Target = CapturedEvent;

    fn deref(&self) -> &CapturedEvent {
        &self.event
    }
}
