//! Flow feature derivation from observed packets.
//!
//! Produces the CIC-style feature set stored with each record. Times are in
//! microseconds. Any ratio with a zero denominator is 0 and a standard
//! deviation over fewer than two samples is 0, so the output is always finite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::models::FlowMetrics;
use crate::validation::record::ValidationError;

const MICROS_PER_SEC: f64 = 1_000_000.0;

/// One packet of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketObservation {
    /// Microseconds since the flow started.
    pub offset_us: u64,
    pub length: u64,
    pub syn: bool,
    pub ack: bool,
    pub psh: bool,
    pub fin: bool,
}

/// A finished connection as seen by the capture front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowObservation {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default)]
    pub destination_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: u8,
    /// Client to server.
    #[serde(default)]
    pub forward: Vec<PacketObservation>,
    /// Server to client.
    #[serde(default)]
    pub backward: Vec<PacketObservation>,
    #[serde(default)]
    pub label: String,
}

fn default_protocol() -> u8 {
    6
}

impl FlowObservation {
    /// Flow duration in microseconds; 0 if the clock went backwards.
    pub fn duration_us(&self) -> f64 {
        (self.ended_at - self.started_at)
            .num_microseconds()
            .map_or(0.0, |us| us.max(0) as f64)
    }
}

/// Min, max, mean and sample standard deviation of a series.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct SeriesStats {
    min: f64,
    max: f64,
    mean: f64,
    std: f64,
    variance: f64,
}

impl SeriesStats {
    fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = if values.len() < 2 {
            0.0
        } else {
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
        };
        Self {
            min,
            max,
            mean,
            std: variance.sqrt(),
            variance,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn lengths(packets: &[PacketObservation]) -> Vec<f64> {
    packets.iter().map(|p| p.length as f64).collect()
}

/// Gaps between consecutive packets, in arrival order.
fn inter_arrival(packets: &[&PacketObservation]) -> Vec<f64> {
    let mut offsets: Vec<u64> = packets.iter().map(|p| p.offset_us).collect();
    offsets.sort_unstable();
    offsets.windows(2).map(|w| (w[1] - w[0]) as f64).collect()
}

/// Byte total of one direction, or `None` if it does not fit in a `u64`.
fn checked_bytes(packets: &[PacketObservation]) -> Option<u64> {
    packets
        .iter()
        .try_fold(0u64, |total, p| total.checked_add(p.length))
}

/// Compute the stored feature set for one connection.
///
/// Fails only when a byte total does not fit the stored counters.
pub fn derive_metrics(obs: &FlowObservation) -> Result<FlowMetrics, ValidationError> {
    let fwd_bytes = checked_bytes(&obs.forward).ok_or(ValidationError::MetricOverflow {
        field: "total_length_fwd_packets",
    })?;
    let bwd_bytes = checked_bytes(&obs.backward).ok_or(ValidationError::MetricOverflow {
        field: "total_length_bwd_packets",
    })?;

    let duration_us = obs.duration_us();
    let duration_sec = duration_us / MICROS_PER_SEC;

    let fwd_lengths = lengths(&obs.forward);
    let bwd_lengths = lengths(&obs.backward);
    let all_lengths: Vec<f64> = fwd_lengths.iter().chain(&bwd_lengths).copied().collect();

    let fwd = SeriesStats::of(&fwd_lengths);
    let bwd = SeriesStats::of(&bwd_lengths);
    let all = SeriesStats::of(&all_lengths);

    let fwd_refs: Vec<&PacketObservation> = obs.forward.iter().collect();
    let bwd_refs: Vec<&PacketObservation> = obs.backward.iter().collect();
    let all_refs: Vec<&PacketObservation> = obs.forward.iter().chain(&obs.backward).collect();

    let flow_iat = SeriesStats::of(&inter_arrival(&all_refs));
    let fwd_iat = SeriesStats::of(&inter_arrival(&fwd_refs));
    let bwd_iat = SeriesStats::of(&inter_arrival(&bwd_refs));

    let total_fwd_packets = obs.forward.len() as u64;
    let total_bwd_packets = obs.backward.len() as u64;
    let total_packets = total_fwd_packets as f64 + total_bwd_packets as f64;
    let total_bytes = fwd_bytes as f64 + bwd_bytes as f64;

    let count_flag = |flag: fn(&PacketObservation) -> bool| all_refs.iter().filter(|p| flag(p)).count() as u32;

    Ok(FlowMetrics {
        destination_port: obs.destination_port,
        protocol: obs.protocol,
        flow_duration: duration_us,

        total_fwd_packets,
        total_bwd_packets,
        total_length_fwd_packets: fwd_bytes,
        total_length_bwd_packets: bwd_bytes,

        fwd_packet_length_min: fwd.min,
        fwd_packet_length_max: fwd.max,
        fwd_packet_length_mean: fwd.mean,
        fwd_packet_length_std: fwd.std,

        bwd_packet_length_min: bwd.min,
        bwd_packet_length_max: bwd.max,
        bwd_packet_length_mean: bwd.mean,
        bwd_packet_length_std: bwd.std,

        flow_bytes_per_sec: ratio(total_bytes, duration_sec),
        flow_packets_per_sec: ratio(total_packets, duration_sec),

        flow_iat_mean: flow_iat.mean,
        flow_iat_std: flow_iat.std,
        flow_iat_max: flow_iat.max,
        flow_iat_min: flow_iat.min,

        fwd_iat_mean: fwd_iat.mean,
        fwd_iat_std: fwd_iat.std,
        fwd_iat_max: fwd_iat.max,
        fwd_iat_min: fwd_iat.min,

        bwd_iat_mean: bwd_iat.mean,
        bwd_iat_std: bwd_iat.std,
        bwd_iat_max: bwd_iat.max,
        bwd_iat_min: bwd_iat.min,

        syn_flag_count: count_flag(|p| p.syn),
        ack_flag_count: count_flag(|p| p.ack),
        psh_flag_count: count_flag(|p| p.psh),
        fin_flag_count: count_flag(|p| p.fin),

        down_up_ratio: ratio(total_bwd_packets as f64, total_fwd_packets as f64),
        average_packet_size: ratio(total_bytes, total_packets),
        avg_fwd_segment_size: fwd.mean,
        avg_bwd_segment_size: bwd.mean,

        packet_length_mean: all.mean,
        packet_length_std: all.std,
        packet_length_variance: all.variance,

        label: obs.label.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn packet(offset_us: u64, length: u64) -> PacketObservation {
        PacketObservation {
            offset_us,
            length,
            ..Default::default()
        }
    }

    fn observation(duration: Duration, forward: Vec<PacketObservation>, backward: Vec<PacketObservation>) -> FlowObservation {
        let started_at = Utc.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap();
        FlowObservation {
            started_at,
            ended_at: started_at + duration,
            destination_port: 2222,
            protocol: 6,
            forward,
            backward,
            label: "SSH-BruteForce".to_string(),
        }
    }

    #[test]
    fn test_empty_flow_is_all_zero() {
        let metrics = derive_metrics(&observation(Duration::zero(), vec![], vec![])).unwrap();
        assert_eq!(metrics.flow_duration, 0.0);
        assert_eq!(metrics.flow_bytes_per_sec, 0.0);
        assert_eq!(metrics.flow_packets_per_sec, 0.0);
        assert_eq!(metrics.down_up_ratio, 0.0);
        assert_eq!(metrics.average_packet_size, 0.0);
        assert_eq!(metrics.packet_length_std, 0.0);
        assert!(metrics.float_fields().iter().all(|(_, v)| v.is_finite()));
        assert_eq!(metrics.label, "SSH-BruteForce");
    }

    #[test]
    fn test_basic_flow() {
        let mut syn = packet(0, 60);
        syn.syn = true;
        let forward = vec![syn, packet(1_000, 100), packet(3_000, 140)];
        let mut ack = packet(500, 200);
        ack.ack = true;
        let backward = vec![ack];

        let m = derive_metrics(&observation(Duration::seconds(2), forward, backward)).unwrap();

        assert_eq!(m.flow_duration, 2_000_000.0);
        assert_eq!(m.total_fwd_packets, 3);
        assert_eq!(m.total_bwd_packets, 1);
        assert_eq!(m.total_length_fwd_packets, 300);
        assert_eq!(m.total_length_bwd_packets, 200);

        assert_eq!(m.fwd_packet_length_min, 60.0);
        assert_eq!(m.fwd_packet_length_max, 140.0);
        assert_eq!(m.fwd_packet_length_mean, 100.0);
        assert_eq!(m.fwd_packet_length_std, 40.0);
        assert_eq!(m.bwd_packet_length_std, 0.0);

        assert_eq!(m.flow_bytes_per_sec, 250.0);
        assert_eq!(m.flow_packets_per_sec, 2.0);

        // Merged offsets 0, 500, 1000, 3000.
        assert_eq!(m.flow_iat_min, 500.0);
        assert_eq!(m.flow_iat_max, 2_000.0);
        assert_eq!(m.fwd_iat_mean, 1_500.0);
        assert_eq!(m.bwd_iat_mean, 0.0);

        assert_eq!(m.syn_flag_count, 1);
        assert_eq!(m.ack_flag_count, 1);
        assert_eq!(m.down_up_ratio, 1.0 / 3.0);
        assert_eq!(m.average_packet_size, 125.0);
        assert_eq!(m.avg_fwd_segment_size, 100.0);
        assert_eq!(m.avg_bwd_segment_size, 200.0);
        assert_eq!(m.packet_length_mean, 125.0);
    }

    #[test]
    fn test_negative_duration_clamped() {
        let m = derive_metrics(&observation(Duration::seconds(-5), vec![packet(0, 10)], vec![])).unwrap();
        assert_eq!(m.flow_duration, 0.0);
        assert_eq!(m.flow_bytes_per_sec, 0.0);
    }

    #[test]
    fn test_byte_total_overflow_is_an_error() {
        let obs = observation(Duration::seconds(1), vec![packet(0, u64::MAX), packet(10, 1)], vec![]);
        assert_eq!(
            derive_metrics(&obs),
            Err(ValidationError::MetricOverflow {
                field: "total_length_fwd_packets"
            })
        );

        // Each direction fits on its own; the combined rate is still finite.
        let obs = observation(Duration::seconds(1), vec![packet(0, u64::MAX)], vec![packet(5, u64::MAX)]);
        let m = derive_metrics(&obs).unwrap();
        assert_eq!(m.total_length_bwd_packets, u64::MAX);
        assert!(m.flow_bytes_per_sec.is_finite());
    }

    #[test]
    fn test_observation_from_json_defaults() {
        let obs: FlowObservation = serde_json::from_str(
            r#"{
                "started_at": "2026-01-10T08:00:00Z",
                "ended_at": "2026-01-10T08:00:01Z",
                "forward": [{"offset_us": 0, "length": 74, "syn": true}]
            }"#,
        )
        .unwrap();
        assert_eq!(obs.protocol, 6);
        assert!(obs.forward[0].syn);
        assert!(!obs.forward[0].ack);
        assert_eq!(derive_metrics(&obs).unwrap().flow_packets_per_sec, 1.0);
    }
}
