//! CSV rendering of flow records.
//!
//! One row per record, columns in [`CSV_COLUMNS`] order. Absent optional
//! values are written as empty cells. Raw headers and bodies are left out.

use std::io;

use chrono::SecondsFormat;

use crate::storage::models::FlowRecord;

/// Header row of the export.
pub const CSV_COLUMNS: [&str; 33] = [
    "id",
    "timestamp",
    "source_ip",
    "source_port",
    "method",
    "endpoint",
    "query",
    "status",
    "response_time_ms",
    "username",
    "password",
    "country",
    "country_code",
    "city",
    "latitude",
    "longitude",
    "classification",
    "user_agent",
    "destination_port",
    "protocol",
    "flow_duration",
    "total_fwd_packets",
    "total_bwd_packets",
    "total_length_fwd_packets",
    "total_length_bwd_packets",
    "flow_bytes_per_sec",
    "flow_packets_per_sec",
    "average_packet_size",
    "syn_flag_count",
    "ack_flag_count",
    "psh_flag_count",
    "fin_flag_count",
    "label",
];

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn row(record: &FlowRecord) -> [String; 33] {
    let flow = &record.flow;
    [
        record.id.to_string(),
        record.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        record.source_ip.to_string(),
        record.source_port.to_string(),
        record.method.clone(),
        record.endpoint.clone(),
        opt(record.query.as_deref()),
        opt(record.status),
        opt(record.response_time_ms),
        opt(record.username.as_deref()),
        opt(record.password.as_deref()),
        record.geo.country.clone(),
        record.geo.country_code.clone(),
        record.geo.city.clone(),
        opt(record.geo.latitude),
        opt(record.geo.longitude),
        opt(record.classification),
        record.user_agent.clone(),
        flow.destination_port.to_string(),
        flow.protocol.to_string(),
        flow.flow_duration.to_string(),
        flow.total_fwd_packets.to_string(),
        flow.total_bwd_packets.to_string(),
        flow.total_length_fwd_packets.to_string(),
        flow.total_length_bwd_packets.to_string(),
        flow.flow_bytes_per_sec.to_string(),
        flow.flow_packets_per_sec.to_string(),
        flow.average_packet_size.to_string(),
        flow.syn_flag_count.to_string(),
        flow.ack_flag_count.to_string(),
        flow.psh_flag_count.to_string(),
        flow.fin_flag_count.to_string(),
        flow.label.clone(),
    ]
}

/// Write a header and one row per record to `out`, in the order given.
/// Returns the number of data rows.
pub fn write_csv<'a, W, I>(out: W, records: I) -> Result<usize, csv::Error>
where
    W: io::Write,
    I: IntoIterator<Item = &'a FlowRecord>,
{
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_COLUMNS)?;

    let mut rows = 0;
    for record in records {
        writer.write_record(row(record))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}
