#![allow(dead_code)]

use std::net::IpAddr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use decoyflow_core::{CapturedEvent, GeoLocation};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 14, 12, 0, 0).unwrap()
}

pub fn ip(n: u32) -> IpAddr {
    IpAddr::from([198, 51, (n >> 8) as u8, n as u8])
}

/// The `n`-th login of a run; later `n` means a later timestamp, all well
/// before `base_time()`.
pub fn login(n: u32, username: &str, password: &str) -> CapturedEvent {
    login_at(
        base_time() - Duration::days(30) + Duration::minutes(i64::from(n)),
        n,
        username,
        password,
    )
}

pub fn login_at(timestamp: DateTime<Utc>, n: u32, username: &str, password: &str) -> CapturedEvent {
    CapturedEvent::probe(
        timestamp,
        ip(n % 50),
        40_000 + (n % 1000) as u16,
        "POST",
        "/fake_login",
    )
    .with_credentials(username, password)
}

pub fn from_country(event: CapturedEvent, country: &str, code: &str) -> CapturedEvent {
    event.with_geo(GeoLocation {
        country: country.to_string(),
        country_code: code.to_string(),
        city: String::new(),
        latitude: None,
        longitude: None,
    })
}
