//! Flow record validation.
//!
//! Runs before anything is persisted; a record that fails here never reaches
//! the active set.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::models::{CapturedEvent, GeoLocation};

/// Why a captured event was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("latitude and longitude must be both present or both absent")]
    PartialCoordinates,

    #[error("coordinates out of range: lat={latitude} lon={longitude}")]
    CoordinatesOutOfRange { latitude: f64, longitude: f64 },

    #[error("coordinates given for unlocated country code {0:?}")]
    CoordinatesForUnknownCountry(String),

    #[error("flow metric `{field}` must be finite and non-negative, got {value}")]
    InvalidMetric { field: &'static str, value: f64 },

    #[error("flow metric `{field}` overflows")]
    MetricOverflow { field: &'static str },

    #[error("timestamp {got} is older than the last stored record ({last})")]
    TimestampRegressed {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

/// Check every invariant a stored flow record must hold.
pub fn validate_event(event: &CapturedEvent) -> Result<(), ValidationError> {
    if event.endpoint.trim().is_empty() {
        return Err(ValidationError::MissingField("endpoint"));
    }
    if event.method.is_empty() {
        return Err(ValidationError::MissingField("method"));
    }
    if !is_http_token(&event.method) {
        return Err(ValidationError::InvalidMethod(event.method.clone()));
    }
    if event.geo.country_code.is_empty() {
        return Err(ValidationError::MissingField("country_code"));
    }

    validate_geo(&event.geo)?;

    for (field, value) in event.flow.float_fields() {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidMetric { field, value });
        }
    }

    Ok(())
}

/// Records in one store file never go back in time.
pub fn check_timestamp_order(
    last: Option<DateTime<Utc>>,
    got: DateTime<Utc>,
) -> Result<(), ValidationError> {
    match last {
        Some(last) if got < last => Err(ValidationError::TimestampRegressed { last, got }),
        _ => Ok(()),
    }
}

fn validate_geo(geo: &GeoLocation) -> Result<(), ValidationError> {
    match (geo.latitude, geo.longitude) {
        (None, None) => Ok(()),
        (Some(latitude), Some(longitude)) => {
            if geo.is_unknown() {
                return Err(ValidationError::CoordinatesForUnknownCountry(
                    geo.country_code.clone(),
                ));
            }
            let in_range = (-90.0..=90.0).contains(&latitude)
                && (-180.0..=180.0).contains(&longitude);
            if in_range {
                Ok(())
            } else {
                Err(ValidationError::CoordinatesOutOfRange {
                    latitude,
                    longitude,
                })
            }
        }
        _ => Err(ValidationError::PartialCoordinates),
    }
}

/// Uppercase ASCII verb such as GET, POST or PROPFIND.
fn is_http_token(method: &str) -> bool {
    method.len() <= 16 && method.bytes().all(|b| b.is_ascii_uppercase())
}
