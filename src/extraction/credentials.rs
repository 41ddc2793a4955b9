//! Credential extraction from captured request bodies.
//!
//! Fake login forms post either JSON or `application/x-www-form-urlencoded`
//! bodies with varying field names. This pulls out whatever username and
//! password the client sent.

use serde_json::Value;

use crate::extraction::json_path::first_scalar;
use crate::logging::structured::LogContext;

const USERNAME_PATHS: &[&str] = &[
    "username",
    "user",
    "login",
    "email",
    "credentials.username",
    "credentials.user",
];

const PASSWORD_PATHS: &[&str] = &[
    "password",
    "pass",
    "passwd",
    "credentials.password",
    "credentials.pass",
];

const USERNAME_FORM_KEYS: &[&str] = &["username", "user", "login", "email"];
const PASSWORD_FORM_KEYS: &[&str] = &["password", "pass", "passwd"];

/// Username/password pair found in a body. Either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

/// Extract credentials from a request body.
///
/// A body that parses as a JSON object is read as JSON; anything else is
/// tried as a form body.
pub fn extract_credentials(body: &str, ctx: &LogContext) -> Credentials {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Credentials::default();
    }

    if trimmed.starts_with('{') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(json) => {
                let creds = from_json(&json);
                log::debug!(
                    "{} CREDENTIALS_EXTRACTED source=json username={} password={}",
                    ctx,
                    creds.username.is_some(),
                    creds.password.is_some()
                );
                return creds;
            }
            Err(e) => {
                log::debug!("{} BODY_NOT_JSON error={}", ctx, e);
            }
        }
    }

    let creds = from_form(trimmed);
    if !creds.is_empty() {
        log::debug!(
            "{} CREDENTIALS_EXTRACTED source=form username={} password={}",
            ctx,
            creds.username.is_some(),
            creds.password.is_some()
        );
    }
    creds
}

pub fn from_json(json: &Value) -> Credentials {
    Credentials {
        username: first_scalar(json, USERNAME_PATHS),
        password: first_scalar(json, PASSWORD_PATHS),
    }
}

pub fn from_form(body: &str) -> Credentials {
    let mut creds = Credentials::default();
    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        if creds.username.is_none() && USERNAME_FORM_KEYS.contains(&key.as_ref()) {
            creds.username = Some(value.into_owned());
        } else if creds.password.is_none() && PASSWORD_FORM_KEYS.contains(&key.as_ref()) {
            creds.password = Some(value.into_owned());
        }
    }
    creds
}
