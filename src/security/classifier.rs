//! Probe classification for captured requests.
//!
//! Sorts generic probes into coarse attack categories:
//! - Path scans for sensitive files and admin panels
//! - Known scanner tooling by user agent
//! - SQL injection, XSS and command injection payloads
//! - Oversized POST bodies

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::logging::structured::LogContext;

/// POST bodies above this size are flagged when nothing else matched.
pub const SUSPICIOUS_POST_BYTES: usize = 1000;

lazy_static! {
    /// Sensitive path detection patterns
    static ref PATH_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\.env\b").unwrap(),
        Regex::new(r"(?i)wp-(admin|login)").unwrap(),
        Regex::new(r"(?i)phpmyadmin").unwrap(),
        Regex::new(r"(?i)/\.git(/|$)").unwrap(),
        Regex::new(r"[\\/]etc[\\/](passwd|shadow)").unwrap(),
        Regex::new(r"\.\.[\\/]").unwrap(),
    ];

    /// Scanner user-agent patterns
    static ref SCANNER_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)sqlmap").unwrap(),
        Regex::new(r"(?i)nikto").unwrap(),
        Regex::new(r"(?i)nmap").unwrap(),
        Regex::new(r"(?i)masscan").unwrap(),
        Regex::new(r"(?i)zgrab").unwrap(),
        Regex::new(r"(?i)gobuster|dirbuster").unwrap(),
    ];

    /// SQL injection, XSS and command injection patterns
    static ref INJECTION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)'\s*(or|and)\s*'?\d").unwrap(),
        Regex::new(r"(?i)\b1\s*=\s*1\b").unwrap(),
        Regex::new(r"(?i)union\s+(all\s+)?select").unwrap(),
        Regex::new(r"(?i);\s*(drop|delete|truncate|alter)\s").unwrap(),
        Regex::new(r"(?i)<script[^>]*>").unwrap(),
        Regex::new(r"(?i)javascript:").unwrap(),
        Regex::new(r";\s*(rm|cat|wget|curl|chmod)\s").unwrap(),
        Regex::new(r"\|\s*(bash|sh|zsh)\b").unwrap(),
        Regex::new(r"\$\([^)]+\)").unwrap(),
    ];
}

/// Attack category assigned to a captured request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeClass {
    PathScan,
    Scanner,
    Injection,
    SuspiciousPost,
    Normal,
}

impl ProbeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeClass::PathScan => "path_scan",
            ProbeClass::Scanner => "scanner",
            ProbeClass::Injection => "injection",
            ProbeClass::SuspiciousPost => "suspicious_post",
            ProbeClass::Normal => "normal",
        }
    }

    pub fn is_attack(&self) -> bool {
        *self != ProbeClass::Normal
    }
}

impl fmt::Display for ProbeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a request the classifier looks at.
#[derive(Debug, Clone, Copy)]
pub struct ProbeInput<'a> {
    pub method: &'a str,
    pub endpoint: &'a str,
    pub user_agent: &'a str,
    pub query: Option<&'a str>,
    pub body: Option<&'a str>,
}

/// Classify a request. The first matching category wins, in the order
/// path scan, scanner, injection, suspicious POST.
pub fn classify_probe(input: &ProbeInput<'_>, ctx: &LogContext) -> ProbeClass {
    let class = if let Some(pattern) = first_match(&PATH_PATTERNS, input.endpoint) {
        log::debug!("{} PATTERN_DETECTED type=path pattern={}", ctx, pattern);
        ProbeClass::PathScan
    } else if let Some(pattern) = first_match(&SCANNER_PATTERNS, input.user_agent) {
        log::debug!("{} PATTERN_DETECTED type=scanner pattern={}", ctx, pattern);
        ProbeClass::Scanner
    } else if let Some(pattern) = input
        .query
        .into_iter()
        .chain(input.body)
        .find_map(|s| first_match(&INJECTION_PATTERNS, s))
    {
        log::debug!("{} PATTERN_DETECTED type=injection pattern={}", ctx, pattern);
        ProbeClass::Injection
    } else if input.method.eq_ignore_ascii_case("POST")
        && input.body.map_or(0, str::len) > SUSPICIOUS_POST_BYTES
    {
        ProbeClass::SuspiciousPost
    } else {
        ProbeClass::Normal
    };

    if class.is_attack() {
        log::info!(
            "{} PROBE_CLASSIFIED class={} endpoint={}",
            ctx,
            class,
            input.endpoint
        );
    }

    class
}

fn first_match<'p>(patterns: &'p [Regex], s: &str) -> Option<&'p str> {
    patterns
        .iter()
        .find(|pattern| pattern.is_match(s))
        .map(Regex::as_str)
}
