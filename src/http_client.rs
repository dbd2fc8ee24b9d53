//! Shared HTTP client (C2): one `reqwest::Client` per process, with the
//! rate-limit registry and TTL cache composed on top per-provider rather
//! than each forecast provider opening its own client.
#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for the random pre-fetch jitter `TtlCache::get_or_fetch`
/// applies on every call after the first, so restarts don't line every
/// provider's first poll up on the same instant.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(15);

pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}
