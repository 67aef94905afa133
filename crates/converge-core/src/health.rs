//! Externally observable end-state check.
//!
//! A provisioned host answers on the configured port with either a 2xx or an
//! HTTP 403 — Jenkins is up but wants authentication. Connection refused and
//! 5xx mean the service is not (yet) serving; we poll until the deadline and
//! then fail with the last observation. This poll loop is the only place the
//! tool waits on anything; individual steps are never retried.

use crate::error::{ConvergeError, Result};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadySignal {
    pub status: u16,
    pub waited: Duration,
}

pub fn endpoint_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}/")
}

/// One probe of the endpoint. `Ok(Some(status))` means provisioned.
fn probe_once(url: &str) -> Option<u16> {
    match ureq::get(url).timeout(Duration::from_secs(5)).call() {
        Ok(resp) => Some(resp.status()),
        // 403 is the expected steady state: running, auth required.
        Err(ureq::Error::Status(403, _)) => Some(403),
        // Other statuses, connection refused, reset: not serving yet.
        Err(_) => None,
    }
}

pub fn wait_for_ready(url: &str, timeout: Duration, interval: Duration) -> Result<ReadySignal> {
    let started = Instant::now();
    loop {
        if let Some(status) = probe_once(url) {
            return Ok(ReadySignal {
                status,
                waited: started.elapsed(),
            });
        }
        if started.elapsed() >= timeout {
            return Err(ConvergeError::Timeout {
                what: format!(
                    "no ready response from {url}; check logs: journalctl -u jenkins -n 50"
                ),
                seconds: timeout.as_secs(),
            });
        }
        std::thread::sleep(interval.min(timeout.saturating_sub(started.elapsed())));
    }
}
