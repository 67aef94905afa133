use crate::output::print_json;
use converge_core::health::{endpoint_url, wait_for_ready};
use std::time::Duration;

pub fn run(host: &str, port: u16, timeout_seconds: u64, json: bool) -> anyhow::Result<()> {
    let url = endpoint_url(host, port);
    let signal = wait_for_ready(
        &url,
        Duration::from_secs(timeout_seconds),
        Duration::from_secs(5),
    )?;

    if json {
        #[derive(serde::Serialize)]
        struct ValidateOutput<'a> {
            url: &'a str,
            status: u16,
            waited_seconds: u64,
            auth_required: bool,
        }
        return print_json(&ValidateOutput {
            url: &url,
            status: signal.status,
            waited_seconds: signal.waited.as_secs(),
            auth_required: signal.status == 403,
        });
    }

    let note = if signal.status == 403 {
        " (auth required, as expected)"
    } else {
        ""
    };
    println!("Jenkins is up: HTTP {}{} at {}", signal.status, note, url);
    Ok(())
}
