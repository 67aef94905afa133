use assert_cmd::Command;
use predicates::prelude::*;

fn jenkinsctl() -> Command {
    Command::cargo_bin("jenkinsctl").unwrap()
}

// ---------------------------------------------------------------------------
// CLI surface
// ---------------------------------------------------------------------------

#[test]
fn help_lists_all_commands() {
    jenkinsctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("stack"));
}

#[test]
fn version_flag_works() {
    jenkinsctl().arg("--version").assert().success();
}

#[test]
fn unknown_platform_override_is_rejected() {
    jenkinsctl()
        .args(["plan", "--platform", "plan9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported platform"));
}

// ---------------------------------------------------------------------------
// jenkinsctl validate
// ---------------------------------------------------------------------------

fn host_and_port(server: &mockito::ServerGuard) -> (String, String) {
    let hp = server.host_with_port();
    let (host, port) = hp.split_once(':').expect("host:port");
    (host.to_string(), port.to_string())
}

#[test]
fn validate_accepts_auth_required_response() {
    let mut server = mockito::Server::new();
    let _m = server.mock("GET", "/").with_status(403).create();
    let (host, port) = host_and_port(&server);

    jenkinsctl()
        .args(["validate", "--host", &host, "--port", &port, "--timeout-seconds", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("auth required"));
}

#[test]
fn validate_json_reports_status() {
    let mut server = mockito::Server::new();
    let _m = server.mock("GET", "/").with_status(403).create();
    let (host, port) = host_and_port(&server);

    jenkinsctl()
        .args(["--json", "validate", "--host", &host, "--port", &port, "--timeout-seconds", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": 403"))
        .stdout(predicate::str::contains("\"auth_required\": true"));
}

#[test]
fn validate_fails_on_server_error() {
    let mut server = mockito::Server::new();
    let _m = server.mock("GET", "/").with_status(503).create();
    let (host, port) = host_and_port(&server);

    jenkinsctl()
        .args(["validate", "--host", &host, "--port", &port, "--timeout-seconds", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("journalctl"));
}

#[test]
fn validate_fails_on_connection_refused() {
    // Port 9 (discard) is assumed unbound.
    jenkinsctl()
        .args(["validate", "--host", "127.0.0.1", "--port", "9", "--timeout-seconds", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("timed out"));
}

// ---------------------------------------------------------------------------
// jenkinsctl stack
// ---------------------------------------------------------------------------

#[test]
fn stack_deploy_rejects_malformed_parameter() {
    jenkinsctl()
        .args([
            "stack",
            "deploy",
            "--template",
            "template.yaml",
            "--param",
            "no-equals-sign",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}
