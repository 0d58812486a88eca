#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn krpc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_krpc"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("krpc should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be json")
}

#[test]
fn encode_then_decode_big_endian_request() {
    let encoded = krpc(&[
        "--format",
        "json",
        "encode",
        "--task",
        "1024",
        "--procedure",
        "3",
        "--param",
        "0x10,7",
        "--remote-order",
        "big",
    ]);
    assert!(encoded.status.success());
    let wire = stdout_json(&encoded);
    assert_eq!(wire.get("size").and_then(|v| v.as_u64()), Some(40));
    let hex = wire
        .get("wire")
        .and_then(|v| v.as_str())
        .expect("wire hex should be present")
        .to_string();
    assert!(hex.starts_with("00000062"));

    let decoded = krpc(&["--format", "json", "decode", &hex, "--remote-order", "big"]);
    assert!(decoded.status.success());
    let frame = stdout_json(&decoded);
    let header = frame.get("header").expect("header should be present");
    assert_eq!(header.get("program").and_then(|v| v.as_str()), Some("KERNEL"));
    assert_eq!(header.get("task_id").and_then(|v| v.as_u64()), Some(1024));
    assert_eq!(header.get("parameter_size").and_then(|v| v.as_u64()), Some(8));
    assert_eq!(
        frame.get("payload_words"),
        Some(&serde_json::json!([16, 7]))
    );
}

#[test]
fn decode_truncated_frame_returns_60() {
    let output = krpc(&["decode", "0000006200000062"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn loopback_call_succeeds() {
    let output = krpc(&["--format", "json", "loopback", "--agent", "hifi", "--count", "3"]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report.get("agent").and_then(|v| v.as_str()), Some("hifi-agent"));
    assert_eq!(report.get("calls").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(report.get("ok_replies").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(
        report
            .get("stats")
            .and_then(|s| s.get("sent"))
            .and_then(|v| v.as_u64()),
        Some(3)
    );
}

#[test]
fn loopback_accepts_unbounded_timeout() {
    let output = krpc(&[
        "--format",
        "json",
        "loopback",
        "--timeout",
        "18446744073709551615s",
    ]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report.get("ok_replies").and_then(|v| v.as_u64()), Some(1));
}

#[test]
fn loopback_with_booting_remote_returns_75() {
    let output = krpc(&["loopback", "--status", "uninitialized"]);
    assert_eq!(output.status.code(), Some(75));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not ready"));
}

#[test]
fn loopback_with_failed_remote_returns_69() {
    let output = krpc(&["loopback", "--status", "disabled"]);
    assert_eq!(output.status.code(), Some(69));
}

#[test]
fn loopback_silent_remote_times_out_with_124() {
    let output = krpc(&["loopback", "--silent", "--timeout", "100ms"]);
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn version_reports_package_version() {
    let output = krpc(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("krpc {}", env!("CARGO_PKG_VERSION")));
}
