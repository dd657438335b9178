#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::Command;

use cd11_frame::FrameFactory;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/cd11cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("ephemeral bind should succeed")
        .local_addr()
        .expect("local addr")
        .port()
}

#[test]
fn decode_truncated_stream_reports_complete_frames_then_fails() {
    let dir = unique_temp_dir("decode-truncated");
    let path = dir.join("frames.bin");

    let factory = FrameFactory::new().with_frame_creator("AAA");
    let first = factory.alert("first").expect("alert should build");
    let second = factory.alert("second").expect("alert should build");
    let mut bytes = first.to_bytes().expect("encode").to_vec();
    let second = second.to_bytes().expect("encode");
    bytes.extend_from_slice(&second[..second.len() - 5]);
    std::fs::write(&path, &bytes).expect("capture should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_cd11"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("decode")
        .arg(&path)
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(60));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    let summary: serde_json::Value =
        serde_json::from_str(lines[0]).expect("summary should be json");
    assert_eq!(summary["frame_type"], "ALERT");
    assert_eq!(summary["crc_valid"], true);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn request_to_closed_port_is_a_transport_error() {
    let port = free_port();
    let output = Command::new(env!("CARGO_BIN_EXE_cd11"))
        .arg("request")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--station")
        .arg("AAA")
        .arg("--timeout")
        .arg("1s")
        .output()
        .expect("request should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connection request failed"));
}

#[test]
fn dataman_with_missing_config_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_cd11"))
        .arg("dataman")
        .arg("--config")
        .arg("/nonexistent/cd11-receiver.json")
        .env_remove("CD11_CONFIG")
        .output()
        .expect("dataman should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn dataman_rejects_config_with_duplicate_stations() {
    let dir = unique_temp_dir("dup-stations");
    let path = dir.join("receiver.json");
    std::fs::write(
        &path,
        r#"{"stations": [
            {"station_name": "AAA", "data_port": 8101},
            {"station_name": "AAA", "data_port": 8102}
        ]}"#,
    )
    .expect("config should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_cd11"))
        .arg("dataman")
        .arg("--config")
        .arg(&path)
        .output()
        .expect("dataman should run");

    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}
