#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::net::TcpListener;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use otcom_peer::BridgeClient;

fn otcom() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_otcom"));
    command.arg("--log-level").arg("error");
    command
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

struct Server {
    child: Child,
    addr: String,
}

impl Server {
    fn start(extra: &[&str]) -> Self {
        let port = free_port();
        let child = otcom()
            .arg("serve")
            .arg("--tcp-port")
            .arg(port.to_string())
            .arg("--print")
            .arg("hide")
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");
        let addr = format!("127.0.0.1:{port}");

        let start = Instant::now();
        while BridgeClient::connect(&addr).is_err() {
            assert!(start.elapsed() < Duration::from_secs(5), "bridge did not come up");
            thread::sleep(Duration::from_millis(25));
        }
        Self { child, addr }
    }

    fn wait_exit(&mut self, timeout: Duration) -> Option<i32> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Some(status) = self.child.try_wait().expect("try_wait") {
                return status.code();
            }
            thread::sleep(Duration::from_millis(25));
        }
        None
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn run_against(server: &Server, args: &[&str]) -> Output {
    otcom()
        .args(args)
        .arg("--addr")
        .arg(&server.addr)
        .output()
        .expect("command should run")
}

#[test]
fn status_without_device_exits_1() {
    let server = Server::start(&[]);
    let output = run_against(&server, &["--format", "json", "status"]);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"connected\":false"), "stdout: {stdout}");
}

#[test]
fn kill_stops_the_server() {
    let mut server = Server::start(&[]);
    let output = run_against(&server, &["kill"]);
    assert!(output.status.success());
    assert_eq!(server.wait_exit(Duration::from_secs(5)), Some(0));
}

#[test]
fn control_requests_are_accepted() {
    let server = Server::start(&[]);
    for args in [
        &["baud", "9600"][..],
        &["flow", "hardware"][..],
        &["reconnect"][..],
        &["send", "--hex", "FF 55"][..],
    ] {
        let output = run_against(&server, args);
        assert!(output.status.success(), "{args:?} failed: {output:?}");
    }
}

#[test]
fn status_against_nothing_fails() {
    let port = free_port();
    let output = otcom()
        .arg("status")
        .arg("--addr")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--timeout")
        .arg("1s")
        .output()
        .expect("status should run");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("error: connect failed"));
}

#[test]
fn build_output_decodes_back() {
    let built = otcom()
        .args(["--format", "pretty", "build", "--id", "0x04", "--cmd", "1"])
        .args(["--seq", "9", "--data", "hello world"])
        .output()
        .expect("build should run");
    assert!(built.status.success());
    let hex = String::from_utf8(built.stdout).expect("utf8");
    assert!(hex.starts_with("FF 55 "), "hex: {hex}");

    let mut decode = otcom()
        .args(["--format", "pretty", "decode"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("decode should start");
    decode
        .stdin
        .take()
        .expect("stdin")
        .write_all(hex.as_bytes())
        .expect("write stdin");
    let decoded = decode.wait_with_output().expect("decode output");

    assert!(decoded.status.success());
    assert_eq!(
        String::from_utf8_lossy(&decoded.stdout).trim_end(),
        "[ 9 ]  [ LOG ]  [ hello world]"
    );
}

#[test]
fn ndef_chunked_build_decodes_as_one_message() {
    let built = otcom()
        .args(["--format", "pretty", "build", "--protocol", "ndef"])
        .args(["--id", "2", "--cmd", "0", "--hex", "01 02 03 04 05", "--chunk", "2"])
        .output()
        .expect("build should run");
    assert!(built.status.success());
    let hex = String::from_utf8(built.stdout).expect("utf8");

    let decoded = otcom()
        .args(["--format", "json", "decode", "--protocol", "ndef"])
        .arg(hex.trim())
        .output()
        .expect("decode should run");
    assert!(decoded.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&decoded.stdout).expect("decode output should be json");
    assert_eq!(value["messages"].as_array().map(Vec::len), Some(1));
    assert_eq!(value["messages"][0]["payload"], "01 02 03 04 05");
    assert_eq!(value["messages"][0]["chunk"], "last");
}

#[test]
fn decode_garbage_exits_60() {
    let output = otcom()
        .args(["decode", "00 11 22 33"])
        .output()
        .expect("decode should run");
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn bad_hex_is_a_usage_error() {
    let output = otcom()
        .args(["build", "--id", "1", "--cmd", "1", "--hex", "ABC"])
        .output()
        .expect("build should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_reports_package_version() {
    let output = otcom().arg("version").output().expect("version should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("otcom {}", env!("CARGO_PKG_VERSION"))
    );
}
