// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

fn conntop_command(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_conntop"));
    // keep the developer's own .conntoprc out of the tests unless one is given
    if !args.contains(&"--config-file") {
        cmd.arg("--ignore-config");
    }
    cmd.args(args).env_remove("RUST_LOG");
    cmd
}

fn collect(output: std::process::Output) -> (String, String, i32) {
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

/// Run conntop with `input` on stdin; "-" is appended as the input path.
pub fn run_conntop_with_input(args: &[&str], input: &[u8]) -> (String, String, i32) {
    let mut child = conntop_command(args)
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start conntop");

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input).expect("Failed to write to stdin");
    }

    collect(child.wait_with_output().expect("Failed to read output"))
}

/// Run conntop on a temporary file holding `file_content`.
pub fn run_conntop_with_file(args: &[&str], file_content: &str) -> (String, String, i32) {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file
        .write_all(file_content.as_bytes())
        .expect("Failed to write to temp file");

    let path = temp_file.path().to_str().expect("temp path is UTF-8");
    let mut full_args = args.to_vec();
    full_args.push(path);
    run_conntop(&full_args)
}

/// Run conntop with exactly the given arguments.
pub fn run_conntop(args: &[&str]) -> (String, String, i32) {
    let output = conntop_command(args)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute conntop");
    collect(output)
}

/// One tab-separated line in Zeek conn.log layout.
pub fn conn_line(origin: &str, responder: &str, orig_ip_bytes: u64, resp_ip_bytes: u64) -> String {
    let mut fields: Vec<String> = (0..21).map(|i| format!("f{}", i)).collect();
    fields[0] = "1331904000.000000".to_string();
    fields[1] = "CxRp8a1RrXuXkZ9Yu1".to_string();
    fields[2] = origin.to_string();
    fields[3] = "51234".to_string();
    fields[4] = responder.to_string();
    fields[5] = "443".to_string();
    fields[16] = orig_ip_bytes.to_string();
    fields[18] = resp_ip_bytes.to_string();
    fields.join("\t")
}

/// Zeek-style header lines followed by `lines`, newline terminated.
pub fn conn_log(lines: &[String]) -> String {
    let mut out = String::from("#separator \\x09\n#path\tconn\n");
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Parse text report lines into (key, percent) pairs.
pub fn parse_report(stdout: &str) -> Vec<(String, f64)> {
    stdout
        .lines()
        .map(|line| {
            let mut parts = line.split_whitespace();
            let key = parts.next().expect("report line has a key").to_string();
            let percent = parts
                .next()
                .and_then(|p| p.strip_suffix('%'))
                .and_then(|p| p.parse().ok())
                .expect("report line has a percentage");
            (key, percent)
        })
        .collect()
}
