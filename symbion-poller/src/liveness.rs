//! Host liveness check
//!
//! One ICMP echo through the system `ping` binary: raw ICMP sockets need
//! CAP_NET_RAW, the setuid/capability-enabled `ping` does not.

use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Round-trip time of a single echo, `None` when the host did not answer in time
pub async fn ping(address: &str, timeout: Duration) -> Option<Duration> {
    let wait_secs = timeout.as_secs().max(1);
    let started = Instant::now();

    let mut command = Command::new("ping");
    command
        .arg("-n")
        .arg("-c")
        .arg("1")
        .arg("-W")
        .arg(wait_secs.to_string())
        .arg(address)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(%address, error = %e, "failed to run ping");
            return None;
        }
        Err(_) => {
            debug!(%address, "ping timed out");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(parse_round_trip(&stdout).unwrap_or_else(|| started.elapsed()))
}

/// Extracts `time=0.045 ms` from ping output
pub fn parse_round_trip(output: &str) -> Option<Duration> {
    let start = output.find("time=")? + "time=".len();
    let number: String = output[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let millis: f64 = number.parse().ok()?;
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(millis / 1000.0))
}
