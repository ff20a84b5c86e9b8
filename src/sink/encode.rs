// Line-protocol encoding of sealed windows for the downstream time-series store.

use std::fmt::Write as _;

use crate::line_protocol::{escape_measurement, escape_tag};
use crate::models::{Aggregate, Key};
use crate::window::SealedWindow;

/// One point per key:
/// `measurement,host=..,path=..,server_name=.. total_requests=Ni,total_failures=Ni,
/// total_response_time=F,mean_response_time=F,status_<code>=Ni ... <timestamp_ns>`.
/// Empty tag values are omitted since line protocol cannot carry them.
pub fn encode_point(key: &Key, aggregate: &Aggregate, timestamp_ns: i64) -> String {
    let mut line = String::with_capacity(128);
    line.push_str(&escape_measurement(key.measurement()));
    for (tag, value) in [
        ("host", key.host()),
        ("path", key.path()),
        ("server_name", key.server_name()),
    ] {
        if !value.is_empty() {
            let _ = write!(line, ",{tag}={}", escape_tag(value));
        }
    }
    let _ = write!(
        line,
        " total_requests={}i,total_failures={}i,total_response_time={},mean_response_time={}",
        aggregate.total_requests,
        aggregate.total_failures,
        aggregate.total_response_time,
        aggregate.mean_response_time(),
    );
    for (code, count) in &aggregate.status_code_histogram {
        let _ = write!(line, ",status_{code}={count}i");
    }
    let _ = write!(line, " {timestamp_ns}");
    line
}

/// Every point of a window, in key order, stamped with the window's seal time.
pub fn encode_window(window: &SealedWindow) -> Vec<String> {
    let timestamp_ns = window.sealed_at().timestamp_nanos_opt().unwrap_or_default();
    window
        .sorted()
        .into_iter()
        .map(|(key, aggregate)| encode_point(key, aggregate, timestamp_ns))
        .collect()
}

/// Packs newline-separated lines into payloads of at most `max_bytes`.
/// A single line longer than `max_bytes` becomes its own payload.
pub fn pack_lines(lines: &[String], max_bytes: usize) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current = String::new();
    for line in lines {
        let needed = if current.is_empty() {
            line.len()
        } else {
            current.len() + 1 + line.len()
        };
        if needed > max_bytes && !current.is_empty() {
            payloads.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        payloads.push(current);
    }
    payloads
}
