// Observation parser: one datagram of line protocol -> zero or more observations.
//
//   measurement,tag=value,... field=value,... [timestamp]
//
// Structural problems reject the whole datagram with a DecodeError. Bad values in
// the fields we care about are logged and defaulted so request volume is still counted.

use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::line_protocol::{find_unescaped, split_once_unescaped, split_unescaped, unescape};
use crate::models::Observation;

pub const TAG_HOST: &str = "host";
pub const TAG_SERVER_NAME: &str = "server_name";
pub const TAG_PATH: &str = "path";
pub const TAG_STATUS_CODE: &str = "status_code";
pub const FIELD_RESPONSE_TIME: &str = "response_time";
pub const FIELD_RESPONSE_SIZE: &str = "response_size";

/// Decodes every point in `datagram`. Blank lines and `#` comments are skipped.
pub fn parse_datagram(datagram: &[u8]) -> Result<Vec<Observation>, DecodeError> {
    let text = std::str::from_utf8(datagram).map_err(|_| DecodeError::InvalidUtf8)?;
    let mut observations = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        observations.push(parse_line(line, idx + 1)?);
    }
    Ok(observations)
}

/// Decodes a single point. `line_no` is only used in errors.
pub fn parse_line(line: &str, line_no: usize) -> Result<Observation, DecodeError> {
    let Ok(Some(head_end)) = find_unescaped(line, b' ', false) else {
        return Err(DecodeError::MissingFields { line: line_no });
    };
    let head = &line[..head_end];
    let rest = line[head_end + 1..].trim_start_matches(' ');

    let fields_end = find_unescaped(rest, b' ', true)
        .map_err(|_| DecodeError::UnterminatedString { line: line_no })?;
    let (fields, timestamp) = match fields_end {
        Some(end) => (&rest[..end], rest[end + 1..].trim()),
        None => (rest, ""),
    };
    if fields.is_empty() {
        return Err(DecodeError::MissingFields { line: line_no });
    }

    let timestamp = if timestamp.is_empty() {
        None
    } else {
        Some(
            timestamp
                .parse::<i64>()
                .map_err(|_| DecodeError::InvalidTimestamp {
                    line: line_no,
                    value: timestamp.to_string(),
                })?,
        )
    };

    // Quotes are literal in the measurement and tag section.
    let head_parts = split_unescaped(head, b',', false).unwrap_or_default();
    let measurement = head_parts.first().map(|m| unescape(m)).unwrap_or_default();
    if measurement.is_empty() {
        return Err(DecodeError::MissingMeasurement { line: line_no });
    }

    let mut observation = Observation {
        measurement: measurement.into_owned(),
        host: String::new(),
        server_name: String::new(),
        path: String::new(),
        status_code: 0,
        response_time: 0.0,
        response_size: None,
        timestamp,
    };

    let mut saw_status = false;
    for tag in head_parts.iter().skip(1) {
        let Some((key, value)) = split_once_unescaped(tag, b'=') else {
            return Err(DecodeError::MalformedTag {
                line: line_no,
                tag: tag.to_string(),
            });
        };
        if key.is_empty() {
            return Err(DecodeError::MalformedTag {
                line: line_no,
                tag: tag.to_string(),
            });
        }
        let value = unescape(value);
        match unescape(key).as_ref() {
            TAG_HOST => observation.host = value.into_owned(),
            TAG_SERVER_NAME => observation.server_name = value.into_owned(),
            TAG_PATH => observation.path = value.into_owned(),
            TAG_STATUS_CODE => {
                saw_status = true;
                observation.status_code = parse_status_code(&value, line_no);
            }
            _ => {}
        }
    }
    if !saw_status {
        debug!(line = line_no, "point has no status_code tag; counting as 0");
    }

    let field_parts = split_unescaped(fields, b',', true)
        .map_err(|_| DecodeError::UnterminatedString { line: line_no })?;
    let mut saw_response_time = false;
    for field in field_parts {
        let Some((key, value)) = split_once_unescaped(field, b'=') else {
            return Err(DecodeError::MalformedField {
                line: line_no,
                field: field.to_string(),
            });
        };
        if key.is_empty() || value.is_empty() {
            return Err(DecodeError::MalformedField {
                line: line_no,
                field: field.to_string(),
            });
        }
        match unescape(key).as_ref() {
            FIELD_RESPONSE_TIME => {
                saw_response_time = true;
                observation.response_time = match parse_float_value(value) {
                    Some(v) => v,
                    None => {
                        warn!(
                            line = line_no,
                            value, "response_time is not numeric; counting as 0"
                        );
                        0.0
                    }
                };
            }
            FIELD_RESPONSE_SIZE => {
                observation.response_size = parse_unsigned_value(value);
                if observation.response_size.is_none() {
                    warn!(line = line_no, value, "response_size is not an unsigned integer; ignoring");
                }
            }
            _ => {}
        }
    }
    if !saw_response_time {
        debug!(line = line_no, "point has no response_time field; counting as 0");
    }

    Ok(observation)
}

fn parse_status_code(value: &str, line_no: usize) -> u16 {
    match value.trim().parse::<u16>() {
        Ok(code) => code,
        Err(e) => {
            warn!(
                line = line_no,
                value,
                error = %e,
                "status_code is not a valid status code; counting as 0"
            );
            0
        }
    }
}

/// Accepts float literals and integer literals with an optional `i`/`u` suffix.
fn parse_float_value(value: &str) -> Option<f64> {
    let trimmed = value.trim_end_matches(['i', 'u']);
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_unsigned_value(value: &str) -> Option<u64> {
    let trimmed = value.trim_end_matches(['i', 'u']);
    trimmed.parse::<u64>().ok().or_else(|| {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}
