// Composite aggregation key: measurement, host, server name, path.
//
// Text form joins the components with ',' and backslash-escapes '\' and ',' inside
// a component, so "requests,h1,s1,/ping" stays readable while values containing
// commas still round-trip through Key::parse.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::line_protocol::{split_unescaped, unescape};

const COMPONENTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    measurement: String,
    host: String,
    server_name: String,
    path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("key {raw:?} has {found} components, expected 4")]
pub struct KeyParseError {
    pub raw: String,
    pub found: usize,
}

impl Key {
    pub fn new(
        measurement: impl Into<String>,
        host: impl Into<String>,
        server_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            host: host.into(),
            server_name: server_name.into(),
            path: path.into(),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parses the text form produced by `Display`.
    pub fn parse(raw: &str) -> Result<Self, KeyParseError> {
        let parts = split_unescaped(raw, b',', false).unwrap_or_default();
        if parts.len() != COMPONENTS {
            return Err(KeyParseError {
                raw: raw.to_string(),
                found: parts.len(),
            });
        }
        Ok(Self::new(
            unescape(parts[0]),
            unescape(parts[1]),
            unescape(parts[2]),
            unescape(parts[3]),
        ))
    }
}

fn write_component(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    for c in s.chars() {
        if c == '\\' || c == ',' {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_component(f, &self.measurement)?;
        f.write_str(",")?;
        write_component(f, &self.host)?;
        f.write_str(",")?;
        write_component(f, &self.server_name)?;
        f.write_str(",")?;
        write_component(f, &self.path)
    }
}

impl FromStr for Key {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
