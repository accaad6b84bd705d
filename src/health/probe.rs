// ABOUTME: Endpoint probes evaluated against a captured HTTP response.
// ABOUTME: Probes are pure functions and know nothing about the application.

use serde::de::{self, Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// An HTTP response captured from the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// What an endpoint must return to count as healthy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Probe {
    /// Any 2xx status.
    #[default]
    HttpOk,
    /// Exactly this status.
    Status(u16),
    /// A JSON body whose (dotted) field equals the given string.
    JsonField { field: String, equals: String },
}

impl Probe {
    /// Evaluate the response; `Err` carries a human-readable reason.
    pub fn evaluate(&self, response: &ProbeResponse) -> Result<(), String> {
        match self {
            Probe::HttpOk => {
                if (200..300).contains(&response.status) {
                    Ok(())
                } else {
                    Err(format!("HTTP {}", response.status))
                }
            }
            Probe::Status(expected) => {
                if response.status == *expected {
                    Ok(())
                } else {
                    Err(format!("HTTP {} (expected {})", response.status, expected))
                }
            }
            Probe::JsonField { field, equals } => {
                let json: serde_json::Value = serde_json::from_str(&response.body)
                    .map_err(|e| format!("HTTP {}, body is not JSON: {}", response.status, e))?;

                let value = field
                    .split('.')
                    .try_fold(&json, |node, key| node.get(key))
                    .ok_or_else(|| format!("field `{}` missing from response", field))?;

                let actual = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };

                if actual == *equals {
                    Ok(())
                } else {
                    Err(format!("{} is \"{}\" (expected \"{}\")", field, actual, equals))
                }
            }
        }
    }
}

impl FromStr for Probe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http-ok" => Ok(Probe::HttpOk),
            s if s.starts_with("status:") => {
                let code_str = &s["status:".len()..];
                let code = code_str
                    .parse::<u16>()
                    .map_err(|_| format!("invalid status code: {}", code_str))?;
                Ok(Probe::Status(code))
            }
            s if s.starts_with("json:") => {
                let (field, equals) = s["json:".len()..]
                    .split_once('=')
                    .ok_or_else(|| format!("expected json:<field>=<value>, got {}", s))?;
                if field.is_empty() {
                    return Err(format!("empty field name in {}", s));
                }
                Ok(Probe::JsonField {
                    field: field.to_string(),
                    equals: equals.to_string(),
                })
            }
            _ => Err(format!("unknown probe: {}", s)),
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::HttpOk => write!(f, "http-ok"),
            Probe::Status(code) => write!(f, "status:{}", code),
            Probe::JsonField { field, equals } => write!(f, "json:{}={}", field, equals),
        }
    }
}

impl<'de> Deserialize<'de> for Probe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
