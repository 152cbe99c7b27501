//! Tool-specific argument repair applied before dispatch.
//!
//! Rules are keyed on the tool name. A rule either rewrites the arguments in
//! full or leaves them untouched; a failing rule is logged and skipped, never
//! fatal to the call.

use std::sync::LazyLock;

use chrono::{NaiveDateTime, TimeDelta};
use regex::Regex;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("unrecognized timestamp for {field}: {value}")]
    UnparsableTimestamp { field: String, value: String },
}

pub trait NormalizationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, tool_name: &str) -> bool;

    /// Returns `Ok(true)` when `args` was changed. On `Err`, `args` must be
    /// exactly as it was passed in.
    fn apply(&self, args: &mut Map<String, Value>) -> Result<bool, NormalizeError>;
}

/// Ordered set of normalization rules.
pub struct ParameterNormalizer {
    rules: Vec<Box<dyn NormalizationRule>>,
}

impl Default for ParameterNormalizer {
    fn default() -> Self {
        Self {
            rules: vec![Box::new(EventEndTimeRule)],
        }
    }
}

impl std::fmt::Debug for ParameterNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

impl ParameterNormalizer {
    /// A normalizer with no rules.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: Box<dyn NormalizationRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn normalize(&self, tool_name: &str, args: &mut Map<String, Value>) {
        for rule in self.rules.iter().filter(|rule| rule.applies_to(tool_name)) {
            match rule.apply(args) {
                Ok(true) => tracing::debug!(tool = %tool_name, rule = rule.name(), "Normalized arguments"),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(tool = %tool_name, rule = rule.name(), "Normalization skipped: {e}");
                }
            }
        }
    }
}

/// Fills in a missing end time one hour after the start time for
/// event-creation tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEndTimeRule;

const EVENT_CREATION_MARKER: &str = "CreateEvent";

const FLAT_FIELD_PAIRS: [(&str, &str); 4] = [
    ("start_datetime", "end_datetime"),
    ("start_time", "end_time"),
    ("startDateTime", "endDateTime"),
    ("startTime", "endTime"),
];

/// Tried in order; first match wins.
const TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
];

static ZONE_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(Z|[+-]\d{2}:?\d{2})$").ok());

enum StartShape<'a> {
    /// `{"start": {"dateTime": ..., "timeZone"?: ...}}`
    Nested {
        date_time: &'a str,
        time_zone: Option<&'a Value>,
    },
    Flat {
        end_field: &'static str,
        value: &'a str,
        start_field: &'static str,
    },
}

fn find_start(args: &Map<String, Value>) -> Option<StartShape<'_>> {
    if !args.contains_key("end")
        && let Some(start) = args.get("start").and_then(Value::as_object)
        && let Some(date_time) = start.get("dateTime").and_then(Value::as_str)
    {
        return Some(StartShape::Nested {
            date_time,
            time_zone: start.get("timeZone"),
        });
    }

    FLAT_FIELD_PAIRS
        .iter()
        .find(|(start, end)| args.contains_key(*start) && !args.contains_key(*end))
        .and_then(|&(start_field, end_field)| {
            let value = args.get(start_field)?.as_str()?;
            Some(StartShape::Flat {
                end_field,
                value,
                start_field,
            })
        })
}

/// Split a trailing `Z` or `+HH:MM` / `-HHMM` offset off a timestamp.
fn split_zone(raw: &str) -> (&str, &str) {
    let Some(re) = ZONE_SUFFIX.as_ref() else {
        return (raw, "");
    };
    match re.find(raw) {
        Some(m) => (&raw[..m.start()], m.as_str()),
        None => (raw, ""),
    }
}

/// One hour after `raw`, keeping its zone suffix and date/time separator.
fn end_time_for(raw: &str) -> Option<String> {
    let (local, zone) = split_zone(raw.trim());
    let start = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(local, fmt).ok())?;
    let end = start.checked_add_signed(TimeDelta::hours(1))?;

    let formatted = if !zone.is_empty() || local.contains('T') {
        end.format("%Y-%m-%dT%H:%M:%S")
    } else {
        end.format("%Y-%m-%d %H:%M:%S")
    };
    Some(format!("{formatted}{zone}"))
}

impl NormalizationRule for EventEndTimeRule {
    fn name(&self) -> &'static str {
        "event_end_time"
    }

    fn applies_to(&self, tool_name: &str) -> bool {
        tool_name.contains(EVENT_CREATION_MARKER)
    }

    fn apply(&self, args: &mut Map<String, Value>) -> Result<bool, NormalizeError> {
        let Some(shape) = find_start(args) else {
            return Ok(false);
        };

        let (end_field, end_value, logged) = match shape {
            StartShape::Nested {
                date_time,
                time_zone,
            } => {
                let end = end_time_for(date_time).ok_or_else(|| {
                    NormalizeError::UnparsableTimestamp {
                        field: "start.dateTime".to_string(),
                        value: date_time.to_string(),
                    }
                })?;
                let mut nested = Map::new();
                nested.insert("dateTime".to_string(), Value::String(end.clone()));
                if let Some(zone) = time_zone {
                    nested.insert("timeZone".to_string(), zone.clone());
                }
                ("end", Value::Object(nested), end)
            }
            StartShape::Flat {
                end_field,
                value,
                start_field,
            } => {
                let end =
                    end_time_for(value).ok_or_else(|| NormalizeError::UnparsableTimestamp {
                        field: start_field.to_string(),
                        value: value.to_string(),
                    })?;
                (end_field, Value::String(end.clone()), end)
            }
        };

        tracing::info!(field = end_field, end = %logged, "Auto-set event end time");
        args.insert(end_field.to_string(), end_value);
        Ok(true)
    }
}
