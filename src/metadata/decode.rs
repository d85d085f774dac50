//! Per-tag decoding of loosely typed extractor values.
//!
//! Every decoder matches exhaustively on [`FieldValue`] and returns either a
//! typed value (`Ok(Some(_))`), nothing because the tag was absent
//! (`Ok(None)`), or an [`Unparseable`] warning. Nothing is coerced silently.

use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use super::raw::FieldValue;

/// A tag was present but its value could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unparseable(pub String);

impl fmt::Display for Unparseable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type Decoded<T> = Result<Option<T>, Unparseable>;

fn unexpected_type(field: &str, value: &FieldValue) -> Unparseable {
    Unparseable(format!(
        "Unexpected {field} type: {} ({value})",
        value.kind()
    ))
}

/// Free-form text. Numbers are accepted and printed; blank strings are absent.
pub fn text(field: &str, value: Option<&FieldValue>) -> Decoded<String> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        FieldValue::Text(s) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        FieldValue::Int(i) => Ok(Some(i.to_string())),
        FieldValue::Float(x) => Ok(Some(x.to_string())),
        FieldValue::Bool(_) | FieldValue::List(_) | FieldValue::Other(_) => {
            Err(unexpected_type(field, value))
        }
    }
}

/// A plain number; numeric strings are parsed.
pub fn number(field: &str, value: Option<&FieldValue>) -> Decoded<f32> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        FieldValue::Int(i) => Ok(Some(*i as f32)),
        FieldValue::Float(x) => Ok(Some(*x as f32)),
        FieldValue::Text(s) => s
            .trim()
            .parse::<f32>()
            .map(Some)
            .map_err(|_| Unparseable(format!("Failed converting {field} ({s:?}) to a number"))),
        FieldValue::Bool(_) | FieldValue::List(_) | FieldValue::Other(_) => {
            Err(unexpected_type(field, value))
        }
    }
}

/// A pixel dimension.
pub fn dimension(field: &str, value: Option<&FieldValue>) -> Decoded<u32> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        FieldValue::Int(i) => u32::try_from(*i)
            .map(Some)
            .map_err(|_| Unparseable(format!("{field} out of range ({i})"))),
        FieldValue::Float(x) if *x >= 0.0 && *x <= u32::MAX as f64 => Ok(Some(*x as u32)),
        FieldValue::Float(x) => Err(Unparseable(format!("{field} out of range ({x})"))),
        FieldValue::Text(s) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| Unparseable(format!("Failed converting {field} ({s:?}) to an integer"))),
        FieldValue::Bool(_) | FieldValue::List(_) | FieldValue::Other(_) => {
            Err(unexpected_type(field, value))
        }
    }
}

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new("[0-9]+").unwrap());

/// ISO speed: an integer, a float (truncated) or the first digit run of a string.
pub fn iso(value: Option<&FieldValue>) -> Decoded<i64> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        FieldValue::Int(i) => Ok(Some(*i)),
        FieldValue::Float(x) => Ok(Some(x.trunc() as i64)),
        FieldValue::Text(s) => DIGITS
            .find(s)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .map(Some)
            .ok_or_else(|| Unparseable(format!("ISO string ({s:?}) failed to convert to an int"))),
        FieldValue::Bool(_) | FieldValue::List(_) | FieldValue::Other(_) => {
            Err(unexpected_type("ISO", value))
        }
    }
}

/// Exposure time as originally written plus its value in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureTime {
    pub display: String,
    pub seconds: Option<f32>,
}

/// Exposure time from a number or an `"n/m"` / `"n"` string.
///
/// An unconvertible string keeps its display form and reports a warning; the
/// caller stores the display string either way.
pub fn exposure_time(value: Option<&FieldValue>) -> (Option<ExposureTime>, Option<Unparseable>) {
    let Some(value) = value else {
        return (None, None);
    };
    let display = match value {
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Float(x) => x.to_string(),
        FieldValue::Text(s) => s.trim().to_string(),
        FieldValue::Bool(_) | FieldValue::List(_) | FieldValue::Other(_) => {
            return (None, Some(unexpected_type("ExposureTime", value)));
        }
    };

    let seconds = exposure_seconds(&display);
    let warning = seconds.is_none().then(|| {
        Unparseable(format!(
            "Unable to convert ExposureTime to decimal: {display}"
        ))
    });
    (Some(ExposureTime { display, seconds }), warning)
}

fn exposure_seconds(s: &str) -> Option<f32> {
    match s.split_once('/') {
        None => s.trim().parse::<f64>().ok().map(|v| v as f32),
        Some((n, m)) => {
            let numerator = n.trim().parse::<f64>().ok()?;
            let denominator = m.trim().parse::<f64>().ok()?;
            (denominator != 0.0).then(|| (numerator / denominator) as f32)
        }
    }
}

/// Focal length, expected as `"<number> mm"`.
pub fn focal_length_mm(value: Option<&FieldValue>) -> Decoded<f32> {
    let Some(raw) = text("FocalLength", value)? else {
        return Ok(None);
    };
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    match tokens.as_slice() {
        [amount, "mm"] => amount.parse::<f32>().map(Some).map_err(|_| {
            Unparseable(format!(
                "Failed converting FocalLength ({raw}) to a float ({amount})"
            ))
        }),
        _ => Err(Unparseable(format!(
            "Unexpected format for FocalLength ({raw})"
        ))),
    }
}

/// Video duration as `H:MM:SS` or `"<number> s"`, in seconds.
pub fn duration_seconds(value: Option<&FieldValue>) -> Decoded<f32> {
    let Some(value) = value else {
        return Ok(None);
    };
    let raw = match value {
        FieldValue::Int(i) => return Ok(Some(*i as f32)),
        FieldValue::Float(x) => return Ok(Some(*x as f32)),
        FieldValue::Text(s) => s.trim(),
        FieldValue::Bool(_) | FieldValue::List(_) | FieldValue::Other(_) => {
            return Err(unexpected_type("Duration", value));
        }
    };
    if raw.is_empty() {
        return Ok(None);
    }

    let parsed = match raw.split(':').collect::<Vec<_>>().as_slice() {
        [h, m, s] => (|| {
            let hours = h.parse::<u32>().ok()?;
            let minutes = m.parse::<u32>().ok()?;
            let seconds = s.parse::<f32>().ok()?;
            Some((hours * 3600 + minutes * 60) as f32 + seconds)
        })(),
        _ => raw
            .split_whitespace()
            .next()
            .and_then(|n| n.parse::<f32>().ok()),
    };
    parsed
        .map(Some)
        .ok_or_else(|| Unparseable(format!("Unable to parse Duration ({raw})")))
}

/// Add the keywords held by one source to `into`.
///
/// A source may be absent, a scalar, or an array of scalars. Anything else is
/// reported; scalar array members are still kept.
pub fn collect_keywords(
    field: &str,
    value: Option<&FieldValue>,
    into: &mut BTreeSet<String>,
) -> Option<Unparseable> {
    let value = value?;
    match value {
        FieldValue::Text(_) | FieldValue::Int(_) | FieldValue::Float(_) => {
            if let Ok(Some(keyword)) = text(field, Some(value)) {
                into.insert(keyword);
            }
            None
        }
        FieldValue::List(items) => {
            let mut rejected = Vec::new();
            for item in items {
                match text(field, Some(item)) {
                    Ok(Some(keyword)) => {
                        into.insert(keyword);
                    }
                    Ok(None) => {}
                    Err(_) => rejected.push(item.to_string()),
                }
            }
            (!rejected.is_empty()).then(|| {
                Unparseable(format!(
                    "Unexpected {field} entries: {}",
                    rejected.join(", ")
                ))
            })
        }
        FieldValue::Bool(_) | FieldValue::Other(_) => Some(unexpected_type(field, value)),
    }
}
