//! Typed query parameter decoding.
//!
//! Handlers declare the parameters they accept as a list of [`ParamSpec`]s
//! and decode the raw query string in one call:
//!
//! ```ignore
//! const SPECS: &[ParamSpec] = &[
//!     ParamSpec::new("station", ParamKind::Str, ParamValue::Null),
//!     ParamSpec::new("start", ParamKind::Date, ParamValue::Null),
//!     ParamSpec::new("model", ParamKind::Bool, ParamValue::Bool(true)),
//! ];
//!
//! let args = decode(SPECS, &raw)?;
//! ```
//!
//! Absent parameters take their default verbatim. Present ones are coerced
//! according to their kind; a value that does not coerce is a client error.

use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};

/// How a raw string is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Str,
    /// `YYYY-MM-DD`
    Date,
    /// `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`
    DateTime,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Date => "date",
            Self::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Str(v) => serializer.serialize_str(v),
            Self::Date(v) => serializer.collect_str(&v.format("%Y-%m-%d")),
            Self::DateTime(v) => serializer.collect_str(&v.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Declaration of one accepted parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamValue,
}

impl ParamSpec {
    pub const fn new(name: &'static str, kind: ParamKind, default: ParamValue) -> Self {
        Self {
            name,
            kind,
            default,
        }
    }
}

/// Parameter decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// The raw value could not be coerced to the declared kind.
    #[error("invalid value for '{name}': expected {kind}, got '{raw}'")]
    Invalid {
        name: String,
        kind: ParamKind,
        raw: String,
    },
}

/// Raw query string pairs, in request order.
///
/// Use as `Query<RawParams>` in a handler.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RawParams(Vec<(String, String)>);

impl RawParams {
    /// First value given for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Decode every spec from `raw`, in order.
pub fn decode(
    specs: &[ParamSpec],
    raw: &RawParams,
) -> Result<HashMap<String, ParamValue>, ParamError> {
    let mut args = HashMap::with_capacity(specs.len());
    for spec in specs {
        let value = match raw.get(spec.name) {
            Some(text) => coerce(spec, text)?,
            None => spec.default.clone(),
        };
        args.insert(spec.name.to_string(), value);
    }
    Ok(args)
}

/// Coerce one present raw value.
fn coerce(spec: &ParamSpec, raw: &str) -> Result<ParamValue, ParamError> {
    let invalid = || ParamError::Invalid {
        name: spec.name.to_string(),
        kind: spec.kind,
        raw: raw.to_string(),
    };

    let value = match spec.kind {
        // "0" and "false" are checked before generic truthiness
        ParamKind::Bool if raw == "0" || raw == "false" => ParamValue::Bool(false),
        ParamKind::Bool => ParamValue::Bool(!raw.is_empty()),
        ParamKind::Int => ParamValue::Int(raw.trim().parse().map_err(|_| invalid())?),
        ParamKind::Float => ParamValue::Float(raw.trim().parse().map_err(|_| invalid())?),
        ParamKind::Str => ParamValue::Str(raw.to_string()),
        ParamKind::Date => ParamValue::Date(
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| invalid())?,
        ),
        ParamKind::DateTime => {
            let raw = raw.trim();
            let parsed = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
                .map_err(|_| invalid())?;
            ParamValue::DateTime(parsed)
        }
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawParams {
        pairs.iter().copied().collect()
    }

    fn bool_spec(default: bool) -> [ParamSpec; 1] {
        [ParamSpec::new("model", ParamKind::Bool, ParamValue::Bool(default))]
    }

    #[test]
    fn bool_false_literals() {
        for text in ["0", "false"] {
            let args = decode(&bool_spec(true), &raw(&[("model", text)])).unwrap();
            assert_eq!(args["model"], ParamValue::Bool(false), "raw {text:?}");
        }
    }

    #[test]
    fn bool_other_non_empty_is_true() {
        for text in ["1", "true", "False", "no", "yes", "00"] {
            let args = decode(&bool_spec(false), &raw(&[("model", text)])).unwrap();
            assert_eq!(args["model"], ParamValue::Bool(true), "raw {text:?}");
        }
    }

    #[test]
    fn bool_empty_is_false() {
        let args = decode(&bool_spec(true), &raw(&[("model", "")])).unwrap();
        assert_eq!(args["model"], ParamValue::Bool(false));
    }

    #[test]
    fn absent_uses_default_verbatim() {
        // The default is not coerced, even when its type differs from the kind.
        let specs = [
            ParamSpec::new("limit", ParamKind::Int, ParamValue::Str("all".into())),
            ParamSpec::new("start", ParamKind::Date, ParamValue::Null),
        ];
        let args = decode(&specs, &RawParams::default()).unwrap();
        assert_eq!(args["limit"], ParamValue::Str("all".into()));
        assert!(args["start"].is_null());
    }

    #[test]
    fn coerces_each_kind() {
        let specs = [
            ParamSpec::new("station", ParamKind::Str, ParamValue::Null),
            ParamSpec::new("alt", ParamKind::Int, ParamValue::Null),
            ParamSpec::new("lat", ParamKind::Float, ParamValue::Null),
            ParamSpec::new("start", ParamKind::Date, ParamValue::Null),
            ParamSpec::new("end", ParamKind::DateTime, ParamValue::Null),
        ];
        let args = decode(
            &specs,
            &raw(&[
                ("station", "10637"),
                ("alt", "112"),
                ("lat", "50.05"),
                ("start", "2024-01-01"),
                ("end", "2024-01-31T23:00:00"),
            ]),
        )
        .unwrap();

        assert_eq!(args["station"].as_str(), Some("10637"));
        assert_eq!(args["alt"].as_int(), Some(112));
        assert_eq!(args["lat"], ParamValue::Float(50.05));
        assert_eq!(
            args["start"],
            ParamValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(
            args["end"],
            ParamValue::DateTime(
                NaiveDate::from_ymd_opt(2024, 1, 31)
                    .unwrap()
                    .and_hms_opt(23, 0, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn coercion_failure_is_an_error() {
        let specs = [ParamSpec::new("alt", ParamKind::Int, ParamValue::Null)];
        let err = decode(&specs, &raw(&[("alt", "high")])).unwrap_err();
        assert_eq!(
            err,
            ParamError::Invalid {
                name: "alt".into(),
                kind: ParamKind::Int,
                raw: "high".into(),
            }
        );
        assert_eq!(
            err.to_string(),
            "invalid value for 'alt': expected int, got 'high'"
        );
    }

    #[test]
    fn invalid_date_is_an_error() {
        let specs = [ParamSpec::new("start", ParamKind::Date, ParamValue::Null)];
        assert!(decode(&specs, &raw(&[("start", "2024-13-01")])).is_err());
    }

    #[test]
    fn first_occurrence_wins() {
        let specs = [ParamSpec::new("station", ParamKind::Str, ParamValue::Null)];
        let args = decode(&specs, &raw(&[("station", "a"), ("station", "b")])).unwrap();
        assert_eq!(args["station"].as_str(), Some("a"));
    }

    #[test]
    fn unknown_params_are_ignored() {
        let specs = [ParamSpec::new("station", ParamKind::Str, ParamValue::Null)];
        let args = decode(&specs, &raw(&[("other", "x")])).unwrap();
        assert_eq!(args.len(), 1);
        assert!(args["station"].is_null());
    }

    #[test]
    fn values_serialize_to_json() {
        let date = ParamValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(serde_json::to_string(&date).unwrap(), "\"2024-02-29\"");
        assert_eq!(serde_json::to_string(&ParamValue::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&ParamValue::Int(7)).unwrap(), "7");
    }
}
