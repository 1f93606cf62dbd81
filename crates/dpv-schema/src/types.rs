//! Field types, typed values, and coercion of raw text

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const ANY_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d.%m.%Y"];
const ANY_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];
const DEFAULT_TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];
const ANY_TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H:%M:%S%.f", "%I:%M %p", "%I:%M:%S %p"];

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Date,
    DateTime,
    Time,
    Any,
}

impl FieldType {
    /// Resolve a descriptor type name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "datetime" => Some(Self::DateTime),
            "time" => Some(Self::Time),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    /// Descriptor name of this type
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Any => "any",
        }
    }

    /// Coerce a non-empty raw value into a typed value.
    ///
    /// Returns `None` when the text is not a valid literal of this type.
    pub fn cast(self, raw: &str, options: &CastOptions<'_>) -> Option<Value> {
        match self {
            Self::String | Self::Any => Some(Value::String(raw.to_string())),
            Self::Integer => raw.parse::<i64>().ok().map(Value::Integer),
            Self::Number => cast_number(raw),
            Self::Boolean => options.booleans.parse(raw).map(Value::Boolean),
            Self::Date => cast_date(raw, options.format),
            Self::DateTime => cast_datetime(raw, options.format),
            Self::Time => cast_time(raw, options.format),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsing format for temporal fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TemporalFormat {
    /// ISO 8601 forms
    #[default]
    Default,
    /// Any of a fixed list of common forms
    Any,
    /// A strftime-style pattern
    Pattern(String),
}

impl TemporalFormat {
    /// Interpret a descriptor `format` value
    pub fn parse(format: Option<&str>) -> Self {
        match format {
            None | Some("default") => Self::Default,
            Some("any") => Self::Any,
            Some(pattern) => Self::Pattern(pattern.strip_prefix("fmt:").unwrap_or(pattern).to_string()),
        }
    }
}

/// Case-insensitive token sets accepted for boolean fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanTokens {
    pub true_values: Vec<String>,
    pub false_values: Vec<String>,
}

impl Default for BooleanTokens {
    fn default() -> Self {
        Self::new(["true", "1", "yes", "y", "t"], ["false", "0", "no", "n", "f"])
    }
}

impl BooleanTokens {
    /// Create a token set from explicit true and false values
    pub fn new<T, F>(true_values: T, false_values: F) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            true_values: true_values.into_iter().map(Into::into).collect(),
            false_values: false_values.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a token, ignoring ASCII case
    pub fn parse(&self, raw: &str) -> Option<bool> {
        if self.true_values.iter().any(|t| t.eq_ignore_ascii_case(raw)) {
            Some(true)
        } else if self.false_values.iter().any(|t| t.eq_ignore_ascii_case(raw)) {
            Some(false)
        } else {
            None
        }
    }
}

/// Per-field inputs to [`FieldType::cast`]
#[derive(Debug, Clone, Copy)]
pub struct CastOptions<'a> {
    pub format: &'a TemporalFormat,
    pub booleans: &'a BooleanTokens,
}

/// A coerced field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl Value {
    /// Order two values of compatible types; integers and numbers compare numerically.
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Number(b)) => (*a as f64).partial_cmp(b),
            (Self::Number(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Canonical text used when the value is part of a key tuple
    pub fn key_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
        }
    }
}

fn cast_number(raw: &str) -> Option<Value> {
    if !is_plain_number(raw) {
        return None;
    }
    raw.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(Value::Number)
}

/// Optional sign, then digits with at most one decimal point.
fn is_plain_number(raw: &str) -> bool {
    let body = raw.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(raw);

    let mut digits = 0;
    let mut points = 0;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => points += 1,
            _ => return false,
        }
    }
    digits > 0 && points <= 1
}

fn cast_date(raw: &str, format: &TemporalFormat) -> Option<Value> {
    let date = match format {
        TemporalFormat::Default => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        TemporalFormat::Any => ANY_DATE_FORMATS
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(raw, f).ok()),
        TemporalFormat::Pattern(pattern) => NaiveDate::parse_from_str(raw, pattern).ok(),
    };
    date.map(Value::Date)
}

fn cast_datetime(raw: &str, format: &TemporalFormat) -> Option<Value> {
    let rfc3339 = || DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc());
    let datetime = match format {
        TemporalFormat::Default => rfc3339()
            .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok()),
        TemporalFormat::Any => rfc3339().or_else(|| {
            ANY_DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        }),
        TemporalFormat::Pattern(pattern) => NaiveDateTime::parse_from_str(raw, pattern).ok(),
    };
    datetime.map(Value::DateTime)
}

fn cast_time(raw: &str, format: &TemporalFormat) -> Option<Value> {
    let parse_any = |formats: &[&str]| {
        formats
            .iter()
            .find_map(|f| NaiveTime::parse_from_str(raw, f).ok())
    };
    let time = match format {
        TemporalFormat::Default => parse_any(DEFAULT_TIME_FORMATS),
        TemporalFormat::Any => parse_any(ANY_TIME_FORMATS),
        TemporalFormat::Pattern(pattern) => NaiveTime::parse_from_str(raw, pattern).ok(),
    };
    time.map(Value::Time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast(field_type: FieldType, raw: &str) -> Option<Value> {
        let format = TemporalFormat::Default;
        let booleans = BooleanTokens::default();
        field_type.cast(
            raw,
            &CastOptions {
                format: &format,
                booleans: &booleans,
            },
        )
    }

    #[test]
    fn test_type_names_round_trip() {
        for name in ["string", "integer", "number", "boolean", "date", "datetime", "time", "any"] {
            let field_type = FieldType::from_name(name).unwrap();
            assert_eq!(field_type.name(), name);
        }
        assert!(FieldType::from_name("geopoint").is_none());
        assert!(FieldType::from_name("Integer").is_none());
    }

    #[test]
    fn test_integer_rejects_decimals_and_separators() {
        assert_eq!(cast(FieldType::Integer, "42"), Some(Value::Integer(42)));
        assert_eq!(cast(FieldType::Integer, "-7"), Some(Value::Integer(-7)));
        assert!(cast(FieldType::Integer, "1.0").is_none());
        assert!(cast(FieldType::Integer, "1,000").is_none());
        assert!(cast(FieldType::Integer, "abc").is_none());
        assert!(cast(FieldType::Integer, " 1").is_none());
    }

    #[test]
    fn test_number_accepts_sign_and_single_point() {
        assert_eq!(cast(FieldType::Number, "-1.5"), Some(Value::Number(-1.5)));
        assert_eq!(cast(FieldType::Number, "+.5"), Some(Value::Number(0.5)));
        assert_eq!(cast(FieldType::Number, "10"), Some(Value::Number(10.0)));
        assert!(cast(FieldType::Number, "1,000.5").is_none());
        assert!(cast(FieldType::Number, "1.2.3").is_none());
        assert!(cast(FieldType::Number, "--1").is_none());
        assert!(cast(FieldType::Number, "NaN").is_none());
        assert!(cast(FieldType::Number, "inf").is_none());
        assert!(cast(FieldType::Number, ".").is_none());
        assert!(cast(FieldType::Number, "1e").is_none());
    }

    #[test]
    fn test_number_rejects_exponent_notation() {
        assert!(cast(FieldType::Number, "1e5").is_none());
        assert!(cast(FieldType::Number, "2.5E-3").is_none());
        assert!(cast(FieldType::Number, "-1e+2").is_none());
        assert_eq!(cast(FieldType::Number, "100000"), Some(Value::Number(100_000.0)));
    }

    #[test]
    fn test_boolean_tokens_are_case_insensitive() {
        assert_eq!(cast(FieldType::Boolean, "TRUE"), Some(Value::Boolean(true)));
        assert_eq!(cast(FieldType::Boolean, "No"), Some(Value::Boolean(false)));
        assert_eq!(cast(FieldType::Boolean, "0"), Some(Value::Boolean(false)));
        assert!(cast(FieldType::Boolean, "maybe").is_none());

        let custom = BooleanTokens::new(["oui"], ["non"]);
        assert_eq!(custom.parse("OUI"), Some(true));
        assert_eq!(custom.parse("true"), None);
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(cast(FieldType::Date, "2024-03-01"), Some(Value::Date(expected)));
        assert!(cast(FieldType::Date, "01/03/2024").is_none());
        assert!(cast(FieldType::Date, "2024-02-30").is_none());

        let booleans = BooleanTokens::default();
        let any = TemporalFormat::Any;
        let options = CastOptions { format: &any, booleans: &booleans };
        assert_eq!(
            FieldType::Date.cast("01/03/2024", &options),
            Some(Value::Date(expected))
        );

        let pattern = TemporalFormat::parse(Some("fmt:%d.%m.%Y"));
        let options = CastOptions { format: &pattern, booleans: &booleans };
        assert_eq!(
            FieldType::Date.cast("01.03.2024", &options),
            Some(Value::Date(expected))
        );
    }

    #[test]
    fn test_time_accepts_minutes_and_seconds() {
        assert!(cast(FieldType::Time, "09:30").is_some());
        assert!(cast(FieldType::Time, "09:30:15").is_some());
        assert!(cast(FieldType::Time, "25:00").is_none());
    }

    #[test]
    fn test_datetime_default_forms() {
        assert!(cast(FieldType::DateTime, "2024-03-01T10:00:00Z").is_some());
        assert!(cast(FieldType::DateTime, "2024-03-01T10:00:00+02:00").is_some());
        assert!(cast(FieldType::DateTime, "2024-03-01T10:00:00").is_some());
        assert!(cast(FieldType::DateTime, "2024-03-01").is_none());
    }

    #[test]
    fn test_value_comparison_and_key_text() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Number(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::String("a".into()).compare(&Value::Integer(1)), None);
        assert_eq!(Value::Number(1.0).key_text(), "1");
        assert_eq!(Value::Integer(1).key_text(), "1");
        assert_eq!(Value::Boolean(true).key_text(), "true");
    }
}
