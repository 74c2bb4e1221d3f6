//! Time spans with a unit suffix, as the platform spells them (`500ms`, `120s`, `5m`, `1h`).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Unit suffix of a [`ChaosDuration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Millis,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Millis => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
        }
    }

    fn millis(self) -> u64 {
        match self {
            Self::Millis => 1,
            Self::Seconds => 1_000,
            Self::Minutes => 60_000,
            Self::Hours => 3_600_000,
        }
    }
}

/// A non-negative duration that keeps its textual form.
///
/// `120s` stays `120s` when rendered; it is not rewritten to `2m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChaosDuration {
    amount: u64,
    unit: TimeUnit,
}

impl ChaosDuration {
    pub fn new(amount: u64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Convert to a std duration. Saturates instead of overflowing.
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.amount.saturating_mul(self.unit.millis()))
    }
}

impl fmt::Display for ChaosDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl Serialize for ChaosDuration {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Why a duration string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DurationParseError(String);

impl FromStr for ChaosDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, suffix) = s.split_at(digits_end);
        if digits.is_empty() {
            return Err(DurationParseError(format!(
                "expected <number><unit> (e.g. '500ms', '60s', '5m', '1h'), got '{s}'"
            )));
        }
        let unit = match suffix {
            "ms" => TimeUnit::Millis,
            "s" => TimeUnit::Seconds,
            "m" => TimeUnit::Minutes,
            "h" => TimeUnit::Hours,
            "" => {
                return Err(DurationParseError(format!(
                    "missing unit in '{s}' (use ms, s, m or h)"
                )));
            }
            other => {
                return Err(DurationParseError(format!(
                    "unknown unit '{other}' in '{s}' (use ms, s, m or h)"
                )));
            }
        };
        let amount = digits
            .parse::<u64>()
            .map_err(|_| DurationParseError(format!("number out of range in '{s}'")))?;
        Ok(Self { amount, unit })
    }
}

/// A duration that may be negative, used for clock offsets (`-10m`, `+5s`, `30s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignedDuration {
    negative: bool,
    magnitude: ChaosDuration,
}

impl SignedDuration {
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn magnitude(&self) -> ChaosDuration {
        self.magnitude
    }
}

impl fmt::Display for SignedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        self.magnitude.fmt(f)
    }
}

impl Serialize for SignedDuration {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl FromStr for SignedDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, rest) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let magnitude = rest.parse()?;
        Ok(Self {
            negative,
            magnitude,
        })
    }
}
