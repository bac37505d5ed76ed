use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery semantics of a tracked query.
///
/// Serialized as `ONETIME` / `SCHEDULE`; decoding goes through
/// [`QueryKind::from_str_opt`] and so accepts any case and `ONE_TIME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueryKind {
    /// Executed exactly once, never re-scheduled.
    #[serde(rename = "ONETIME")]
    OneTime,
    /// Re-executed periodically until unsubscribed.
    #[serde(rename = "SCHEDULE")]
    Schedule,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::OneTime => "ONETIME",
            QueryKind::Schedule => "SCHEDULE",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ONETIME" | "ONE_TIME" => Some(QueryKind::OneTime),
            "SCHEDULE" => Some(QueryKind::Schedule),
            _ => None,
        }
    }

    pub fn is_schedule(&self) -> bool {
        matches!(self, QueryKind::Schedule)
    }
}

impl FromStr for QueryKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryKind::from_str_opt(s).ok_or_else(|| format!("Invalid QueryKind: {}", s))
    }
}

impl<'de> Deserialize<'de> for QueryKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
