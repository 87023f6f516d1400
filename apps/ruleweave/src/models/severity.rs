//! Severity levels for diagnostics and for rule configuration.
//!
//! Rule files accept human tokens (`error`, `warn`, `info`, `hint`, `off`)
//! or the numeric levels `-1..=3`, where `-1` means off.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Diagnostic severity, most severe first.
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Severity {
    /// Parse a threshold token such as `error` or `warn`.
    pub fn parse_threshold(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warning),
            "info" | "information" => Some(Self::Information),
            "hint" => Some(Self::Hint),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Information => write!(f, "information"),
            Self::Hint => write!(f, "hint"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "String")]
/// Severity as configured on a rule. `Off` disables the rule outright.
pub enum RuleSeverity {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Hint,
}

impl RuleSeverity {
    /// Normalize a severity token from a rule file.
    pub fn from_token(value: &Json) -> Option<Self> {
        match value {
            Json::String(s) => match s.as_str() {
                "off" => Some(Self::Off),
                "error" => Some(Self::Error),
                "warn" => Some(Self::Warn),
                "info" => Some(Self::Info),
                "hint" => Some(Self::Hint),
                other => other.parse::<i64>().ok().and_then(Self::from_level),
            },
            Json::Number(n) => n.as_i64().and_then(Self::from_level),
            _ => None,
        }
    }

    fn from_level(level: i64) -> Option<Self> {
        match level {
            -1 => Some(Self::Off),
            0 => Some(Self::Error),
            1 => Some(Self::Warn),
            2 => Some(Self::Info),
            3 => Some(Self::Hint),
            _ => None,
        }
    }

    /// Severity carried by diagnostics of this rule, `None` when off.
    pub const fn diagnostic(self) -> Option<Severity> {
        match self {
            Self::Off => None,
            Self::Error => Some(Severity::Error),
            Self::Warn => Some(Severity::Warning),
            Self::Info => Some(Severity::Information),
            Self::Hint => Some(Severity::Hint),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Hint => "hint",
        }
    }
}

impl<'de> Deserialize<'de> for RuleSeverity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Json::deserialize(deserializer)?;
        Self::from_token(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown severity: {value}")))
    }
}

impl From<RuleSeverity> for String {
    fn from(value: RuleSeverity) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
