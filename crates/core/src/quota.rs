//! Disk quota limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configured storage ceiling: an absolute size (`"10GB"`) or a share of the
/// volume capacity (`"90%"`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QuotaLimit {
    /// Absolute limit in bytes.
    Absolute(u64),
    /// Percentage of the volume capacity, in `(0, 100]`.
    Percentage(f64),
}

impl QuotaLimit {
    /// Resolve the limit to bytes. Percentages need the volume capacity.
    pub fn resolve(&self, capacity: Option<u64>) -> crate::Result<u64> {
        match *self {
            Self::Absolute(bytes) => Ok(bytes),
            Self::Percentage(percent) => {
                let capacity = capacity.ok_or_else(|| {
                    crate::Error::InvalidQuota(
                        "percentage quota requires a backend with a known capacity".to_string(),
                    )
                })?;
                Ok((capacity as f64 * percent / 100.0) as u64)
            }
        }
    }
}

impl Default for QuotaLimit {
    fn default() -> Self {
        Self::Percentage(90.0)
    }
}

impl FromStr for QuotaLimit {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.is_empty() {
            return Err(crate::Error::InvalidQuota("empty quota".to_string()));
        }

        if let Some(percent) = value.strip_suffix('%') {
            let percent: f64 = percent
                .trim()
                .parse()
                .map_err(|_| crate::Error::InvalidQuota(format!("invalid percentage: {s}")))?;
            if !(percent > 0.0 && percent <= 100.0) {
                return Err(crate::Error::InvalidQuota(format!(
                    "percentage must be in (0, 100]: {s}"
                )));
            }
            return Ok(Self::Percentage(percent));
        }

        let upper = value.to_ascii_uppercase();
        let split = upper
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(upper.len());
        let (digits, unit) = upper.split_at(split);
        let amount: u64 = digits
            .parse()
            .map_err(|_| crate::Error::InvalidQuota(format!("invalid size: {s}")))?;
        let multiplier: u64 = match unit.trim() {
            "" | "B" => 1,
            "KB" | "K" => 1 << 10,
            "MB" | "M" => 1 << 20,
            "GB" | "G" => 1 << 30,
            "TB" | "T" => 1 << 40,
            other => {
                return Err(crate::Error::InvalidQuota(format!(
                    "unknown size unit '{other}' in {s}"
                )));
            }
        };
        amount
            .checked_mul(multiplier)
            .map(Self::Absolute)
            .ok_or_else(|| crate::Error::InvalidQuota(format!("size overflows: {s}")))
    }
}

impl TryFrom<String> for QuotaLimit {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QuotaLimit> for String {
    fn from(limit: QuotaLimit) -> Self {
        limit.to_string()
    }
}

impl fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(bytes) => write!(f, "{bytes}B"),
            Self::Percentage(percent) => write!(f, "{percent}%"),
        }
    }
}
