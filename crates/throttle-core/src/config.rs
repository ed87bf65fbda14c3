//! Queue configuration.
//!
//! The only knob is the concurrency limit. It is fixed at construction time.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum number of tasks allowed in the `Active` state at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "ConcurrencyRepr", into = "ConcurrencyRepr")]
pub enum Concurrency {
    #[default]
    Unlimited,
    Limited(NonZeroUsize),
}

impl Concurrency {
    pub fn limited(limit: usize) -> Result<Self, ConfigError> {
        NonZeroUsize::new(limit)
            .map(Concurrency::Limited)
            .ok_or_else(|| ConfigError::InvalidConcurrency(limit.to_string()))
    }

    /// Is there room for one more active task?
    pub fn admits(self, active: usize) -> bool {
        match self {
            Concurrency::Unlimited => true,
            Concurrency::Limited(limit) => active < limit.get(),
        }
    }

    pub fn get(self) -> Option<usize> {
        match self {
            Concurrency::Unlimited => None,
            Concurrency::Limited(limit) => Some(limit.get()),
        }
    }
}

impl TryFrom<f64> for Concurrency {
    type Error = ConfigError;

    /// `active < 2.5` holds for three tasks, so fractional limits round up.
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value.is_nan() || value < 1.0 {
            return Err(ConfigError::InvalidConcurrency(value.to_string()));
        }
        if value.is_infinite() || value >= usize::MAX as f64 {
            return Ok(Concurrency::Unlimited);
        }
        Concurrency::limited(value.ceil() as usize)
    }
}

impl FromStr for Concurrency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "unlimited" | "inf" | "infinity" => Ok(Concurrency::Unlimited),
            _ => {
                let value: f64 = s
                    .parse()
                    .map_err(|_| ConfigError::InvalidConcurrency(s.to_string()))?;
                Concurrency::try_from(value)
            }
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Unlimited => f.write_str("unlimited"),
            Concurrency::Limited(limit) => write!(f, "{limit}"),
        }
    }
}

/// Wire shape: a number, or one of the strings accepted by `FromStr`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ConcurrencyRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<ConcurrencyRepr> for Concurrency {
    type Error = ConfigError;

    fn try_from(repr: ConcurrencyRepr) -> Result<Self, Self::Error> {
        match repr {
            ConcurrencyRepr::Number(n) => Concurrency::try_from(n),
            ConcurrencyRepr::Text(s) => s.parse(),
        }
    }
}

impl From<Concurrency> for ConcurrencyRepr {
    fn from(c: Concurrency) -> Self {
        match c {
            Concurrency::Unlimited => ConcurrencyRepr::Text("unlimited".to_string()),
            Concurrency::Limited(limit) => ConcurrencyRepr::Number(limit.get() as f64),
        }
    }
}

/// Construction-time settings for a [`TaskQueue`](crate::TaskQueue).
///
/// An absent `concurrency` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<Concurrency>,
}

impl QueueConfig {
    pub fn unlimited() -> Self {
        Self { concurrency: None }
    }

    pub fn with_limit(limit: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            concurrency: Some(Concurrency::limited(limit)?),
        })
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency.unwrap_or_default()
    }
}
