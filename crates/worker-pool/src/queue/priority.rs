//! Priority levels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A closed, totally ordered set of priority levels
///
/// `levels()` lists every value once, highest precedence first. The pool
/// builds its queue lanes from this list.
pub trait PriorityLevel: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// All levels in dispatch order
    fn levels() -> Vec<Self>;
}

/// Default three-level priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl PriorityLevel for Priority {
    fn levels() -> Vec<Self> {
        Self::ALL.to_vec()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a [`Priority`] from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority: {0} (expected high|medium|low)")]
pub struct ParsePriorityError(String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}
