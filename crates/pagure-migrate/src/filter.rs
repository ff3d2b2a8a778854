//! Ticket state filtering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which tickets a run migrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    /// Only open tickets.
    #[default]
    Open,
    /// Only closed tickets.
    Closed,
    /// Every ticket.
    All,
}

impl StateFilter {
    /// Lower-case name, as used in the `status` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }

    /// Value for the listing `status` parameter.
    ///
    /// Pagure lists open tickets when the parameter is absent.
    pub fn query_status(self) -> Option<&'static str> {
        match self {
            Self::Open => None,
            Self::Closed | Self::All => Some(self.as_str()),
        }
    }

    /// Decide whether a ticket with the given status is in scope.
    ///
    /// Only the status is compared case-insensitively.
    pub fn includes(self, status: &str) -> bool {
        match self {
            Self::All => true,
            Self::Open | Self::Closed => status.to_lowercase() == self.as_str(),
        }
    }
}

impl fmt::Display for StateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "all" => Ok(Self::All),
            other => Err(format!("unknown ticket state filter: {other}")),
        }
    }
}
