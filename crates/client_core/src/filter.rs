use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use shared::domain::{Server, ServerStatus};

use crate::cache::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusFilter {
    #[default]
    All,
    Up,
    Down,
}

impl StatusFilter {
    pub fn status(self) -> Option<ServerStatus> {
        match self {
            Self::All => None,
            Self::Up => Some(ServerStatus::Up),
            Self::Down => Some(ServerStatus::Down),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "UP" | "SERVER_UP" => Ok(Self::Up),
            "DOWN" | "SERVER_DOWN" => Ok(Self::Down),
            other => Err(format!("unknown status filter '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredView {
    pub servers: Vec<Server>,
    pub message: String,
}

/// Derives the visible subset of `snapshot` for `selector`. Never mutates the
/// snapshot and never fails.
pub fn evaluate(selector: StatusFilter, snapshot: &Snapshot) -> FilteredView {
    let Some(status) = selector.status() else {
        return FilteredView {
            servers: snapshot.servers.clone(),
            message: format!("Servers filtered by {selector} status"),
        };
    };

    let servers: Vec<Server> = snapshot
        .servers
        .iter()
        .filter(|s| s.status == status)
        .cloned()
        .collect();
    let message = if servers.is_empty() {
        format!("No server of {selector} found")
    } else {
        format!("Server filtered by {selector} status")
    };
    FilteredView { servers, message }
}

impl FilteredView {
    /// The view as a snapshot, keeping the source timestamp.
    pub fn into_snapshot(self, source: &Snapshot) -> Snapshot {
        Snapshot {
            servers: self.servers,
            message: self.message,
            timestamp: source.timestamp,
        }
    }
}
