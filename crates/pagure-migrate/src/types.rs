//! Common types for migration operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{btree_set, BTreeMap, BTreeSet};
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::error::format_elapsed;

/// Ticket status on the source forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    /// Parse the status string reported by the source forge.
    ///
    /// Anything that is not `closed` (case-insensitively) counts as open.
    pub fn from_source(status: &str) -> Self {
        if status.eq_ignore_ascii_case("closed") {
            Self::Closed
        } else {
            Self::Open
        }
    }
}

/// Author attribution carried over as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Full display name.
    pub display_name: String,
    /// Link to the author's profile on the source side.
    pub profile_url: String,
    /// Login handle. Comments do not carry one.
    pub handle: Option<String>,
}

/// A ticket fetched from the source forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub author: Author,
    pub tags: Vec<String>,
    pub is_confidential: bool,
    /// Unix timestamp, seconds.
    pub created_at: i64,
    /// Raw status string as reported by the forge.
    pub status_text: String,
    pub status: TicketStatus,
    pub canonical_url: String,
}

impl TicketRecord {
    /// Whether the ticket is closed on the source forge.
    pub fn is_closed(&self) -> bool {
        self.status == TicketStatus::Closed
    }
}

/// A comment attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: u64,
    pub body: String,
    pub author: Author,
    /// Unix timestamp, seconds.
    pub created_at: i64,
}

/// Which tickets to migrate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketSelection {
    /// Every ticket matching the state filter, found by paging.
    #[default]
    All,
    /// An inclusive range of ticket ids.
    Range { start: u64, end: u64 },
    /// An explicit list of ticket ids.
    Select(Vec<u64>),
}

impl TicketSelection {
    /// Ticket ids to replay directly, or `None` when paging is required.
    ///
    /// Ids come back ascending and de-duplicated. Ranges are walked lazily.
    pub fn explicit_ids(&self) -> Option<SelectedIds> {
        match self {
            Self::All => None,
            Self::Range { start, end } => Some(SelectedIds::Range(*start..=*end)),
            Self::Select(ids) => {
                let set: BTreeSet<u64> = ids.iter().copied().collect();
                Some(SelectedIds::List(set.into_iter()))
            }
        }
    }
}

/// Ascending ticket ids of an explicit selection.
#[derive(Debug)]
pub enum SelectedIds {
    Range(RangeInclusive<u64>),
    List(btree_set::IntoIter<u64>),
}

impl SelectedIds {
    /// Ids left to yield. Saturates at `u64::MAX` for a range over every id.
    pub fn remaining(&self) -> u64 {
        match self {
            Self::Range(range) if range.is_empty() => 0,
            Self::Range(range) => (range.end() - range.start()).saturating_add(1),
            Self::List(ids) => ids.len() as u64,
        }
    }
}

impl Iterator for SelectedIds {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        match self {
            Self::Range(range) => range.next(),
            Self::List(ids) => ids.next(),
        }
    }
}

/// Unit of work a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePhase {
    Count,
    PageList,
    TicketFetch,
    IssueCreate,
    CommentCreate,
    StatusSync,
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "count",
            Self::PageList => "page-list",
            Self::TicketFetch => "ticket-fetch",
            Self::IssueCreate => "issue-create",
            Self::CommentCreate => "comment-create",
            Self::StatusSync => "status-sync",
        };
        f.write_str(name)
    }
}

/// A recorded failure, detailed enough to re-run only what failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Source ticket being processed, if any.
    pub ticket_id: Option<u64>,
    /// Source comment being replayed, if any.
    pub comment_id: Option<u64>,
    pub phase: FailurePhase,
    /// HTTP status, or `None` for transport and provider failures.
    pub status: Option<u16>,
    pub reason: String,
    /// Elapsed seconds, two decimals.
    pub elapsed: String,
    /// The destination accepted the write but its reply was unreadable.
    #[serde(default)]
    pub unconfirmed: bool,
}

/// A failure on a ticket whose destination issue exists, or may exist.
/// Re-running such a ticket would duplicate its issue, so it is fixed by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixUp {
    pub ticket_id: u64,
    /// Destination issue, unknown when its creation went unconfirmed.
    pub iid: Option<u64>,
    pub phase: FailurePhase,
    pub comment_id: Option<u64>,
}

/// Outcome of the status sync step for one ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSyncOutcome {
    /// The destination issue was closed.
    Closed,
    /// The source ticket was not closed; nothing was sent.
    Unchanged,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    #[default]
    Pending,
    Completed,
    Failed(String),
}

/// Report of a completed migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Tickets the counter expected.
    pub expected_tickets: u64,

    /// Issues created on the destination.
    pub tickets_transferred: u64,

    /// Comments created on the destination.
    pub comments_transferred: u64,

    /// Destination issues closed to mirror the source.
    pub tickets_closed: u64,

    /// Tickets whose status sync needed no call.
    pub status_unchanged: u64,

    /// Tickets excluded by the state filter.
    pub tickets_skipped: u64,

    /// Per-unit failures.
    pub failures: Vec<FailureRecord>,

    /// Source ticket id to destination issue iid.
    pub mapping: Vec<(u64, u64)>,

    pub outcome: RunOutcome,

    /// Start time of migration.
    pub started_at: Option<DateTime<Utc>>,

    /// End time of migration.
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Mark the migration as complete.
    pub fn complete(&mut self) {
        self.outcome = RunOutcome::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the migration as aborted.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.outcome = RunOutcome::Failed(reason.into());
        self.completed_at = Some(Utc::now());
    }

    /// Whether the run finished without any recorded failure.
    pub fn is_successful(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.failures.is_empty()
    }

    /// Record a failure.
    pub fn record_failure(
        &mut self,
        phase: FailurePhase,
        ticket_id: Option<u64>,
        comment_id: Option<u64>,
        error: &crate::error::RequestError,
        elapsed: Duration,
    ) {
        self.failures.push(FailureRecord {
            ticket_id,
            comment_id,
            phase,
            status: error.status_code(),
            reason: error.to_string(),
            elapsed: format_elapsed(elapsed),
            unconfirmed: error.is_unconfirmed(),
        });
    }

    /// Failed tickets that never reached the destination, safe to re-run
    /// with an explicit selection.
    pub fn retry_ticket_ids(&self) -> Vec<u64> {
        let migrated: BTreeSet<u64> = self.mapping.iter().map(|(ticket, _)| *ticket).collect();
        let ids: BTreeSet<u64> = self
            .failures
            .iter()
            .filter(|f| !f.unconfirmed)
            .filter_map(|f| f.ticket_id)
            .filter(|id| !migrated.contains(id))
            .collect();
        ids.into_iter().collect()
    }

    /// Failures to repair by hand on the destination, in report order.
    pub fn fix_ups(&self) -> Vec<FixUp> {
        let migrated: BTreeMap<u64, u64> = self.mapping.iter().copied().collect();
        self.failures
            .iter()
            .filter_map(|f| {
                let ticket_id = f.ticket_id?;
                let iid = migrated.get(&ticket_id).copied();
                (iid.is_some() || f.unconfirmed).then_some(FixUp {
                    ticket_id,
                    iid,
                    phase: f.phase,
                    comment_id: f.comment_id,
                })
            })
            .collect()
    }

    /// Get the duration of the migration.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
