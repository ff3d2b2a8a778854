//! Progress of a replay run, observable from another task.
//!
//! The orchestrator is the only writer. Readers either poll [`snapshot`]
//! or register a callback that receives every change.
//!
//! [`snapshot`]: MigrationProgress::snapshot

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Receives every progress change.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Point-in-time view of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub phase: MigrationPhase,
    /// Tickets finished, successfully or not.
    pub completed: u64,
    /// Tickets expected in this run.
    pub total: u64,
    /// Failures recorded so far.
    pub failures: u64,
    /// Listing page being replayed, when paging.
    pub page: Option<u64>,
    /// Ticket that caused this update, if any.
    pub ticket_id: Option<u64>,
}

/// Coarse stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MigrationPhase {
    Initializing = 0,
    Counting = 1,
    MigratingTickets = 2,
    Complete = 3,
    Failed = 4,
}

impl MigrationPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Initializing,
            1 => Self::Counting,
            2 => Self::MigratingTickets,
            3 => Self::Complete,
            _ => Self::Failed,
        }
    }

    /// Whether the run is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initializing => "Initializing",
            Self::Counting => "Counting tickets",
            Self::MigratingTickets => "Migrating tickets",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        })
    }
}

/// Page number stored as `u64`, with zero meaning "not paging".
const NO_PAGE: u64 = 0;

/// Shared progress counters of one run.
pub struct MigrationProgress {
    phase: AtomicU8,
    completed: AtomicU64,
    total: AtomicU64,
    failures: AtomicU64,
    page: AtomicU64,
    callback: Option<ProgressCallback>,
}

impl MigrationProgress {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(MigrationPhase::Initializing as u8),
            completed: AtomicU64::new(0),
            total: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            page: AtomicU64::new(NO_PAGE),
            callback: None,
        }
    }

    /// Tracker that reports every change to `callback`.
    pub fn with_callback(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            ..Self::new()
        }
    }

    /// Enter a working phase with `total` expected tickets.
    pub fn start(&self, phase: MigrationPhase, total: u64) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.page.store(NO_PAGE, Ordering::SeqCst);
        self.notify(None);
    }

    /// Enter a terminal phase. Counters keep their final values.
    pub fn finish(&self, phase: MigrationPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        self.notify(None);
    }

    /// The orchestrator moved on to listing page `page`.
    pub fn page(&self, page: u64) {
        self.page.store(page, Ordering::SeqCst);
        self.notify(None);
    }

    /// A step of `ticket_id` failed.
    pub fn failure(&self, ticket_id: Option<u64>) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        self.notify(ticket_id);
    }

    /// `ticket_id` is done with.
    pub fn ticket_done(&self, ticket_id: u64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.notify(Some(ticket_id));
    }

    pub fn current_phase(&self) -> MigrationPhase {
        MigrationPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Current counters.
    pub fn snapshot(&self) -> ProgressUpdate {
        let page = self.page.load(Ordering::SeqCst);
        ProgressUpdate {
            phase: self.current_phase(),
            completed: self.completed.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            page: (page != NO_PAGE).then_some(page),
            ticket_id: None,
        }
    }

    fn notify(&self, ticket_id: Option<u64>) {
        if let Some(callback) = &self.callback {
            callback(ProgressUpdate {
                ticket_id,
                ..self.snapshot()
            });
        }
    }
}

impl Default for MigrationProgress {
    fn default() -> Self {
        Self::new()
    }
}
