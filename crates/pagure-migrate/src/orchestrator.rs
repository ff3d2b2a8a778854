//! Migration orchestrator.
//!
//! Drives counting, paging, per-ticket replay, per-comment replay and status
//! sync strictly in sequence. Only one request is in flight at a time, and
//! the active ticket mapping is replaced only when the next ticket starts.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::config::{FailurePolicy, MigrationConfig, TransferConfig};
use crate::counter::count_tickets;
use crate::destination::{CreatedIssue, GitLabClient, IssueSink, NewIssue};
use crate::error::{format_elapsed, MigrationError, RequestError, Result};
use crate::filter::StateFilter;
use crate::progress::{MigrationPhase, MigrationProgress};
use crate::render::{RenderContext, Renderer};
use crate::source::{PagureClient, TicketSource};
use crate::types::{
    CommentRecord, FailurePhase, MigrationReport, SelectedIds, StatusSyncOutcome, TicketRecord,
};

/// Position of the orchestrator in its state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayState {
    Init,
    Counting,
    Paging(u64),
    PerTicket(usize),
    PerComment(usize),
    StatusSync,
    Advance,
    Done,
    Failed(String),
}

impl fmt::Display for ReplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Counting => write!(f, "counting"),
            Self::Paging(page) => write!(f, "paging({page})"),
            Self::PerTicket(index) => write!(f, "ticket({index})"),
            Self::PerComment(index) => write!(f, "comment({index})"),
            Self::StatusSync => write!(f, "status-sync"),
            Self::Advance => write!(f, "advance"),
            Self::Done => write!(f, "done"),
            Self::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

/// Source ticket currently being replayed and the issue that replaces it.
#[derive(Debug, Clone)]
pub struct ActiveTicket {
    pub source: TicketRecord,
    pub destination: CreatedIssue,
}

/// Mutable state of one run. Owned by the orchestrator alone.
#[derive(Debug, Clone)]
pub struct MigrationState {
    pub expected_ticket_count: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub state_filter: StateFilter,
    /// Set once the destination issue exists, cleared when the next ticket starts.
    pub active: Option<ActiveTicket>,
    pub phase: ReplayState,
}

impl MigrationState {
    fn new(transfer: &TransferConfig) -> Self {
        Self {
            expected_ticket_count: 0,
            page_size: transfer.page_size,
            total_pages: 0,
            state_filter: transfer.state,
            active: None,
            phase: ReplayState::Init,
        }
    }

    fn enter(&mut self, next: ReplayState) {
        trace!(from = %self.phase, to = %next, "State transition");
        self.phase = next;
    }
}

/// Replays source tickets onto the destination.
pub struct Migrator<S, D> {
    source: S,
    destination: D,
    renderer: Renderer,
    transfer: TransferConfig,
    policy: FailurePolicy,
    progress: MigrationProgress,
}

impl Migrator<PagureClient, GitLabClient> {
    /// Build a migrator talking to Pagure and GitLab.
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        config.validate_all()?;

        let source = PagureClient::new(&config.source, &config.transfer)?;
        let destination = GitLabClient::new(&config.destination, &config.transfer)?;
        let renderer = Renderer::new(
            config.templates.clone(),
            RenderContext {
                source_repo: config.source.repo.clone(),
                repo_link: config.source.repo_link(),
            },
        );

        Ok(Self::new(
            source,
            destination,
            renderer,
            config.transfer.clone(),
            config.failure_policy,
        ))
    }
}

impl<S, D> Migrator<S, D>
where
    S: TicketSource,
    D: IssueSink,
{
    /// Create a new migrator.
    pub fn new(
        source: S,
        destination: D,
        renderer: Renderer,
        transfer: TransferConfig,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            source,
            destination,
            renderer,
            transfer,
            policy,
            progress: MigrationProgress::new(),
        }
    }

    /// Set a progress tracker.
    pub fn with_progress(mut self, progress: MigrationProgress) -> Self {
        self.progress = progress;
        self
    }

    /// The source reader in use.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run the migration.
    ///
    /// Per-ticket failures are recorded in the report. A fatal failure ends
    /// the run early with [`RunOutcome::Failed`](crate::types::RunOutcome::Failed).
    pub async fn migrate(&self) -> MigrationReport {
        let mut report = MigrationReport::new();
        let mut state = MigrationState::new(&self.transfer);

        info!(
            state = %self.transfer.state,
            page_size = self.transfer.page_size,
            "Starting ticket migration"
        );

        let result = match self.transfer.selection.explicit_ids() {
            Some(ids) => self.run_selected(ids, &mut state, &mut report).await,
            None => self.run_paged(&mut state, &mut report).await,
        };

        match result {
            Ok(()) => {
                state.enter(ReplayState::Done);
                self.progress.finish(MigrationPhase::Complete);
                report.complete();
                info!(
                    tickets = report.tickets_transferred,
                    comments = report.comments_transferred,
                    failures = report.failures.len(),
                    "Ticket migration finished"
                );
            }
            Err(e) => {
                error!(error = %e, "Ticket migration aborted");
                state.enter(ReplayState::Failed(e.to_string()));
                self.progress.finish(MigrationPhase::Failed);
                report.fail(e.to_string());
            }
        }

        report
    }

    async fn run_paged(
        &self,
        state: &mut MigrationState,
        report: &mut MigrationReport,
    ) -> Result<()> {
        state.enter(ReplayState::Counting);
        self.progress.start(MigrationPhase::Counting, 0);

        let counted = count_tickets(&self.source, self.transfer.page_size).await;
        let count = match counted.result {
            Ok(count) => count,
            Err(e) => {
                report.record_failure(FailurePhase::Count, None, None, &e, counted.elapsed);
                self.progress.failure(None);
                return Err(MigrationError::CountFailed {
                    source: e,
                    elapsed: format_elapsed(counted.elapsed),
                });
            }
        };

        state.expected_ticket_count = count.total;
        state.page_size = count.page_size;
        state.total_pages = count.total.div_ceil(count.page_size);
        report.expected_tickets = count.total;
        info!(
            tickets = count.total,
            pages = state.total_pages,
            elapsed = %format_elapsed(counted.elapsed),
            "Counted tickets"
        );

        self.progress
            .start(MigrationPhase::MigratingTickets, count.total);

        let mut seen = 0;
        let mut page = 1;
        while seen < state.expected_ticket_count {
            state.enter(ReplayState::Paging(page));
            self.progress.page(page);

            let listed = self.source.list_page(page).await;
            let summaries = match listed.result {
                Ok(listing) => listing.issues,
                Err(e) => {
                    report.record_failure(FailurePhase::PageList, None, None, &e, listed.elapsed);
                    self.progress.failure(None);
                    return Err(MigrationError::PageFailed { page, source: e });
                }
            };

            if summaries.is_empty() {
                return Err(MigrationError::UnexpectedEmptyPage {
                    page,
                    remaining: state.expected_ticket_count - seen,
                });
            }
            debug!(page, tickets = summaries.len(), "Listed page");

            for (index, summary) in summaries.iter().enumerate() {
                if seen >= state.expected_ticket_count {
                    break;
                }
                seen += 1;
                state.enter(ReplayState::PerTicket(index));
                self.replay_ticket(summary.id, state, report).await?;
            }
            page += 1;
        }

        Ok(())
    }

    async fn run_selected(
        &self,
        ids: SelectedIds,
        state: &mut MigrationState,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let expected = ids.remaining();
        state.expected_ticket_count = expected;
        report.expected_tickets = expected;
        self.progress
            .start(MigrationPhase::MigratingTickets, expected);

        for (index, id) in ids.enumerate() {
            state.enter(ReplayState::PerTicket(index));
            self.replay_ticket(id, state, report).await?;
        }
        Ok(())
    }

    /// Replay one ticket: issue, comments, then status.
    async fn replay_ticket(
        &self,
        ticket_id: u64,
        state: &mut MigrationState,
        report: &mut MigrationReport,
    ) -> Result<()> {
        state.active = None;

        let fetched = self.source.fetch_ticket(ticket_id).await;
        let fetched = match fetched.result {
            Ok(ticket) => ticket,
            Err(e) => {
                let result = self.item_failure(
                    report,
                    FailurePhase::TicketFetch,
                    ticket_id,
                    None,
                    e,
                    fetched.elapsed,
                );
                self.advance(state, ticket_id);
                return result;
            }
        };

        if fetched.skip {
            debug!(ticket_id, status = %fetched.ticket.status_text, "Skipping ticket");
            report.tickets_skipped += 1;
            self.advance(state, ticket_id);
            return Ok(());
        }

        let request = self.issue_request(&fetched.ticket);
        let created = self.destination.create_issue(&request).await;
        let issue = match created.result {
            Ok(issue) => issue,
            Err(e) => {
                let result = self.item_failure(
                    report,
                    FailurePhase::IssueCreate,
                    ticket_id,
                    None,
                    e,
                    created.elapsed,
                );
                self.advance(state, ticket_id);
                return result;
            }
        };

        info!(
            ticket_id,
            iid = issue.iid,
            url = %issue.web_url,
            elapsed = %format_elapsed(created.elapsed),
            "Created issue"
        );
        report.tickets_transferred += 1;
        report.mapping.push((ticket_id, issue.iid));
        state.active = Some(ActiveTicket {
            source: fetched.ticket,
            destination: issue,
        });

        let mut comments = fetched.comments;
        comments.sort_by_key(|comment| comment.created_at);
        for (index, comment) in comments.iter().enumerate() {
            state.enter(ReplayState::PerComment(index));
            self.replay_comment(state, comment, report).await?;
        }

        state.enter(ReplayState::StatusSync);
        self.sync_status(state, report).await?;

        self.advance(state, ticket_id);
        Ok(())
    }

    async fn replay_comment(
        &self,
        state: &MigrationState,
        comment: &CommentRecord,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let Some(active) = &state.active else {
            return Ok(());
        };

        let body = self.renderer.render_comment(&active.source, comment);
        let created = self
            .destination
            .create_comment(&active.destination, &body)
            .await;

        match created.result {
            Ok(note) => {
                debug!(
                    ticket_id = active.source.id,
                    comment_id = comment.id,
                    url = %note.url,
                    elapsed = %format_elapsed(created.elapsed),
                    "Created comment"
                );
                report.comments_transferred += 1;
                Ok(())
            }
            Err(e) => self.item_failure(
                report,
                FailurePhase::CommentCreate,
                active.source.id,
                Some(comment.id),
                e,
                created.elapsed,
            ),
        }
    }

    /// Close the destination issue when the source ticket is closed.
    async fn sync_status(
        &self,
        state: &MigrationState,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let Some(active) = &state.active else {
            return Ok(());
        };

        if !active.source.is_closed() {
            report.status_unchanged += 1;
            trace!(
                ticket_id = active.source.id,
                outcome = ?StatusSyncOutcome::Unchanged,
                "Status left unchanged"
            );
            return Ok(());
        }

        let closed = self
            .destination
            .close_issue(active.destination.iid)
            .await;
        match closed.result {
            Ok(()) => {
                debug!(
                    ticket_id = active.source.id,
                    iid = active.destination.iid,
                    outcome = ?StatusSyncOutcome::Closed,
                    "Closed issue"
                );
                report.tickets_closed += 1;
                Ok(())
            }
            Err(e) => self.item_failure(
                report,
                FailurePhase::StatusSync,
                active.source.id,
                None,
                e,
                closed.elapsed,
            ),
        }
    }

    fn advance(&self, state: &mut MigrationState, ticket_id: u64) {
        state.enter(ReplayState::Advance);
        self.progress.ticket_done(ticket_id);
    }

    fn issue_request(&self, ticket: &TicketRecord) -> NewIssue {
        let rendered = self.renderer.render_ticket(ticket);
        NewIssue {
            title: rendered.title,
            description: rendered.body,
            labels: self.transfer.labels.then(|| ticket.tags.join(",")),
            confidential: self.transfer.confidential.then_some(ticket.is_confidential),
            iid: self.transfer.preserve_numbering.then_some(ticket.id),
        }
    }

    fn item_failure(
        &self,
        report: &mut MigrationReport,
        phase: FailurePhase,
        ticket_id: u64,
        comment_id: Option<u64>,
        error: RequestError,
        elapsed: Duration,
    ) -> Result<()> {
        warn!(
            ticket_id,
            comment_id = ?comment_id,
            phase = %phase,
            elapsed = %format_elapsed(elapsed),
            error = %error,
            "Replay step failed"
        );
        report.record_failure(phase, Some(ticket_id), comment_id, &error, elapsed);
        self.progress.failure(Some(ticket_id));

        if self.policy.is_fatal(&error) {
            return Err(MigrationError::Fatal {
                phase,
                ticket_id,
                source: error,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::CreatedComment;
    use crate::error::Timed;
    use crate::render::Templates;
    use crate::source::{FetchedTicket, IssuePage, Pagination, TicketSummary};
    use crate::types::{Author, RunOutcome, TicketSelection, TicketStatus};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    fn timed<T>(result: std::result::Result<T, RequestError>) -> Timed<T> {
        Timed {
            result,
            elapsed: Duration::ZERO,
        }
    }

    fn author(name: &str) -> Author {
        Author {
            display_name: name.to_string(),
            profile_url: format!("https://accounts.example/user/{name}"),
            handle: Some(name.to_string()),
        }
    }

    fn ticket(id: u64, status: TicketStatus) -> TicketRecord {
        TicketRecord {
            id,
            title: format!("Ticket {id}"),
            body: format!("body of {id}"),
            author: author("alice"),
            tags: vec!["infra".to_string()],
            is_confidential: false,
            created_at: 1_600_000_000,
            status_text: format!("{status:?}"),
            status,
            canonical_url: format!("https://pagure.io/infra/issue/{id}"),
        }
    }

    fn comment(id: u64, created_at: i64, body: &str) -> CommentRecord {
        CommentRecord {
            id,
            body: body.to_string(),
            author: author("bob"),
            created_at,
        }
    }

    /// In-memory source paginating tickets in insertion order.
    struct FakeSource {
        filter: StateFilter,
        page_size: u64,
        order: Vec<u64>,
        tickets: HashMap<u64, (TicketRecord, Vec<CommentRecord>)>,
        fail_count: bool,
        /// Listing calls after this many come back empty.
        empty_after: Option<usize>,
        listed: Mutex<Vec<u64>>,
    }

    impl FakeSource {
        fn new(filter: StateFilter, page_size: u64) -> Self {
            Self {
                filter,
                page_size,
                order: Vec::new(),
                tickets: HashMap::new(),
                fail_count: false,
                empty_after: None,
                listed: Mutex::new(Vec::new()),
            }
        }

        fn with(mut self, ticket: TicketRecord, comments: Vec<CommentRecord>) -> Self {
            self.order.push(ticket.id);
            self.tickets.insert(ticket.id, (ticket, comments));
            self
        }
    }

    #[async_trait]
    impl TicketSource for FakeSource {
        async fn list_page(&self, page: u64) -> Timed<IssuePage> {
            let calls = {
                let mut listed = self.listed.lock().unwrap();
                listed.push(page);
                listed.len()
            };
            if self.fail_count {
                return timed(Err(RequestError::Transport("connection reset".into())));
            }

            let in_scope: Vec<u64> = self
                .order
                .iter()
                .copied()
                .filter(|id| self.filter.includes(&self.tickets[id].0.status_text))
                .collect();
            let pages = (in_scope.len() as u64).div_ceil(self.page_size).max(1);
            let issues: Vec<TicketSummary> = if self.empty_after.is_some_and(|n| calls > n) {
                Vec::new()
            } else {
                in_scope
                    .iter()
                    .skip(((page - 1) * self.page_size) as usize)
                    .take(self.page_size as usize)
                    .map(|id| TicketSummary {
                        id: *id,
                        title: String::new(),
                        status: String::new(),
                    })
                    .collect()
            };

            timed(Ok(IssuePage {
                total_issues: issues.len() as u64,
                issues,
                pagination: Pagination {
                    next: (page < pages).then(|| format!("page={}", page + 1)),
                    pages,
                    per_page: None,
                },
            }))
        }

        async fn fetch_ticket(&self, id: u64) -> Timed<FetchedTicket> {
            match self.tickets.get(&id) {
                Some((ticket, comments)) => timed(Ok(FetchedTicket {
                    skip: !self.filter.includes(&ticket.status_text),
                    ticket: ticket.clone(),
                    comments: comments.clone(),
                })),
                None => timed(Err(RequestError::http(reqwest::StatusCode::NOT_FOUND))),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum SinkCall {
        Issue { title: String, iid: u64 },
        Comment { iid: u64, body: String },
        Close { iid: u64 },
    }

    /// Destination recording every call in order.
    struct RecordingSink {
        next_iid: Mutex<u64>,
        calls: Mutex<Vec<SinkCall>>,
        requests: Mutex<Vec<NewIssue>>,
        fail_titles: HashSet<String>,
    }

    impl RecordingSink {
        fn new(first_iid: u64) -> Self {
            Self {
                next_iid: Mutex::new(first_iid),
                calls: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
                fail_titles: HashSet::new(),
            }
        }

        fn failing_on(mut self, title: &str) -> Self {
            self.fail_titles.insert(title.to_string());
            self
        }

        fn calls(&self) -> Vec<SinkCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IssueSink for RecordingSink {
        async fn create_issue(&self, issue: &NewIssue) -> Timed<CreatedIssue> {
            self.requests.lock().unwrap().push(issue.clone());
            if self.fail_titles.contains(&issue.title) {
                return timed(Err(RequestError::Transport("connection reset".into())));
            }

            let mut next = self.next_iid.lock().unwrap();
            let iid = issue.iid.unwrap_or(*next);
            *next += 1;
            self.calls.lock().unwrap().push(SinkCall::Issue {
                title: issue.title.clone(),
                iid,
            });
            timed(Ok(CreatedIssue {
                iid,
                web_url: format!("https://gitlab.example/-/issues/{iid}"),
            }))
        }

        async fn create_comment(&self, issue: &CreatedIssue, body: &str) -> Timed<CreatedComment> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(SinkCall::Comment {
                iid: issue.iid,
                body: body.to_string(),
            });
            timed(Ok(CreatedComment {
                id: calls.len() as u64,
                url: format!("{}#note_{}", issue.web_url, calls.len()),
            }))
        }

        async fn close_issue(&self, iid: u64) -> Timed<()> {
            self.calls.lock().unwrap().push(SinkCall::Close { iid });
            timed(Ok(()))
        }
    }

    fn renderer() -> Renderer {
        Renderer::new(
            Templates {
                title: "[SN#{ticket_id}] {title}".to_string(),
                body: "{body}".to_string(),
                comment: "{body}".to_string(),
            },
            RenderContext {
                source_repo: "infra".to_string(),
                repo_link: "https://pagure.io/infra".to_string(),
            },
        )
    }

    fn transfer(state: StateFilter) -> TransferConfig {
        TransferConfig {
            state,
            page_size: 2,
            ..TransferConfig::default()
        }
    }

    fn migrator(
        source: FakeSource,
        sink: RecordingSink,
        transfer: TransferConfig,
        policy: FailurePolicy,
    ) -> Migrator<FakeSource, RecordingSink> {
        Migrator::new(source, sink, renderer(), transfer, policy)
    }

    #[tokio::test]
    async fn test_two_open_tickets_end_to_end() {
        let source = FakeSource::new(StateFilter::Open, 2)
            .with(
                ticket(10, TicketStatus::Open),
                vec![comment(1, 1_600_000_100, "looks good")],
            )
            .with(ticket(11, TicketStatus::Open), vec![]);
        let migrator = migrator(
            source,
            RecordingSink::new(1),
            transfer(StateFilter::Open),
            FailurePolicy::default(),
        );

        let report = migrator.migrate().await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.expected_tickets, 2);
        assert_eq!(report.tickets_transferred, 2);
        assert_eq!(report.comments_transferred, 1);
        assert_eq!(report.status_unchanged, 2);
        assert_eq!(report.mapping, vec![(10, 1), (11, 2)]);
        assert_eq!(
            migrator.destination.calls(),
            vec![
                SinkCall::Issue {
                    title: "[SN#10] Ticket 10".to_string(),
                    iid: 1
                },
                SinkCall::Comment {
                    iid: 1,
                    body: "looks good".to_string()
                },
                SinkCall::Issue {
                    title: "[SN#11] Ticket 11".to_string(),
                    iid: 2
                },
            ]
        );
        // One page, so the counter needs one probe and paging one listing.
        assert_eq!(*migrator.source().listed.lock().unwrap(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_comments_replayed_chronologically() {
        let source = FakeSource::new(StateFilter::Open, 2).with(
            ticket(4, TicketStatus::Open),
            vec![
                comment(30, 100, "first"),
                comment(12, 200, "second"),
                comment(25, 300, "third"),
            ],
        );
        let migrator = migrator(
            source,
            RecordingSink::new(1),
            transfer(StateFilter::Open),
            FailurePolicy::default(),
        );

        migrator.migrate().await;

        let bodies: Vec<String> = migrator
            .destination
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Comment { body, .. } => Some(body),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_mapping_follows_active_ticket() {
        let source = FakeSource::new(StateFilter::All, 2)
            .with(
                ticket(1, TicketStatus::Closed),
                vec![comment(1, 10, "a1"), comment(2, 20, "a2")],
            )
            .with(ticket(2, TicketStatus::Closed), vec![comment(3, 30, "b1")]);
        let migrator = migrator(
            source,
            RecordingSink::new(100),
            transfer(StateFilter::All),
            FailurePolicy::default(),
        );

        let report = migrator.migrate().await;

        assert_eq!(report.tickets_closed, 2);
        assert_eq!(
            migrator.destination.calls(),
            vec![
                SinkCall::Issue {
                    title: "[SN#1] Ticket 1".to_string(),
                    iid: 100
                },
                SinkCall::Comment {
                    iid: 100,
                    body: "a1".to_string()
                },
                SinkCall::Comment {
                    iid: 100,
                    body: "a2".to_string()
                },
                SinkCall::Close { iid: 100 },
                SinkCall::Issue {
                    title: "[SN#2] Ticket 2".to_string(),
                    iid: 101
                },
                SinkCall::Comment {
                    iid: 101,
                    body: "b1".to_string()
                },
                SinkCall::Close { iid: 101 },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_ticket_does_not_stop_run() {
        let source = FakeSource::new(StateFilter::Open, 2)
            .with(ticket(1, TicketStatus::Open), vec![])
            .with(ticket(2, TicketStatus::Open), vec![comment(5, 10, "lost")])
            .with(ticket(3, TicketStatus::Open), vec![]);
        let sink = RecordingSink::new(1).failing_on("[SN#2] Ticket 2");
        let migrator = migrator(
            source,
            sink,
            transfer(StateFilter::Open),
            FailurePolicy::default(),
        );

        let report = migrator.migrate().await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.tickets_transferred, 2);
        assert_eq!(report.comments_transferred, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phase, FailurePhase::IssueCreate);
        assert_eq!(report.failures[0].phase.to_string(), "issue-create");
        assert_eq!(report.failures[0].ticket_id, Some(2));
        assert_eq!(report.retry_ticket_ids(), vec![2]);
        assert_eq!(report.mapping, vec![(1, 1), (3, 2)]);
        assert!(migrator
            .destination
            .calls()
            .iter()
            .all(|call| !matches!(call, SinkCall::Comment { .. })));
    }

    #[tokio::test]
    async fn test_transport_failure_fatal_when_configured() {
        let source = FakeSource::new(StateFilter::Open, 2)
            .with(ticket(1, TicketStatus::Open), vec![])
            .with(ticket(2, TicketStatus::Open), vec![])
            .with(ticket(3, TicketStatus::Open), vec![]);
        let sink = RecordingSink::new(1).failing_on("[SN#2] Ticket 2");
        let policy = FailurePolicy {
            abort_on_transport: true,
            ..FailurePolicy::default()
        };
        let migrator = migrator(source, sink, transfer(StateFilter::Open), policy);

        let report = migrator.migrate().await;

        assert!(matches!(report.outcome, RunOutcome::Failed(_)));
        assert_eq!(report.tickets_transferred, 1);
        assert_eq!(migrator.destination.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_count_failure_is_fatal() {
        let mut source =
            FakeSource::new(StateFilter::Open, 2).with(ticket(1, TicketStatus::Open), vec![]);
        source.fail_count = true;
        let migrator = migrator(
            source,
            RecordingSink::new(1),
            transfer(StateFilter::Open),
            FailurePolicy::default(),
        );

        let report = migrator.migrate().await;

        assert!(matches!(report.outcome, RunOutcome::Failed(_)));
        assert_eq!(report.failures[0].phase, FailurePhase::Count);
        assert!(migrator.destination.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_page_while_tickets_remain_is_fatal() {
        let mut source = FakeSource::new(StateFilter::Open, 2);
        for id in 1..=3 {
            source = source.with(ticket(id, TicketStatus::Open), vec![]);
        }
        // Two counting probes and the first page listing succeed.
        source.empty_after = Some(3);
        let migrator = migrator(
            source,
            RecordingSink::new(1),
            transfer(StateFilter::Open),
            FailurePolicy::default(),
        );

        let report = migrator.migrate().await;

        assert_eq!(report.tickets_transferred, 2);
        match report.outcome {
            RunOutcome::Failed(reason) => assert!(reason.contains("Page 2 was empty")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_filtered_ticket_is_skipped_without_calls() {
        let source = FakeSource::new(StateFilter::Closed, 2)
            .with(ticket(1, TicketStatus::Open), vec![]);
        let mut transfer = transfer(StateFilter::Closed);
        transfer.selection = TicketSelection::Select(vec![1]);
        let migrator = migrator(
            source,
            RecordingSink::new(1),
            transfer,
            FailurePolicy::default(),
        );

        let report = migrator.migrate().await;

        assert_eq!(report.tickets_skipped, 1);
        assert_eq!(report.tickets_transferred, 0);
        assert!(report.failures.is_empty());
        assert!(migrator.destination.calls().is_empty());
    }

    #[tokio::test]
    async fn test_selection_bypasses_listing() {
        let source = FakeSource::new(StateFilter::All, 2)
            .with(ticket(10, TicketStatus::Open), vec![])
            .with(ticket(11, TicketStatus::Closed), vec![]);
        let mut transfer = transfer(StateFilter::All);
        transfer.selection = TicketSelection::Select(vec![11, 10, 99]);
        let migrator = migrator(
            source,
            RecordingSink::new(1),
            transfer,
            FailurePolicy::default(),
        );

        let report = migrator.migrate().await;

        assert!(migrator.source().listed.lock().unwrap().is_empty());
        assert_eq!(report.mapping, vec![(10, 1), (11, 2)]);
        assert_eq!(report.tickets_closed, 1);
        assert_eq!(report.status_unchanged, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phase, FailurePhase::TicketFetch);
        assert_eq!(report.failures[0].status, Some(404));
    }

    #[tokio::test]
    async fn test_open_ended_range_walks_ids_lazily() {
        let source = FakeSource::new(StateFilter::All, 2)
            .with(ticket(1, TicketStatus::Open), vec![])
            .with(ticket(2, TicketStatus::Open), vec![]);
        let mut transfer = transfer(StateFilter::All);
        transfer.selection = TicketSelection::Range {
            start: 1,
            end: u64::MAX,
        };
        let policy = FailurePolicy {
            abort_on_any: true,
            ..FailurePolicy::default()
        };
        let migrator = migrator(source, RecordingSink::new(1), transfer, policy);

        let report = migrator.migrate().await;

        assert_eq!(report.expected_tickets, u64::MAX);
        assert_eq!(report.mapping, vec![(1, 1), (2, 2)]);
        assert!(matches!(report.outcome, RunOutcome::Failed(_)));
        assert_eq!(report.failures[0].ticket_id, Some(3));
    }

    #[tokio::test]
    async fn test_finished_progress_keeps_final_counts() {
        let source = FakeSource::new(StateFilter::Open, 2)
            .with(ticket(1, TicketStatus::Open), vec![])
            .with(ticket(2, TicketStatus::Open), vec![])
            .with(ticket(3, TicketStatus::Open), vec![]);
        let sink = RecordingSink::new(1).failing_on("[SN#3] Ticket 3");
        let migrator = migrator(
            source,
            sink,
            transfer(StateFilter::Open),
            FailurePolicy::default(),
        );

        migrator.migrate().await;

        let done = migrator.progress.snapshot();
        assert_eq!(done.phase, MigrationPhase::Complete);
        assert_eq!((done.completed, done.total), (3, 3));
        assert_eq!(done.failures, 1);
        assert_eq!(done.page, Some(2));
    }

    #[tokio::test]
    async fn test_issue_options_follow_transfer_settings() {
        let mut confidential = ticket(7, TicketStatus::Open);
        confidential.is_confidential = true;
        confidential.body = "cc @carol".to_string();
        confidential.tags = vec!["bug".to_string(), "easyfix".to_string()];
        let source = FakeSource::new(StateFilter::Open, 2).with(confidential, vec![]);
        let mut transfer = transfer(StateFilter::Open);
        transfer.labels = true;
        transfer.confidential = true;
        transfer.preserve_numbering = true;
        let migrator = migrator(
            source,
            RecordingSink::new(1),
            transfer,
            FailurePolicy::default(),
        );

        let report = migrator.migrate().await;

        let requests = migrator.destination.requests.lock().unwrap();
        assert_eq!(requests[0].labels.as_deref(), Some("bug,easyfix"));
        assert_eq!(requests[0].confidential, Some(true));
        assert_eq!(requests[0].iid, Some(7));
        assert_eq!(requests[0].description, "cc &carol");
        assert_eq!(report.mapping, vec![(7, 7)]);
    }
}
