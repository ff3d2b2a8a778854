//! Console reporting.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use pagure_migrate::{
    FailurePhase, FixUp, MigrationReport, ProgressCallback, ProgressUpdate, RunOutcome,
};

/// Announce a new step.
pub fn section(message: &str) {
    println!("{} {message}", style("[ * ]").cyan().bold());
}

/// Report a step that went well.
pub fn success(message: &str) {
    println!("{} {message}", style("[ ✓ ]").green().bold());
}

/// Report a step that failed.
pub fn failure(message: &str) {
    eprintln!("{} {message}", style("[ ✗ ]").red().bold());
}

/// Print a detail line.
pub fn general(message: &str) {
    println!("      {message}");
}

/// Console progress reporter using indicatif.
pub struct ConsoleProgressReporter {
    progress_bar: ProgressBar,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter.
    pub fn new() -> Self {
        let progress_bar = ProgressBar::new(0);
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        progress_bar.set_style(bar_style);

        Self { progress_bar }
    }

    /// Create a progress callback for use with migration.
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.progress_bar.clone();
        Box::new(move |update: ProgressUpdate| {
            pb.set_length(update.total);
            pb.set_position(update.completed);

            let mut msg = update.phase.to_string();
            if let Some(page) = update.page {
                msg = format!("{msg} (page {page})");
            }
            if let Some(id) = update.ticket_id {
                msg = format!("{msg}: #{id}");
            }
            if update.failures > 0 {
                msg = format!("{msg} - {} failed", update.failures);
            }
            pb.set_message(msg);
        })
    }

    /// Finish the progress bar.
    pub fn finish(&self, message: &str) {
        self.progress_bar.finish_with_message(message.to_string());
    }
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Print a summary of the migration.
pub fn print_summary(report: &MigrationReport) {
    println!("\n=== Migration Summary ===\n");
    println!("Tickets expected:    {}", report.expected_tickets);
    println!("Tickets migrated:    {}", report.tickets_transferred);
    println!("Comments migrated:   {}", report.comments_transferred);
    println!("Issues closed:       {}", report.tickets_closed);
    println!("Left open:           {}", report.status_unchanged);
    println!("Skipped by filter:   {}", report.tickets_skipped);

    if let Some(duration) = report.duration() {
        println!("\nCompleted in {} seconds", duration.num_seconds());
    }

    if !report.failures.is_empty() {
        println!("\nFailures ({}):", report.failures.len());
        for f in &report.failures {
            let ticket = f
                .ticket_id
                .map_or_else(|| "-".to_string(), |id| format!("#{id}"));
            let comment = f
                .comment_id
                .map(|id| format!(" comment {id}"))
                .unwrap_or_default();
            let code = f
                .status
                .map_or_else(|| "no response".to_string(), |s| s.to_string());
            println!(
                "  [{}] ticket {ticket}{comment} ({code}, {}s): {}",
                f.phase, f.elapsed, f.reason
            );
        }

        if let Some(hint) = rerun_hint(report) {
            println!("\n{hint}");
        }

        let fix_ups = report.fix_ups();
        if !fix_ups.is_empty() {
            println!("\nAlready on the destination, fix by hand:");
            for fix_up in &fix_ups {
                println!("  {}", fix_up_line(fix_up));
            }
        }
    }

    let status = match &report.outcome {
        RunOutcome::Completed if report.failures.is_empty() => style("SUCCESS").green(),
        RunOutcome::Completed => style("PARTIAL").yellow(),
        RunOutcome::Failed(_) | RunOutcome::Pending => style("FAILED").red(),
    };
    println!("\nOverall Status: {status}");
}

/// Command-line hint re-running the tickets that never reached the destination.
fn rerun_hint(report: &MigrationReport) -> Option<String> {
    let ids = report.retry_ticket_ids();
    if ids.is_empty() {
        return None;
    }
    let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
    Some(format!("Re-run the failed tickets with: --select {}", ids.join(",")))
}

fn fix_up_line(fix_up: &FixUp) -> String {
    let issue = fix_up
        .iid
        .map_or_else(|| "issue unconfirmed".to_string(), |iid| format!("issue #{iid}"));
    let what = match (fix_up.phase, fix_up.comment_id) {
        (FailurePhase::CommentCreate, Some(comment)) => format!("copy comment {comment}"),
        (FailurePhase::StatusSync, _) => "close the issue".to_string(),
        (FailurePhase::IssueCreate, _) => "check whether the issue was created".to_string(),
        (phase, _) => format!("redo {phase}"),
    };
    format!("ticket #{} -> {issue}: {what}", fix_up.ticket_id)
}
