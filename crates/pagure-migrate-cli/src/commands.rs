//! CLI command implementations.

use anyhow::Context;
use pagure_migrate::{
    count_tickets, format_elapsed, MigrationConfig, MigrationProgress, Migrator, PagureClient,
    RunOutcome, StateFilter, TicketSelection,
};
use std::path::Path;
use thiserror::Error;

use crate::output::{self, ConsoleProgressReporter};
use crate::{ConnectionArgs, TransferArgs};

/// Configuration file read when `--config` is not given.
const DEFAULT_CONFIG: &str = "pagure-migrate.yaml";

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid ticket range '{0}', expected START-END")]
    InvalidRange(String),

    #[error("Invalid ticket state: {0}")]
    InvalidState(String),

    #[error("Migration did not complete: {0}")]
    Incomplete(String),
}

/// Migrate tickets and their comments.
pub async fn tkts(connection: &ConnectionArgs, transfer: &TransferArgs) -> anyhow::Result<()> {
    let mut config = load_config(connection)?;
    apply_transfer(&mut config, transfer)?;

    output::section(&format!(
        "Migrating {} tickets from {} to {}",
        config.transfer.state,
        config.source.repo_link(),
        config.destination.project
    ));

    let reporter = ConsoleProgressReporter::new();
    let migrator = Migrator::from_config(&config)?
        .with_progress(MigrationProgress::with_callback(reporter.callback()));

    let report = migrator.migrate().await;
    reporter.finish("done");

    output::print_summary(&report);

    if let Some(path) = &transfer.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        output::general(&format!("Report written to {}", path.display()));
    }

    match report.outcome {
        RunOutcome::Failed(reason) => Err(CliError::Incomplete(reason).into()),
        _ => Ok(()),
    }
}

/// Count the tickets in scope without migrating anything.
pub async fn count(connection: &ConnectionArgs) -> anyhow::Result<()> {
    let config = load_config(connection)?;
    config.validate_source()?;

    output::section(&format!(
        "Counting {} tickets in {}",
        config.transfer.state,
        config.source.repo_link()
    ));

    let client = PagureClient::new(&config.source, &config.transfer)?;
    let timed = count_tickets(&client, config.transfer.page_size).await;
    let elapsed = format_elapsed(timed.elapsed);

    let tally = timed
        .result
        .with_context(|| format!("ticket counting failed after {elapsed}s"))?;

    output::success(&format!(
        "{} tickets over {} pages of {} ({elapsed}s)",
        tally.total, tally.pages, tally.page_size
    ));
    Ok(())
}

/// Load the configuration file, then layer the connection flags over it.
fn load_config(connection: &ConnectionArgs) -> anyhow::Result<MigrationConfig> {
    let mut config = match &connection.config {
        Some(path) => MigrationConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => MigrationConfig::from_file(DEFAULT_CONFIG)
            .with_context(|| format!("failed to load {DEFAULT_CONFIG}"))?,
        None => MigrationConfig::default(),
    };
    apply_connection(&mut config, connection)?;
    Ok(config)
}

fn apply_connection(config: &mut MigrationConfig, args: &ConnectionArgs) -> Result<(), CliError> {
    if let Some(url) = &args.source_url {
        config.source.url = url.clone();
    }
    if let Some(repo) = &args.source_repo {
        config.source.repo = repo.clone();
    }
    if let Some(token) = &args.source_token {
        config.source.token = token.clone();
    }
    if let Some(url) = &args.account_url {
        config.source.account_url = url.clone();
    }
    if let Some(url) = &args.destination_url {
        config.destination.url = url.clone();
    }
    if let Some(project) = &args.destination_project {
        config.destination.project = project.clone();
    }
    if let Some(token) = &args.destination_token {
        config.destination.token = token.clone();
    }
    if let Some(status) = &args.status {
        config.transfer.state = status
            .to_lowercase()
            .parse::<StateFilter>()
            .map_err(CliError::InvalidState)?;
    }
    if let Some(size) = args.page_size {
        config.transfer.page_size = size;
    }
    if let Some(secs) = args.timeout {
        config.transfer.timeout_secs = secs;
    }
    Ok(())
}

/// Layer the transfer flags over the configuration. Flags only switch
/// options on; what the file enables stays enabled.
fn apply_transfer(config: &mut MigrationConfig, args: &TransferArgs) -> Result<(), CliError> {
    config.transfer.labels |= args.labels;
    config.transfer.confidential |= args.secret;
    config.transfer.preserve_numbering |= args.series;

    if let Some(ids) = &args.select {
        config.transfer.selection = TicketSelection::Select(ids.clone());
    } else if let Some(range) = &args.ranges {
        let (start, end) = parse_range(range)?;
        config.transfer.selection = TicketSelection::Range { start, end };
    }

    config.failure_policy.abort_on_transport |= args.abort_on_transport;
    config.failure_policy.abort_on_any |= args.fail_fast;
    Ok(())
}

/// Parse an inclusive `START-END` id range.
fn parse_range(raw: &str) -> Result<(u64, u64), CliError> {
    let invalid = || CliError::InvalidRange(raw.to_string());

    let (start, end) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let start: u64 = start.trim().parse().map_err(|_| invalid())?;
    let end: u64 = end.trim().parse().map_err(|_| invalid())?;

    if start > end {
        return Err(invalid());
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("10-25").unwrap(), (10, 25));
        assert_eq!(parse_range(" 3 - 3 ").unwrap(), (3, 3));
        assert!(matches!(parse_range("25-10"), Err(CliError::InvalidRange(_))));
        assert!(parse_range("12").is_err());
        assert!(parse_range("a-b").is_err());
    }

    #[test]
    fn test_connection_overrides() {
        let mut config = MigrationConfig::default();
        let args = ConnectionArgs {
            source_repo: Some("fedora-infra/ansible".into()),
            destination_token: Some("glpat-x".into()),
            status: Some("Closed".into()),
            page_size: Some(50),
            ..ConnectionArgs::default()
        };

        apply_connection(&mut config, &args).unwrap();
        assert_eq!(config.source.repo, "fedora-infra/ansible");
        assert_eq!(config.destination.token, "glpat-x");
        assert_eq!(config.transfer.state, StateFilter::Closed);
        assert_eq!(config.transfer.page_size, 50);
        assert_eq!(config.transfer.timeout_secs, 60);
    }

    #[test]
    fn test_rejects_unknown_state() {
        let mut config = MigrationConfig::default();
        let args = ConnectionArgs {
            status: Some("pending".into()),
            ..ConnectionArgs::default()
        };
        assert!(matches!(
            apply_connection(&mut config, &args),
            Err(CliError::InvalidState(_))
        ));
    }

    #[test]
    fn test_transfer_flags() {
        let mut config = MigrationConfig::default();
        let args = TransferArgs {
            labels: true,
            series: true,
            ranges: Some("4-9".into()),
            fail_fast: true,
            ..TransferArgs::default()
        };

        apply_transfer(&mut config, &args).unwrap();
        assert!(config.transfer.labels);
        assert!(!config.transfer.confidential);
        assert!(config.transfer.preserve_numbering);
        assert_eq!(
            config.transfer.selection,
            TicketSelection::Range { start: 4, end: 9 }
        );
        assert!(config.failure_policy.abort_on_any);
        assert!(!config.failure_policy.abort_on_transport);
    }

    #[test]
    fn test_select_wins_over_file_range() {
        let mut config = MigrationConfig::default();
        config.transfer.selection = TicketSelection::Range { start: 1, end: 3 };
        let args = TransferArgs {
            select: Some(vec![7, 2]),
            ..TransferArgs::default()
        };

        apply_transfer(&mut config, &args).unwrap();
        assert_eq!(config.transfer.selection, TicketSelection::Select(vec![7, 2]));
    }

    #[test]
    fn test_load_config_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "source:\n  url: https://pagure.io\n  repo: old/repo\ntransfer:\n  page_size: 30"
        )
        .unwrap();

        let args = ConnectionArgs {
            config: Some(file.path().to_path_buf()),
            source_repo: Some("new/repo".into()),
            ..ConnectionArgs::default()
        };

        let config = load_config(&args).unwrap();
        assert_eq!(config.source.url, "https://pagure.io");
        assert_eq!(config.source.repo, "new/repo");
        assert_eq!(config.transfer.page_size, 30);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let args = ConnectionArgs {
            config: Some("/nonexistent/pagure-migrate.yaml".into()),
            ..ConnectionArgs::default()
        };
        assert!(load_config(&args).is_err());
    }
}
