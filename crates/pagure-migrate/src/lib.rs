//! # Pagure Migrate
//!
//! Replays the tickets of a Pagure repository, with their comment threads,
//! onto the issue tracker of a GitLab project.
//!
//! ## Features
//!
//! - **Exact counting**: the number of tickets in scope is known after at most
//!   two listing requests
//! - **Ordered replay**: issues, then comments in creation order, then status
//! - **Attribution**: authors, dates and back-links are embedded as text
//! - **Failure report**: every failed step is recorded with its ticket, comment
//!   and phase, so a later run can target only what failed
//!
//! ## Example
//!
//! ```rust,ignore
//! use pagure_migrate::{MigrationConfig, Migrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MigrationConfig::from_file("migrate.yaml")?;
//!     let migrator = Migrator::from_config(&config)?;
//!
//!     let report = migrator.migrate().await;
//!     println!("{} tickets moved", report.tickets_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod counter;
pub mod destination;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod progress;
pub mod render;
pub mod source;
pub mod types;

// Re-export main types
pub use config::{FailurePolicy, MigrationConfig};
pub use counter::{count_tickets, TicketCount};
pub use destination::{GitLabClient, IssueSink};
pub use error::{format_elapsed, MigrationError, ProviderErrorKind, RequestError, Result, Timed};
pub use filter::StateFilter;
pub use orchestrator::{MigrationState, Migrator, ReplayState};
pub use progress::{MigrationPhase, MigrationProgress, ProgressCallback, ProgressUpdate};
pub use render::{Renderer, Templates};
pub use source::{PagureClient, TicketSource};
pub use types::*;

/// Version of the migration tools.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
